//! Command-line interface for the build driver.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use synthforge_sdk::{
    log_build_summary, log_file_saved, log_info, log_stage_banner, log_task_failure, log_warning,
    BuildEvent, BuildStatus,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::{default_config_path, BuildConfig};
use crate::coordinator::{BuildResult, Coordinator};
use crate::planner::{plan, render_execution_plan};
use crate::spec::ProjectSpec;
use crate::synthesis::anthropic::{validate_api_key, API_KEY_VAR};
use crate::synthesis::{AnthropicBackend, SynthesisClient};

/// Task-graph build driver for LLM-synthesized multi-file projects
#[derive(Parser, Debug, Clone)]
#[command(name = "synthforge")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Plan and build a project from a spec file
    Build {
        /// Project spec (YAML)
        #[arg(short, long, value_name = "PATH")]
        spec: PathBuf,

        /// Override the spec's output path
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Build config (YAML); defaults to the platform config file
        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Emit structured progress events on stderr
        #[arg(long)]
        events: bool,
    },

    /// Print the execution plan without synthesizing anything
    Plan {
        #[arg(short, long, value_name = "PATH")]
        spec: PathBuf,

        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Verify the backend credential
    Check {
        /// Also send a minimal request to the backend
        #[arg(long)]
        ping: bool,

        #[arg(short, long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

/// Run `cli`, returning the process exit code.
pub async fn execute(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Build {
            spec,
            output,
            config,
            events,
        } => build(spec, output, config, events).await,
        Command::Plan { spec, config } => print_plan(spec, config),
        Command::Check { ping, config } => check(ping, config).await,
    }
}

async fn build(
    spec_path: PathBuf,
    output: Option<PathBuf>,
    config_path: Option<PathBuf>,
    events: bool,
) -> Result<i32> {
    let mut config = BuildConfig::load(config_path.as_deref())?;
    config.emit_events |= events;

    let mut spec = ProjectSpec::load(&spec_path)?;
    if let Some(output) = output {
        spec.output_path = output;
    }

    let backend = AnthropicBackend::from_env(config.call_deadline())?;
    let client = SynthesisClient::new(backend, config.synthesis_limits());
    let coordinator = Coordinator::new(config, Arc::new(client));

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log_warning!("Interrupted; cancelling build");
            ctrl_c.cancel();
        }
    });

    let console = tokio::spawn(print_progress(coordinator.reporter().subscribe()));

    log_info!("Building {} into {}", spec.name, spec.output_path.display());
    let result = coordinator.run(spec, cancel).await?;

    // Reporter lives as long as the coordinator; drop it so the console task ends
    drop(coordinator);
    let _ = console.await;

    print_summary(&result);
    Ok(result.status.exit_code())
}

async fn print_progress(mut rx: broadcast::Receiver<BuildEvent>) {
    loop {
        match rx.recv().await {
            Ok(BuildEvent::StageStarted {
                stage,
                index,
                total_stages,
                ..
            }) => {
                log_stage_banner!(index, total_stages, stage);
            }
            Ok(BuildEvent::ArtifactCommitted { path, .. }) => {
                log_file_saved!(path);
            }
            Ok(BuildEvent::TaskRetry {
                task_id,
                attempt,
                reason,
                ..
            }) => {
                log_warning!("{} attempt {}: {}", task_id, attempt, reason);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log_warning!("Progress display skipped {} events", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_summary(result: &BuildResult) {
    println!();
    log_build_summary!(result.status, result.artifacts_written, result.failed.len());
    for failed in &result.failed {
        log_task_failure!(failed.id, failed.retries, failed.cause);
    }
    if !result.blocked.is_empty() {
        let blocked: Vec<String> = result.blocked.iter().map(|id| id.to_string()).collect();
        log_warning!("Blocked tasks: {}", blocked.join(", "));
    }
    if result.cancelled {
        log_warning!("Build was cancelled; committed files were kept");
    }
    if result.status == BuildStatus::Completed {
        log_info!(
            "Finished in {}s",
            (result.finished_at - result.started_at).num_seconds()
        );
    }
}

fn print_plan(spec_path: PathBuf, config_path: Option<PathBuf>) -> Result<i32> {
    let config = BuildConfig::load(config_path.as_deref())?;
    let spec = ProjectSpec::load(&spec_path)?;
    spec.validate()?;

    let graph = plan(&spec, &config.planner())?;
    let yaml = render_execution_plan(&graph).context("Failed to render execution plan")?;
    print!("{}", yaml);
    Ok(0)
}

async fn check(ping: bool, config_path: Option<PathBuf>) -> Result<i32> {
    let config = BuildConfig::load(config_path.as_deref())?;
    if config_path.is_none() {
        match default_config_path() {
            Some(path) if path.is_file() => {
                log_info!("Using config {}", path.display());
            }
            _ => {
                log_info!("Using default config");
            }
        }
    }

    let key = std::env::var(API_KEY_VAR).unwrap_or_default();
    if let Err(e) = validate_api_key(API_KEY_VAR, &key) {
        log_warning!("{}", e);
        return Ok(1);
    }
    log_info!("{} is set", API_KEY_VAR);

    if ping {
        let backend = AnthropicBackend::from_env(Duration::from_secs(30))?;
        match backend.ping(&config.model).await {
            Ok(()) => {
                log_info!("Backend reachable with model {}", config.model);
            }
            Err(e) => {
                log_warning!("Backend check failed: {}", e);
                return Ok(1);
            }
        }
    }
    Ok(0)
}
