//! Build configuration.
//!
//! Loaded from YAML: an explicit `--config` file, else `config.yaml` in the
//! platform config directory, else defaults. Every field is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::coordinator::RetryPolicy;
use crate::planner::PlannerConfig;
use crate::synthesis::anthropic::DEFAULT_MODEL;
use crate::synthesis::SynthesisLimits;
use crate::validate::ValidationConfig;

const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub max_response_bytes: usize,

    /// Deadline for a single synthesis call
    pub call_deadline_secs: u64,

    pub max_backend_retries: u32,
    pub max_revision_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,

    /// Synthesis calls in flight at once
    pub max_concurrency: usize,
    pub max_features_per_task: usize,

    pub write_manifest: bool,

    /// Emit `__SYNTHFORGE_EVENT__` lines on stderr
    pub emit_events: bool,

    pub validation: ValidationConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let limits = SynthesisLimits::default();
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: limits.max_output_tokens,
            max_response_bytes: limits.max_response_bytes,
            call_deadline_secs: 300,
            max_backend_retries: 3,
            max_revision_retries: 2,
            backoff_base_ms: 1_000,
            backoff_max_ms: 30_000,
            max_concurrency: 4,
            max_features_per_task: PlannerConfig::default().max_features_per_task,
            write_manifest: true,
            emit_events: false,
            validation: ValidationConfig::default(),
        }
    }
}

impl BuildConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // An empty file is a valid, all-default config
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("Failed to parse build config")
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    /// Explicit path, else the platform config file if present, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        match default_config_path() {
            Some(path) if path.is_file() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            max_features_per_task: self.max_features_per_task.max(1),
        }
    }

    pub fn synthesis_limits(&self) -> SynthesisLimits {
        SynthesisLimits {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            max_response_bytes: self.max_response_bytes,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_backend_retries: self.max_backend_retries,
            max_revision_retries: self.max_revision_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn call_deadline(&self) -> Duration {
        Duration::from_secs(self.call_deadline_secs.max(1))
    }
}

/// `<config dir>/synthforge/config.yaml` on this platform
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "synthforge")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}
