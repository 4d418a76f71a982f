//! External command runs against a scratch copy of an artifact.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Lines of output kept in a rejection reason
const TAIL_LINES: usize = 20;

/// Result of one external command run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandVerdict {
    Passed,
    Failed(String),
}

/// Write `content` to a scratch directory as `file_name` and run `template` on it.
///
/// `{file}` in the template is replaced by the scratch file and `{root}` by
/// `project_root`. The command runs in `project_root` (created earlier by
/// the coordinator) with `PYTHONPATH` pointing there so sibling modules import.
pub async fn run_on_scratch_file(
    template: &str,
    file_name: &str,
    content: &str,
    project_root: &Path,
    timeout: Duration,
) -> CommandVerdict {
    let scratch = match tempfile::Builder::new().prefix("synthforge-check-").tempdir() {
        Ok(dir) => dir,
        Err(e) => return CommandVerdict::Failed(format!("could not create scratch dir: {}", e)),
    };
    let file = scratch.path().join(file_name);
    if let Err(e) = tokio::fs::write(&file, content).await {
        return CommandVerdict::Failed(format!("could not write scratch file: {}", e));
    }

    let file_arg = file.to_string_lossy();
    let root_arg = project_root.to_string_lossy();
    let args: Vec<String> = template
        .split_whitespace()
        .map(|part| part.replace("{file}", &file_arg).replace("{root}", &root_arg))
        .collect();

    let Some((program, rest)) = args.split_first() else {
        return CommandVerdict::Failed("empty check command".to_string());
    };

    let mut command = Command::new(program);
    command
        .args(rest)
        .env("PYTHONPATH", project_root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if project_root.is_dir() {
        command.current_dir(project_root);
    }

    debug!(command = %template, file = %file.display(), "Running check command");

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return CommandVerdict::Failed(format!("could not run '{}': {}", program, e)),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Err(_) => CommandVerdict::Failed(format!("timed out after {:?}", timeout)),
        Ok(Err(e)) => CommandVerdict::Failed(format!("command failed to complete: {}", e)),
        Ok(Ok(output)) if output.status.success() => CommandVerdict::Passed,
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            CommandVerdict::Failed(format!("exit {}: {}", code, tail(&combined)))
        }
    }
}

/// Artifact followed by its embedded checks
pub fn with_checks(content: &str, checks: &[String]) -> String {
    let mut script = content.trim_end().to_string();
    for check in checks {
        script.push_str("\n\n");
        script.push_str(check.trim_end());
    }
    script.push('\n');
    script
}

fn tail(output: &str) -> String {
    let lines: Vec<&str> = output.trim_end().lines().collect();
    let start = lines.len().saturating_sub(TAIL_LINES);
    lines[start..].join("\n")
}
