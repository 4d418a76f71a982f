//! Artifact validation before commit.
//!
//! Checks run cheapest first and stop at the first rejection:
//!
//! 1. Built-in syntax check for the file's extension
//! 2. Optional external syntax command (e.g. `python3 -m py_compile {file}`)
//! 3. Interface conformance against the task's export requirements
//! 4. Behavior: embedded checks run by a configured command, under a timeout

pub mod behavior;
pub mod interface;
pub mod syntax;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::TaskError;
use crate::planner::{TaskId, TaskNode};
use behavior::CommandVerdict;

/// A synthesized file awaiting its verdict
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub task_id: TaskId,

    /// Destination, relative to the output root
    pub path: PathBuf,

    pub content: String,
}

impl Artifact {
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("artifact.{}", self.extension()))
    }
}

/// Validator's classification of an artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    RejectSyntax(String),
    RejectInterface(String),
    RejectBehavior(String),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept)
    }

    pub fn into_result(self) -> Result<(), TaskError> {
        match self {
            Verdict::Accept => Ok(()),
            Verdict::RejectSyntax(reason) => Err(TaskError::RejectSyntax(reason)),
            Verdict::RejectInterface(reason) => Err(TaskError::RejectInterface(reason)),
            Verdict::RejectBehavior(reason) => Err(TaskError::RejectBehavior(reason)),
        }
    }
}

/// External validation commands keyed by file extension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// e.g. `py: python3 -m py_compile {file}`
    pub syntax_commands: BTreeMap<String, String>,

    /// e.g. `py: python3 {file}`; runs only for tasks with embedded checks
    pub behavior_commands: BTreeMap<String, String>,

    pub behavior_timeout_secs: u64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            syntax_commands: BTreeMap::new(),
            behavior_commands: BTreeMap::new(),
            behavior_timeout_secs: 60,
        }
    }
}

pub struct Validator {
    config: ValidationConfig,
    project_root: PathBuf,
}

impl Validator {
    pub fn new(config: ValidationConfig, project_root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            project_root: project_root.into(),
        }
    }

    pub async fn validate(&self, artifact: &Artifact, task: &TaskNode) -> Verdict {
        let ext = artifact.extension();
        let timeout = Duration::from_secs(self.config.behavior_timeout_secs.max(1));

        if let Err(reason) = syntax::check_syntax(&artifact.content, &ext) {
            return Verdict::RejectSyntax(reason);
        }

        if let Some(template) = self.config.syntax_commands.get(&ext) {
            let verdict = behavior::run_on_scratch_file(
                template,
                &artifact.file_name(),
                &artifact.content,
                &self.project_root,
                timeout,
            )
            .await;
            if let CommandVerdict::Failed(reason) = verdict {
                return Verdict::RejectSyntax(reason);
            }
        }

        if let Err(reason) = interface::check_interface(&artifact.content, &task.exports) {
            return Verdict::RejectInterface(reason);
        }

        if !task.checks.is_empty() {
            match self.config.behavior_commands.get(&ext) {
                Some(template) => {
                    let script = behavior::with_checks(&artifact.content, &task.checks);
                    let verdict = behavior::run_on_scratch_file(
                        template,
                        &artifact.file_name(),
                        &script,
                        &self.project_root,
                        timeout,
                    )
                    .await;
                    if let CommandVerdict::Failed(reason) = verdict {
                        return Verdict::RejectBehavior(reason);
                    }
                }
                None => debug!(
                    task = %task.id,
                    ext = %ext,
                    "No behavior command configured; skipping embedded checks"
                ),
            }
        }

        Verdict::Accept
    }
}
