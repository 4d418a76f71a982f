//! Error taxonomy for builds.
//!
//! Precondition and planning errors are fatal and surface before any task
//! runs. Task errors are retried locally and only end up in the
//! [`BuildResult`](crate::coordinator::BuildResult) once a task gives up.

use std::path::PathBuf;
use thiserror::Error;

use crate::planner::TaskId;

/// The build cannot start: inputs or environment are unusable
#[derive(Debug, Error)]
pub enum PreconditionError {
    #[error("Credential {var} is not set")]
    MissingCredential { var: String },

    #[error("Credential {var} is malformed: {reason}")]
    MalformedCredential { var: String, reason: String },

    #[error("Invalid project spec: {0}")]
    InvalidSpec(String),

    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    #[error("Backend client setup failed: {0}")]
    ClientSetup(String),

    #[error("Output path {path} is not writable: {source}")]
    OutputNotWritable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The feature list cannot be turned into a valid task graph
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("Project spec has no features")]
    NoFeatures,

    #[error("Stage '{stage}' requires stage '{requires}', which has no features")]
    MissingStage { stage: String, requires: String },

    #[error("Tasks {first} and {second} both claim output path {path}")]
    PathConflict {
        path: PathBuf,
        first: TaskId,
        second: TaskId,
    },

    #[error("Task {task} claims {path}, which already exists in the output tree")]
    ExistingFile { path: PathBuf, task: TaskId },

    #[error("Task {task} consumes '{identifier}', which no task in the previous stage provides")]
    UnresolvedConsume { task: TaskId, identifier: String },

    #[error("Tasks can never become ready: {}", format_ids(.tasks))]
    Stranded { tasks: Vec<TaskId> },
}

/// Fatal errors returned by [`Coordinator::run`](crate::coordinator::Coordinator::run)
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Planning(#[from] PlanningError),
}

/// Why a single task attempt (or, finally, the task) failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend rejected request: {0}")]
    BackendRejected(String),

    #[error("unusable response: {0}")]
    Unusable(String),

    #[error("syntax check failed: {0}")]
    RejectSyntax(String),

    #[error("interface check failed: {0}")]
    RejectInterface(String),

    #[error("behavior check failed: {0}")]
    RejectBehavior(String),

    #[error("cancelled")]
    Cancelled,

    #[error("commit failed: {0}")]
    Commit(String),
}

impl TaskError {
    /// Transient backend failures retried with backoff rather than a revised prompt.
    pub fn is_backend(&self) -> bool {
        matches!(
            self,
            TaskError::BackendUnavailable(_) | TaskError::BackendRejected(_)
        )
    }
}

fn format_ids(ids: &[TaskId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
