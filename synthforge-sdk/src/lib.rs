//! Shared vocabulary for synthforge builds.
//!
//! The engine and any consumer of its progress stream (CLI, log shippers,
//! dashboards) agree on three things defined here:
//!
//! - [`TaskStatus`] and [`BuildStatus`], the task and build state machines
//! - [`BuildEvent`], the structured progress events
//! - the stderr line format used by [`BuildEvent::emit`] and [`parse_event_line`]
//!
//! Console macros for human-readable output live at the bottom of this file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use uuid::Uuid;

/// Prefix marking a progress event line on stderr.
pub const EVENT_PREFIX: &str = "__SYNTHFORGE_EVENT__:";

/// Lifecycle state of a single task in the build graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Succeeded and Failed are final; nothing leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready) | (Ready, Running) | (Running, Succeeded) | (Running, Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of one build invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Completed,
    PartiallyCompleted,
    Failed,
}

impl BuildStatus {
    /// Process exit code a CLI should surface for this status.
    pub fn exit_code(self) -> i32 {
        match self {
            BuildStatus::Completed => 0,
            BuildStatus::Failed => 1,
            BuildStatus::PartiallyCompleted => 2,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildStatus::Completed => "completed",
            BuildStatus::PartiallyCompleted => "partially completed",
            BuildStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Structured progress events emitted during a build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BuildEvent {
    /// Planning succeeded and the build is about to run
    BuildStarted {
        build_id: Uuid,
        project: String,
        total_stages: usize,
        total_tasks: usize,
        at: DateTime<Utc>,
    },
    /// A stage began scheduling its tasks
    StageStarted {
        stage: String,
        index: usize,
        total_stages: usize,
        tasks: usize,
    },
    /// Every task of the stage reached Succeeded
    StageCompleted { stage: String },
    /// At least one task of the stage failed
    StageFailed {
        stage: String,
        failed_tasks: Vec<String>,
    },
    /// A task moved between states
    TaskTransition {
        stage: String,
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
        retry_count: u32,
    },
    /// A task attempt failed and another attempt is scheduled
    TaskRetry {
        stage: String,
        task_id: String,
        attempt: u32,
        reason: String,
    },
    /// An accepted artifact was written to the output tree
    ArtifactCommitted { task_id: String, path: String },
    /// The build reached its terminal state
    BuildFinished {
        build_id: Uuid,
        status: BuildStatus,
        artifacts_written: usize,
        failed_tasks: Vec<String>,
        cancelled: bool,
    },
}

impl BuildEvent {
    /// Render the event as one stderr line.
    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self)
            .ok()
            .map(|json| format!("{}{}", EVENT_PREFIX, json))
    }

    /// Write this event to stderr for line-oriented consumers.
    ///
    /// One locked write per event; lines from concurrent tasks never interleave.
    pub fn emit(&self) {
        let Some(line) = self.to_line() else {
            return;
        };
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "{}", line).and_then(|_| stderr.flush());
    }
}

/// Parse a stderr line produced by [`BuildEvent::emit`].
///
/// Returns `None` for ordinary log lines and for malformed payloads.
pub fn parse_event_line(line: &str) -> Option<BuildEvent> {
    let json = line.trim().strip_prefix(EVENT_PREFIX)?;
    serde_json::from_str(json).ok()
}

// ============================================================================
// Console Logging Macros
// ============================================================================
// Colored output for humans, complementing the structured BuildEvent stream.
// Every macro renders through `console_line`.

/// Styling of one console line
#[doc(hidden)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Banner,
    Info,
    Warning,
    Saved,
    Failure,
    Summary,
}

impl Tone {
    /// ANSI SGR code and leading glyph
    fn style(self) -> (&'static str, &'static str) {
        match self {
            Tone::Banner => ("1;36", "═══ "),
            Tone::Info => ("36", "ℹ "),
            Tone::Warning => ("33", "⚠ "),
            Tone::Saved => ("32", "✓ "),
            Tone::Failure => ("31", "  ✗ "),
            Tone::Summary => ("1", ""),
        }
    }
}

#[doc(hidden)]
pub fn console_line(tone: Tone, text: fmt::Arguments<'_>) {
    let (sgr, glyph) = tone.style();
    println!("\x1b[{}m{}{}\x1b[0m", sgr, glyph, text);
}

/// Logs a stage banner.
///
/// # Example
/// ```
/// use synthforge_sdk::log_stage_banner;
/// log_stage_banner!(1, 9, "data_pipeline");
/// ```
///
/// Outputs:
/// ```text
/// ═══ STAGE 1/9: data_pipeline ═══
/// ```
#[macro_export]
macro_rules! log_stage_banner {
    ($index:expr, $total:expr, $stage:expr) => {
        $crate::console_line(
            $crate::Tone::Banner,
            format_args!("STAGE {}/{}: {} ═══", $index, $total, $stage),
        )
    };
}

/// Logs an informational line; takes `format!` arguments.
///
/// ```
/// use synthforge_sdk::log_info;
/// let n = 3;
/// log_info!("Planned {} tasks", n);
/// ```
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::console_line($crate::Tone::Info, format_args!($($arg)+))
    };
}

/// Logs a warning line; takes `format!` arguments.
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)+) => {
        $crate::console_line($crate::Tone::Warning, format_args!($($arg)+))
    };
}

/// Logs a committed artifact path.
#[macro_export]
macro_rules! log_file_saved {
    ($path:expr) => {
        $crate::console_line($crate::Tone::Saved, format_args!("committed {}", $path))
    };
}

/// Logs a failed task with its retry count and cause.
///
/// # Example
/// ```
/// use synthforge_sdk::log_task_failure;
/// log_task_failure!("training.1", 3, "unusable response: empty");
/// ```
#[macro_export]
macro_rules! log_task_failure {
    ($task_id:expr, $retries:expr, $cause:expr) => {
        $crate::console_line(
            $crate::Tone::Failure,
            format_args!("{} failed after {} retries: {}", $task_id, $retries, $cause),
        )
    };
}

/// Logs the build summary line.
///
/// ```
/// use synthforge_sdk::{log_build_summary, BuildStatus};
/// log_build_summary!(BuildStatus::PartiallyCompleted, 11, 1);
/// ```
#[macro_export]
macro_rules! log_build_summary {
    ($status:expr, $artifacts:expr, $failed:expr) => {
        $crate::console_line(
            $crate::Tone::Summary,
            format_args!(
                "Build {}: {} artifacts written, {} failed tasks",
                $status, $artifacts, $failed
            ),
        )
    };
}
