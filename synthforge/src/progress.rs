//! Progress reporting for builds.
//!
//! Every [`BuildEvent`] goes to three places: a `tracing` record, an
//! in-memory history, and a broadcast channel for live subscribers.
//! Optionally it is also emitted as an event line on stderr. Reporting
//! never affects the build outcome.

use std::sync::{Arc, Mutex};
use synthforge_sdk::{BuildEvent, BuildStatus, TaskStatus};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::planner::{TaskNode, Transition};

/// Broadcast capacity; slow subscribers lag rather than block the build
const CHANNEL_CAPACITY: usize = 1000;

#[derive(Clone)]
pub struct ProgressReporter {
    tx: broadcast::Sender<BuildEvent>,
    /// Persistent buffer of all events for later retrieval
    history: Arc<Mutex<Vec<BuildEvent>>>,
    emit_lines: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(false)
    }
}

impl ProgressReporter {
    pub fn new(emit_lines: bool) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            history: Arc::new(Mutex::new(Vec::new())),
            emit_lines,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BuildEvent> {
        self.tx.subscribe()
    }

    /// All events reported so far
    pub fn history(&self) -> Vec<BuildEvent> {
        self.history
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn report(&self, event: BuildEvent) {
        trace_event(&event);

        if let Ok(mut events) = self.history.lock() {
            events.push(event.clone());
        }
        if self.emit_lines {
            event.emit();
        }
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn build_started(&self, build_id: Uuid, project: &str, total_stages: usize, total_tasks: usize) {
        self.report(BuildEvent::BuildStarted {
            build_id,
            project: project.to_string(),
            total_stages,
            total_tasks,
            at: chrono::Utc::now(),
        });
    }

    pub fn stage_started(&self, stage: &str, index: usize, total_stages: usize, tasks: usize) {
        self.report(BuildEvent::StageStarted {
            stage: stage.to_string(),
            index,
            total_stages,
            tasks,
        });
    }

    pub fn stage_finished(&self, stage: &str, failed_tasks: Vec<String>) {
        if failed_tasks.is_empty() {
            self.report(BuildEvent::StageCompleted {
                stage: stage.to_string(),
            });
        } else {
            self.report(BuildEvent::StageFailed {
                stage: stage.to_string(),
                failed_tasks,
            });
        }
    }

    pub fn transition(&self, task: &TaskNode, step: &Transition) {
        self.report(BuildEvent::TaskTransition {
            stage: task.stage.as_str().to_string(),
            task_id: task.id.to_string(),
            from: step.from,
            to: step.to,
            retry_count: task.retry_count,
        });
    }

    pub fn retry(&self, task: &TaskNode, attempt: u32, reason: &str) {
        self.report(BuildEvent::TaskRetry {
            stage: task.stage.as_str().to_string(),
            task_id: task.id.to_string(),
            attempt,
            reason: reason.to_string(),
        });
    }

    pub fn artifact_committed(&self, task: &TaskNode, path: &str) {
        self.report(BuildEvent::ArtifactCommitted {
            task_id: task.id.to_string(),
            path: path.to_string(),
        });
    }

    pub fn build_finished(
        &self,
        build_id: Uuid,
        status: BuildStatus,
        artifacts_written: usize,
        failed_tasks: Vec<String>,
        cancelled: bool,
    ) {
        self.report(BuildEvent::BuildFinished {
            build_id,
            status,
            artifacts_written,
            failed_tasks,
            cancelled,
        });
    }
}

fn trace_event(event: &BuildEvent) {
    match event {
        BuildEvent::BuildStarted {
            project,
            total_stages,
            total_tasks,
            ..
        } => info!(project, total_stages, total_tasks, "Build started"),
        BuildEvent::StageStarted {
            stage, index, tasks, ..
        } => info!(stage, index, tasks, "Stage started"),
        BuildEvent::StageCompleted { stage } => info!(stage, "Stage completed"),
        BuildEvent::StageFailed {
            stage,
            failed_tasks,
        } => warn!(stage, failed = ?failed_tasks, "Stage finished with failures"),
        BuildEvent::TaskTransition {
            task_id, from, to, ..
        } => {
            if *to == TaskStatus::Failed {
                warn!(task = %task_id, %from, %to, "Task transition");
            } else {
                debug!(task = %task_id, %from, %to, "Task transition");
            }
        }
        BuildEvent::TaskRetry {
            task_id,
            attempt,
            reason,
            ..
        } => warn!(task = %task_id, attempt, "Retrying: {}", reason),
        BuildEvent::ArtifactCommitted { task_id, path } => {
            info!(task = %task_id, path, "Artifact committed")
        }
        BuildEvent::BuildFinished {
            status,
            artifacts_written,
            cancelled,
            ..
        } => info!(%status, artifacts_written, cancelled, "Build finished"),
    }
}
