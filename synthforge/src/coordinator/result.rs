use chrono::{DateTime, Utc};
use synthforge_sdk::{BuildStatus, TaskStatus};
use uuid::Uuid;

use crate::error::TaskError;
use crate::planner::{TaskGraph, TaskId};
use crate::spec::StageKind;

/// A task that exhausted its retries or was cancelled mid-flight
#[derive(Debug, Clone, PartialEq)]
pub struct FailedTask {
    pub id: TaskId,
    pub stage: StageKind,
    pub cause: TaskError,
    pub retries: u32,
    pub critical: bool,
}

/// Terminal summary of one build
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub build_id: Uuid,
    pub status: BuildStatus,
    pub cancelled: bool,
    pub failed: Vec<FailedTask>,

    /// Tasks that never ran; they stay Pending in the graph
    pub blocked: Vec<TaskId>,

    pub artifacts_written: usize,

    /// Final graph with every task's transition log
    pub graph: TaskGraph,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BuildResult {
    pub(crate) fn from_graph(
        build_id: Uuid,
        graph: TaskGraph,
        cancelled: bool,
        started_at: DateTime<Utc>,
    ) -> Self {
        let failed: Vec<FailedTask> = graph
            .nodes()
            .iter()
            .filter(|n| n.status == TaskStatus::Failed)
            .map(|n| FailedTask {
                id: n.id.clone(),
                stage: n.stage,
                cause: n
                    .last_error
                    .clone()
                    .unwrap_or_else(|| TaskError::Unusable("unknown".to_string())),
                retries: n.retry_count,
                critical: n.critical,
            })
            .collect();

        let blocked: Vec<TaskId> = graph
            .nodes()
            .iter()
            .filter(|n| !n.status.is_terminal())
            .map(|n| n.id.clone())
            .collect();

        let artifacts_written = graph
            .nodes()
            .iter()
            .filter(|n| n.last_artifact.is_some())
            .count();

        let status = if cancelled || !blocked.is_empty() {
            BuildStatus::Failed
        } else if failed.is_empty() {
            BuildStatus::Completed
        } else {
            BuildStatus::PartiallyCompleted
        };

        Self {
            build_id,
            status,
            cancelled,
            failed,
            blocked,
            artifacts_written,
            graph,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.id.to_string()).collect()
    }

    pub fn task_status(&self, id: &str) -> Option<TaskStatus> {
        self.graph.task(&TaskId::new(id)).map(|n| n.status)
    }

    pub fn retries(&self, id: &str) -> Option<u32> {
        self.graph.task(&TaskId::new(id)).map(|n| n.retry_count)
    }
}
