//! One task's attempt loop: synthesize, validate, commit, retry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::output::OutputTree;
use super::retry::{RetryBudget, RetryDecision, RetryPolicy};
use crate::error::TaskError;
use crate::planner::{TaskId, TaskNode};
use crate::progress::ProgressReporter;
use crate::synthesis::{SynthesisContext, Synthesizer};
use crate::validate::{Artifact, Validator};

/// Final word on one task, handed back to the driver
#[derive(Debug)]
pub(crate) struct TaskOutcome {
    pub id: TaskId,
    pub result: Result<PathBuf, TaskError>,
    pub retries: u32,
}

pub(crate) struct TaskRunner {
    pub synthesizer: Arc<dyn Synthesizer>,
    pub validator: Validator,
    pub output: OutputTree,
    pub policy: RetryPolicy,
    pub call_deadline: Duration,
    pub reporter: ProgressReporter,
}

impl TaskRunner {
    /// Attempt `task` until it commits, exhausts its retries, or `cancel` fires.
    pub async fn run(
        &self,
        task: TaskNode,
        mut context: SynthesisContext,
        cancel: CancellationToken,
    ) -> TaskOutcome {
        let mut budget = RetryBudget::default();

        loop {
            context.attempt = budget.total() + 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(TaskError::Cancelled),
                result = self.attempt(&task, &context, &cancel) => result,
            };

            let error = match result {
                Ok(path) => {
                    return TaskOutcome {
                        id: task.id,
                        result: Ok(path),
                        retries: budget.total(),
                    }
                }
                Err(error) => error,
            };

            match self.policy.decide(&error, &mut budget) {
                RetryDecision::GiveUp => {
                    return TaskOutcome {
                        id: task.id,
                        result: Err(error),
                        retries: budget.total(),
                    }
                }
                RetryDecision::Backoff(delay) => {
                    info!(task = %task.id, ?delay, "Backing off: {}", error);
                    self.reporter.retry(&task, budget.total() + 1, &error.to_string());

                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            return TaskOutcome {
                                id: task.id,
                                result: Err(TaskError::Cancelled),
                                retries: budget.total(),
                            }
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::Revise => {
                    self.reporter.retry(&task, budget.total() + 1, &error.to_string());
                    context.feedback.push(error.to_string());
                }
            }
        }
    }

    async fn attempt(
        &self,
        task: &TaskNode,
        context: &SynthesisContext,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TaskError> {
        debug!(task = %task.id, attempt = context.attempt, "Starting attempt");

        let body = tokio::time::timeout(
            self.call_deadline,
            self.synthesizer.synthesize(task, context),
        )
        .await
        .map_err(|_| {
            TaskError::BackendUnavailable(format!("no response within {:?}", self.call_deadline))
        })?
        .into_result()?;

        let artifact = Artifact {
            task_id: task.id.clone(),
            path: task.output_path.clone(),
            content: body,
        };
        self.validator.validate(&artifact, task).await.into_result()?;

        self.output.commit(&artifact.path, &artifact.content, cancel)
    }
}
