//! Build coordinator.
//!
//! Drives plan -> synthesize -> validate -> commit over the task graph one
//! stage at a time. Within a stage, ready tasks run concurrently as futures
//! polled by the driver; only the driver mutates the graph.

pub mod output;
pub mod result;
pub mod retry;
mod runner;

pub use output::OutputTree;
pub use result::{BuildResult, FailedTask};
pub use retry::{RetryBudget, RetryDecision, RetryPolicy};

use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use synthforge_sdk::TaskStatus;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::BuildConfig;
use crate::error::{BuildError, TaskError};
use crate::planner::{plan, TaskGraph, TaskId, TaskNode};
use crate::progress::ProgressReporter;
use crate::spec::{ProjectSpec, StageKind};
use crate::synthesis::{ArtifactRef, DegradedRef, ProjectBrief, SynthesisContext, Synthesizer};
use crate::validate::Validator;
use runner::{TaskOutcome, TaskRunner};

pub struct Coordinator {
    config: BuildConfig,
    synthesizer: Arc<dyn Synthesizer>,
    reporter: ProgressReporter,
}

impl Coordinator {
    pub fn new(config: BuildConfig, synthesizer: Arc<dyn Synthesizer>) -> Self {
        let reporter = ProgressReporter::new(config.emit_events);
        Self {
            config,
            synthesizer,
            reporter,
        }
    }

    pub fn with_reporter(mut self, reporter: ProgressReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    /// Plan `spec` and run it to a terminal [`BuildResult`].
    ///
    /// Errors are returned only when the build cannot start; task failures
    /// and cancellation are reported through the result.
    pub async fn run(
        &self,
        spec: ProjectSpec,
        cancel: CancellationToken,
    ) -> Result<BuildResult, BuildError> {
        spec.validate()?;
        let spec = Arc::new(spec);

        let mut graph = plan(&spec, &self.config.planner())?;
        let output = OutputTree::new(&spec.output_path);
        output.prepare()?;

        let build_id = Uuid::new_v4();
        let started_at = Utc::now();
        let stages = graph.stages();
        self.reporter
            .build_started(build_id, &spec.name, stages.len(), graph.len());

        let runner = TaskRunner {
            synthesizer: Arc::clone(&self.synthesizer),
            validator: Validator::new(self.config.validation.clone(), &spec.output_path),
            output: output.clone(),
            policy: self.config.retry_policy(),
            call_deadline: self.config.call_deadline(),
            reporter: self.reporter.clone(),
        };
        let brief = Arc::new(ProjectBrief::from_spec(&spec));

        for (index, &stage) in stages.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(stage = stage.as_str(), "Build cancelled; not starting stage");
                break;
            }
            self.run_stage(&mut graph, stage, index + 1, stages.len(), &runner, &brief, &cancel)
                .await;
        }

        let cancelled = cancel.is_cancelled()
            && graph.nodes().iter().any(|n| {
                !n.status.is_terminal() || n.last_error == Some(TaskError::Cancelled)
            });

        if self.config.write_manifest && !cancelled {
            if let Err(e) = output.write_manifest(&spec.name, build_id, &graph) {
                warn!("Failed to write manifest: {:#}", e);
            }
        }

        let result = BuildResult::from_graph(build_id, graph, cancelled, started_at);
        self.reporter.build_finished(
            build_id,
            result.status,
            result.artifacts_written,
            result.failed_ids(),
            result.cancelled,
        );
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        graph: &mut TaskGraph,
        stage: StageKind,
        index: usize,
        total_stages: usize,
        runner: &TaskRunner,
        brief: &Arc<ProjectBrief>,
        cancel: &CancellationToken,
    ) {
        let ids: Vec<TaskId> = graph.tasks_in(stage).map(|n| n.id.clone()).collect();

        let mut queue: VecDeque<TaskId> = VecDeque::new();
        for id in &ids {
            match graph.task(id) {
                Some(node) if is_ready(graph, node) => queue.push_back(id.clone()),
                Some(_) => warn!(task = %id, "Blocked by a failed predecessor"),
                None => {}
            }
        }
        if queue.is_empty() {
            warn!(stage = stage.as_str(), "Stage blocked; no task can run");
            return;
        }

        self.reporter
            .stage_started(stage.as_str(), index, total_stages, ids.len());
        for id in &queue {
            self.advance(graph, id, TaskStatus::Ready);
        }

        let limit = self.config.max_concurrency.max(1);
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit && !cancel.is_cancelled() {
                let Some(id) = queue.pop_front() else { break };
                let Some(task) = graph.task(&id).cloned() else { continue };
                let context = context_for(graph, brief, &task);

                self.advance(graph, &id, TaskStatus::Running);
                in_flight.push(runner.run(task, context, cancel.clone()));
            }

            match in_flight.next().await {
                Some(outcome) => self.finish(graph, outcome),
                None => break,
            }
        }

        let failed: Vec<String> = graph
            .tasks_in(stage)
            .filter(|n| n.status == TaskStatus::Failed)
            .map(|n| n.id.to_string())
            .collect();
        self.reporter.stage_finished(stage.as_str(), failed);
    }

    /// Record a runner's outcome and move the task to its terminal state.
    fn finish(&self, graph: &mut TaskGraph, outcome: TaskOutcome) {
        let TaskOutcome { id, result, retries } = outcome;
        let Some(node) = graph.task_mut(&id) else {
            return;
        };
        node.retry_count = retries;

        let to = match result {
            Ok(path) => {
                let relative = node.output_path.to_string_lossy().into_owned();
                node.last_artifact = Some(path);
                node.last_error = None;
                self.reporter.artifact_committed(node, &relative);
                TaskStatus::Succeeded
            }
            Err(e) => {
                error!(task = %id, retries, "Task failed: {}", e);
                node.last_error = Some(e);
                TaskStatus::Failed
            }
        };
        self.advance(graph, &id, to);
    }

    fn advance(&self, graph: &mut TaskGraph, id: &TaskId, to: TaskStatus) {
        let Some(node) = graph.task_mut(id) else {
            return;
        };
        match node.transition(to) {
            Ok(step) => self.reporter.transition(node, &step),
            Err(e) => error!("{}", e),
        }
    }
}

/// All predecessors terminal, and every critical one Succeeded.
fn is_ready(graph: &TaskGraph, node: &TaskNode) -> bool {
    node.status == TaskStatus::Pending
        && node.predecessors.iter().all(|p| match graph.task(p) {
            Some(pred) if pred.critical => pred.status == TaskStatus::Succeeded,
            Some(pred) => pred.status.is_terminal(),
            None => false,
        })
}

fn context_for(graph: &TaskGraph, brief: &Arc<ProjectBrief>, task: &TaskNode) -> SynthesisContext {
    let mut context = SynthesisContext::new(Arc::clone(brief), task);

    for pred in task.predecessors.iter().filter_map(|p| graph.task(p)) {
        match pred.status {
            TaskStatus::Succeeded => context.predecessors.push(ArtifactRef {
                task_id: pred.id.clone(),
                path: pred.output_path.clone(),
                exports: pred.defined_exports().map(str::to_string).collect(),
            }),
            TaskStatus::Failed => {
                info!(task = %task.id, degraded = %pred.id, "Proceeding without failed predecessor");
                context.degraded.push(DegradedRef {
                    task_id: pred.id.clone(),
                    path: pred.output_path.clone(),
                })
            }
            _ => {}
        }
    }
    context
}
