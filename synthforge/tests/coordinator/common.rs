//! Common test utilities for coordinator tests

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use synthforge::config::BuildConfig;
use synthforge::coordinator::Coordinator;
use synthforge::planner::{ExportKind, TaskNode};
use synthforge::spec::{FeatureRequest, ProjectSpec, StageKind};
use synthforge::synthesis::{SynthesisContext, SynthesisOutcome, Synthesizer};
use synthforge_sdk::{BuildEvent, TaskStatus};

pub const A: &str = "data_pipeline.1";
pub const B: &str = "exploration.1";
pub const C: &str = "feature_engineering.1";

/// Config with millisecond backoff so retry tests stay fast
pub fn test_config() -> BuildConfig {
    BuildConfig {
        backoff_base_ms: 1,
        backoff_max_ms: 5,
        call_deadline_secs: 5,
        ..BuildConfig::default()
    }
}

/// Data pipeline -> exploration -> feature engineering, one feature each
pub fn three_stage_spec(root: &Path) -> ProjectSpec {
    ProjectSpec::new("chain", root)
        .with_feature(
            FeatureRequest::new("Load the weekly spend table", 0)
                .in_stage(StageKind::DataPipeline)
                .at_path("src/data/load.py"),
        )
        .with_feature(
            FeatureRequest::new("Plot spend against revenue", 0)
                .in_stage(StageKind::Exploration)
                .at_path("src/eda/plots.py"),
        )
        .with_feature(
            FeatureRequest::new("Build lagged spend columns", 0)
                .in_stage(StageKind::FeatureEngineering)
                .at_path("src/features/lags.py"),
        )
}

/// Python that passes validation for `task`
pub fn valid_body(task: &TaskNode) -> String {
    let is_markdown = task
        .output_path
        .extension()
        .is_some_and(|e| e == "md");
    if is_markdown {
        return format!("# {}\n\n{}\n", task.id, task.description);
    }

    let mut body = format!("\"\"\"Generated for {}.\"\"\"\n\n", task.id);
    for export in &task.exports {
        match export.kind {
            ExportKind::Defined => {
                body.push_str(&format!("def {}():\n    return None\n\n", export.name))
            }
            ExportKind::Referenced => body.push_str(&format!("# uses {}\n", export.name)),
        }
    }
    body.push_str("VALUE = 1\n");
    body
}

/// What one synthesize call saw
#[derive(Debug, Clone)]
pub struct Call {
    pub task: String,
    pub attempt: u32,
    pub predecessors: Vec<String>,
    pub degraded: Vec<String>,
    pub feedback: Vec<String>,
}

type Hook = Box<dyn Fn(&str) + Send + Sync>;

/// Deterministic synthesizer.
///
/// Per task it replays a script of outcomes, then falls back to a fixed
/// outcome, then to a valid body.
#[derive(Default)]
pub struct StubSynthesizer {
    scripts: Mutex<HashMap<String, VecDeque<SynthesisOutcome>>>,
    fallback: HashMap<String, SynthesisOutcome>,
    delays: HashMap<String, Duration>,
    on_call: Option<Hook>,
    calls: Mutex<Vec<Call>>,
    in_flight: Mutex<(usize, usize)>,
}

impl StubSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, task: &str, outcomes: Vec<SynthesisOutcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(task.to_string(), outcomes.into());
        self
    }

    pub fn always(mut self, task: &str, outcome: SynthesisOutcome) -> Self {
        self.fallback.insert(task.to_string(), outcome);
        self
    }

    pub fn delay(mut self, task: &str, delay: Duration) -> Self {
        self.delays.insert(task.to_string(), delay);
        self
    }

    pub fn on_call(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_call = Some(Box::new(hook));
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, task: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.task == task).collect()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.in_flight.lock().unwrap().1
    }
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn synthesize(&self, task: &TaskNode, context: &SynthesisContext) -> SynthesisOutcome {
        let id = task.id.to_string();
        self.calls.lock().unwrap().push(Call {
            task: id.clone(),
            attempt: context.attempt,
            predecessors: context
                .predecessors
                .iter()
                .map(|p| p.task_id.to_string())
                .collect(),
            degraded: context.degraded.iter().map(|d| d.task_id.to_string()).collect(),
            feedback: context.feedback.clone(),
        });
        if let Some(hook) = &self.on_call {
            hook(&id);
        }

        {
            let mut counts = self.in_flight.lock().unwrap();
            counts.0 += 1;
            counts.1 = counts.1.max(counts.0);
        }
        if let Some(delay) = self.delays.get(&id) {
            tokio::time::sleep(*delay).await;
        }
        self.in_flight.lock().unwrap().0 -= 1;

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(|script| script.pop_front());
        scripted
            .or_else(|| self.fallback.get(&id).cloned())
            .unwrap_or_else(|| SynthesisOutcome::Usable(valid_body(task)))
    }
}

pub fn coordinator(config: BuildConfig, stub: Arc<StubSynthesizer>) -> Coordinator {
    Coordinator::new(config, stub)
}

/// Transitions recorded for `task`, in order
pub fn transitions(events: &[BuildEvent], task: &str) -> Vec<(TaskStatus, TaskStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            BuildEvent::TaskTransition {
                task_id, from, to, ..
            } if task_id == task => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

/// Index of the first transition of `task` into `to`
pub fn position(events: &[BuildEvent], task: &str, to: TaskStatus) -> Option<usize> {
    events.iter().position(|e| {
        matches!(e, BuildEvent::TaskTransition { task_id, to: t, .. } if task_id == task && *t == to)
    })
}
