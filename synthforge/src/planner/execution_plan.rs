//! Execution plan rendering and dependency batching.
//!
//! A batch is a set of tasks whose predecessors all sit in earlier batches;
//! with stage-to-stage edges this yields one batch per non-empty stage.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::warn;

use crate::planner::graph::{TaskGraph, TaskId, TaskNode};

#[derive(Debug, Serialize)]
struct PlanDocument {
    execution_plan: ExecutionPlan,
}

#[derive(Debug, Serialize)]
struct ExecutionPlan {
    total_tasks: usize,
    total_batches: usize,
    batches: Vec<Batch>,
    dependencies_summary: DependenciesSummary,
}

#[derive(Debug, Serialize)]
struct Batch {
    batch_id: usize,
    stage: String,
    description: String,
    tasks: Vec<BatchTask>,
    parallelization_rationale: String,
}

#[derive(Debug, Serialize)]
struct BatchTask {
    task_id: TaskId,
    path: PathBuf,
    critical: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    predecessors: Vec<TaskId>,
    features: Vec<String>,
}

#[derive(Debug, Serialize)]
struct DependenciesSummary {
    critical_path: Vec<TaskId>,
    parallelization_potential: String,
    parallelization_explanation: String,
}

/// Group tasks into sequential batches whose members can run in parallel.
pub fn execution_batches(graph: &TaskGraph) -> Vec<Vec<&TaskNode>> {
    let mut scheduled: HashSet<&TaskId> = HashSet::new();
    let mut batches: Vec<Vec<&TaskNode>> = Vec::new();

    while scheduled.len() < graph.len() {
        let current: Vec<&TaskNode> = graph
            .nodes()
            .iter()
            .filter(|t| !scheduled.contains(&t.id))
            .filter(|t| t.predecessors.iter().all(|p| scheduled.contains(p)))
            .collect();

        if current.is_empty() {
            warn!("Unresolved dependencies while batching; grouping remaining tasks");
            let remaining: Vec<&TaskNode> = graph
                .nodes()
                .iter()
                .filter(|t| !scheduled.contains(&t.id))
                .collect();
            batches.push(remaining);
            break;
        }

        scheduled.extend(current.iter().copied().map(|t| &t.id));
        batches.push(current);
    }

    batches
}

/// Longest predecessor chain through the graph
fn critical_path(graph: &TaskGraph) -> Vec<TaskId> {
    let Ok(order) = graph.topological_order() else {
        return Vec::new();
    };

    let mut depth: HashMap<&TaskId, (usize, Option<&TaskId>)> = HashMap::new();
    for id in &order {
        let Some(node) = graph.task(id) else { continue };
        let best = node
            .predecessors
            .iter()
            .rev()
            .filter_map(|p| depth.get(p).map(|(d, _)| (*d, p)))
            .max_by_key(|(d, _)| *d);
        let entry = match best {
            Some((d, p)) => (d + 1, Some(p)),
            None => (1, None),
        };
        depth.insert(id, entry);
    }

    let mut cursor = order
        .iter()
        .max_by_key(|id| depth.get(id).map(|(d, _)| *d).unwrap_or(0));
    let mut path = Vec::new();
    while let Some(id) = cursor {
        path.push(id.clone());
        cursor = depth.get(id).and_then(|(_, parent)| *parent);
    }
    path.reverse();
    path
}

/// Render the graph as an execution plan YAML document.
pub fn render_execution_plan(graph: &TaskGraph) -> serde_yaml::Result<String> {
    let batches: Vec<Batch> = execution_batches(graph)
        .into_iter()
        .enumerate()
        .map(|(idx, tasks)| {
            let stage = tasks
                .first()
                .map(|t| t.stage.to_string())
                .unwrap_or_default();
            let count = tasks.len();
            Batch {
                batch_id: idx + 1,
                description: format!("Stage {} - {} task(s)", stage, count),
                stage,
                tasks: tasks
                    .into_iter()
                    .map(|t| BatchTask {
                        task_id: t.id.clone(),
                        path: t.output_path.clone(),
                        critical: t.critical,
                        predecessors: t.predecessors.clone(),
                        features: t.features.iter().map(|f| f.description.clone()).collect(),
                    })
                    .collect(),
                parallelization_rationale: if idx == 0 {
                    "No dependencies".to_string()
                } else {
                    format!("All dependencies satisfied by batch {}", idx)
                },
            }
        })
        .collect();

    let total_batches = batches.len();
    let widest = batches.iter().map(|b| b.tasks.len()).max().unwrap_or(0);
    let potential = match widest {
        0 | 1 => "low",
        2..=3 => "medium",
        _ => "high",
    };

    let plan = PlanDocument {
        execution_plan: ExecutionPlan {
            total_tasks: graph.len(),
            total_batches,
            batches,
            dependencies_summary: DependenciesSummary {
                critical_path: critical_path(graph),
                parallelization_potential: potential.to_string(),
                parallelization_explanation: format!(
                    "{} tasks across {} sequential batches, up to {} in parallel",
                    graph.len(),
                    total_batches,
                    widest
                ),
            },
        },
    };

    serde_yaml::to_string(&plan)
}
