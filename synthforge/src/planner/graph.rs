//! Task graph: nodes, their state machine and the audit trail.
//!
//! Nodes are created by the planner and afterwards only transitioned; nothing
//! is ever removed, so the final graph doubles as the record of the build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;
use synthforge_sdk::TaskStatus;
use thiserror::Error;

use crate::error::{PlanningError, TaskError};
use crate::spec::{FeatureRequest, StageKind};

/// Task identifier, `<stage>.<n>` with `n` starting at 1
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn for_stage(stage: StageKind, n: usize) -> Self {
        Self(format!("{}.{}", stage.as_str(), n))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How strictly an identifier must show up in the artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// The artifact must contain a definition (`class X`, `def X`, `X = ...`)
    Defined,
    /// The artifact must mention the identifier
    Referenced,
}

/// Interface requirement attached to a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Export {
    pub name: String,
    pub kind: ExportKind,
}

impl Export {
    pub fn defined(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExportKind::Defined,
        }
    }

    pub fn referenced(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ExportKind::Referenced,
        }
    }
}

/// One entry of a task's transition log
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Illegal transition for task {task}: {from} -> {to}")]
pub struct IllegalTransition {
    pub task: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A unit of synthesis work producing exactly one artifact
#[derive(Debug, Clone)]
pub struct TaskNode {
    pub id: TaskId,
    pub stage: StageKind,
    pub features: Vec<FeatureRequest>,

    /// Feature descriptions as one prompt-ready block
    pub description: String,

    pub predecessors: Vec<TaskId>,

    /// Claimed path, relative to the output root
    pub output_path: PathBuf,

    pub exports: Vec<Export>,

    /// Embedded test snippets for behavior validation
    pub checks: Vec<String>,

    /// A failed critical task blocks its dependents
    pub critical: bool,

    pub status: TaskStatus,
    pub retry_count: u32,

    /// Committed artifact, absolute path
    pub last_artifact: Option<PathBuf>,
    pub last_error: Option<TaskError>,
    pub transitions: Vec<Transition>,
}

impl TaskNode {
    /// Move to `to`, recording the step; illegal moves leave the node untouched.
    pub fn transition(&mut self, to: TaskStatus) -> Result<Transition, IllegalTransition> {
        if !self.status.can_transition_to(to) {
            return Err(IllegalTransition {
                task: self.id.clone(),
                from: self.status,
                to,
            });
        }

        let step = Transition {
            from: self.status,
            to,
            at: Utc::now(),
        };
        self.status = to;
        self.transitions.push(step.clone());
        Ok(step)
    }

    /// Identifiers this task must define
    pub fn defined_exports(&self) -> impl Iterator<Item = &str> {
        self.exports
            .iter()
            .filter(|e| e.kind == ExportKind::Defined)
            .map(|e| e.name.as_str())
    }
}

/// Directed acyclic graph of tasks in stage order
#[derive(Debug, Clone)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<TaskId, usize>,
}

impl TaskGraph {
    /// Nodes must already be sorted by stage, then by feature order.
    pub fn new(nodes: Vec<TaskNode>) -> Self {
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();
        Self { nodes, index }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[TaskNode] {
        &self.nodes
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut TaskNode> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.nodes[i]),
            None => None,
        }
    }

    /// Non-empty stages in execution order
    pub fn stages(&self) -> Vec<StageKind> {
        let stages: BTreeSet<StageKind> = self.nodes.iter().map(|n| n.stage).collect();
        stages.into_iter().collect()
    }

    pub fn tasks_in(&self, stage: StageKind) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter().filter(move |n| n.stage == stage)
    }

    /// Kahn's algorithm, breaking ties by planner order.
    ///
    /// Fails with [`PlanningError::Stranded`] listing every task that can
    /// never run (cycles or dangling predecessors).
    pub fn topological_order(&self) -> Result<Vec<TaskId>, PlanningError> {
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut successors: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut dangling = vec![false; self.nodes.len()];

        for (i, node) in self.nodes.iter().enumerate() {
            for pred in &node.predecessors {
                match self.index.get(pred) {
                    Some(&p) => {
                        successors[p].push(i);
                        in_degree[i] += 1;
                    }
                    None => dangling[i] = true,
                }
            }
        }

        let mut ready: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0 && !dangling[i])
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &s in &successors[i] {
                in_degree[s] -= 1;
                if in_degree[s] == 0 && !dangling[s] {
                    ready.insert(s);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let placed: BTreeSet<usize> = order.iter().copied().collect();
            let tasks = (0..self.nodes.len())
                .filter(|i| !placed.contains(i))
                .map(|i| self.nodes[i].id.clone())
                .collect();
            return Err(PlanningError::Stranded { tasks });
        }

        Ok(order.into_iter().map(|i| self.nodes[i].id.clone()).collect())
    }
}
