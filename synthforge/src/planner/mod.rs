//! Task planning: feature list -> stage-ordered task graph.
//!
//! Planning is pure and deterministic. It happens once per build, before
//! any synthesis, so every planning error surfaces before the first remote
//! call.
//!
//! 1. Resolve each feature's stage (declared, classified, or inherited)
//! 2. Split each stage into tasks
//! 3. Claim one output path per task
//! 4. Wire predecessor edges to the previous non-empty stage
//! 5. Attach interface requirements and verify the graph is acyclic

pub mod execution_plan;
pub mod graph;
pub mod paths;

pub use execution_plan::{execution_batches, render_execution_plan};
pub use graph::{Export, ExportKind, IllegalTransition, TaskGraph, TaskId, TaskNode, Transition};

use std::collections::{BTreeMap, HashMap};
use std::path::{Component, Path, PathBuf};
use synthforge_sdk::TaskStatus;
use tracing::debug;

use crate::error::PlanningError;
use crate::spec::{FeatureRequest, ProjectSpec, StageKind};

/// Dependency metadata written at the output root
pub const MANIFEST_FILE: &str = "synthforge-manifest.yaml";

#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// Upper bound on unlabelled features folded into one task
    pub max_features_per_task: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_features_per_task: 4,
        }
    }
}

/// Build the task graph for `spec`.
pub fn plan(spec: &ProjectSpec, config: &PlannerConfig) -> Result<TaskGraph, PlanningError> {
    if spec.features.is_empty() {
        return Err(PlanningError::NoFeatures);
    }

    let by_stage = group_by_stage(&spec.features);
    check_required_stages(&by_stage)?;

    let language = spec.language();
    let tools: Vec<String> = spec.tech_stack.values().map(|t| t.to_lowercase()).collect();
    let mut nodes: Vec<TaskNode> = Vec::new();
    let mut previous: Vec<TaskId> = Vec::new();

    for (&stage, features) in &by_stage {
        let groups = split_stage(stage, features, config.max_features_per_task.max(1));
        debug!(
            stage = stage.as_str(),
            features = features.len(),
            tasks = groups.len(),
            "Planned stage"
        );

        let mut current = Vec::with_capacity(groups.len());
        for (n, group) in groups.into_iter().enumerate() {
            let id = TaskId::for_stage(stage, n + 1);
            current.push(id.clone());
            nodes.push(new_node(id, stage, group, previous.clone(), &tools));
        }
        previous = current;
    }

    assign_paths(&mut nodes, &spec.output_path, |stage, lead| {
        paths::default_path(stage, lead, language)
    })?;
    resolve_consumes(&mut nodes)?;

    let graph = TaskGraph::new(nodes);
    graph.topological_order()?;
    Ok(graph)
}

/// Resolve each feature's stage and bucket features in stage order.
fn group_by_stage(features: &[FeatureRequest]) -> BTreeMap<StageKind, Vec<FeatureRequest>> {
    let mut by_stage: BTreeMap<StageKind, Vec<FeatureRequest>> = BTreeMap::new();
    let mut inherited = StageKind::DataPipeline;

    for feature in features {
        let stage = feature
            .stage
            .or_else(|| StageKind::classify(&feature.description))
            .unwrap_or(inherited);
        inherited = stage;
        by_stage.entry(stage).or_default().push(feature.clone());
    }

    for features in by_stage.values_mut() {
        features.sort_by_key(|f| f.order);
    }
    by_stage
}

fn check_required_stages(
    by_stage: &BTreeMap<StageKind, Vec<FeatureRequest>>,
) -> Result<(), PlanningError> {
    for stage in by_stage.keys() {
        if let Some(missing) = stage.requires().iter().find(|r| !by_stage.contains_key(r)) {
            return Err(PlanningError::MissingStage {
                stage: stage.to_string(),
                requires: missing.to_string(),
            });
        }
    }
    Ok(())
}

/// Labelled features, explicit-path features and every tests/docs feature
/// become their own task; the rest are chunked in insertion order.
fn split_stage(
    stage: StageKind,
    features: &[FeatureRequest],
    max_per_task: usize,
) -> Vec<Vec<FeatureRequest>> {
    let mut groups: Vec<Vec<FeatureRequest>> = Vec::new();
    let mut rest: Vec<FeatureRequest> = Vec::new();

    for feature in features {
        let standalone = stage == StageKind::TestsDocs
            || feature.path.is_some()
            || paths::split_label(&feature.description).is_some();
        if standalone {
            groups.push(vec![feature.clone()]);
        } else {
            rest.push(feature.clone());
        }
    }

    groups.extend(rest.chunks(max_per_task).map(<[FeatureRequest]>::to_vec));
    groups.sort_by_key(|g| g.first().map(|f| f.order));
    groups
}

fn new_node(
    id: TaskId,
    stage: StageKind,
    features: Vec<FeatureRequest>,
    predecessors: Vec<TaskId>,
    tools: &[String],
) -> TaskNode {
    let description = match features.as_slice() {
        [single] => single.description.clone(),
        many => many
            .iter()
            .map(|f| format!("- {}", f.description))
            .collect::<Vec<_>>()
            .join("\n"),
    };

    let mut exports: Vec<Export> = Vec::new();
    for feature in &features {
        for name in &feature.exports {
            push_export(&mut exports, Export::defined(name.clone()));
        }
    }
    // Tests and docs describe other files' components; they need not use them
    if stage != StageKind::TestsDocs {
        for feature in &features {
            for name in paths::component_identifiers(&feature.description, tools) {
                push_export(&mut exports, Export::referenced(name));
            }
        }
    }

    let checks = features.iter().flat_map(|f| f.checks.clone()).collect();
    let critical = stage.critical_by_default() && !features.iter().all(|f| f.optional);

    TaskNode {
        id,
        stage,
        features,
        description,
        predecessors,
        output_path: PathBuf::new(),
        exports,
        checks,
        critical,
        status: TaskStatus::Pending,
        retry_count: 0,
        last_artifact: None,
        last_error: None,
        transitions: Vec::new(),
    }
}

/// Add an export; a Defined requirement upgrades an existing Referenced one.
fn push_export(exports: &mut Vec<Export>, export: Export) {
    match exports.iter_mut().find(|e| e.name == export.name) {
        Some(existing) => {
            if export.kind == ExportKind::Defined {
                existing.kind = ExportKind::Defined;
            }
        }
        None => exports.push(export),
    }
}

/// Claim explicit paths first, then derive the rest around them.
fn assign_paths(
    nodes: &mut [TaskNode],
    output_root: &Path,
    derive: impl Fn(StageKind, &str) -> PathBuf,
) -> Result<(), PlanningError> {
    let mut claims: HashMap<PathBuf, TaskId> = HashMap::new();
    claims.insert(PathBuf::from(MANIFEST_FILE), TaskId::new("manifest"));

    for node in nodes.iter_mut() {
        let Some(explicit) = node.features.iter().find_map(|f| f.path.as_deref()) else {
            continue;
        };
        let path = normalize(explicit);
        if let Some(first) = claims.get(&path) {
            return Err(PlanningError::PathConflict {
                path,
                first: first.clone(),
                second: node.id.clone(),
            });
        }
        claims.insert(path.clone(), node.id.clone());
        node.output_path = path;
    }

    for node in nodes.iter_mut() {
        if !node.output_path.as_os_str().is_empty() {
            continue;
        }
        let lead = node
            .features
            .first()
            .map(|f| f.description.as_str())
            .unwrap_or_default();
        let path = paths::disambiguate(derive(node.stage, lead), |p| claims.contains_key(p));
        claims.insert(path.clone(), node.id.clone());
        node.output_path = path;
    }

    for node in nodes.iter() {
        if output_root.join(&node.output_path).exists() {
            return Err(PlanningError::ExistingFile {
                path: node.output_path.clone(),
                task: node.id.clone(),
            });
        }
    }
    Ok(())
}

/// Attach every consumed identifier to the previous-stage tasks mentioning it.
fn resolve_consumes(nodes: &mut [TaskNode]) -> Result<(), PlanningError> {
    let mut attachments: Vec<(usize, String)> = Vec::new();

    for node in nodes.iter() {
        for identifier in node.features.iter().flat_map(|f| &f.consumes) {
            let providers: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|(_, p)| node.predecessors.contains(&p.id))
                .filter(|(_, p)| mentions(p, identifier))
                .map(|(i, _)| i)
                .collect();

            if providers.is_empty() {
                return Err(PlanningError::UnresolvedConsume {
                    task: node.id.clone(),
                    identifier: identifier.clone(),
                });
            }
            attachments.extend(providers.into_iter().map(|i| (i, identifier.clone())));
        }
    }

    for (i, identifier) in attachments {
        push_export(&mut nodes[i].exports, Export::defined(identifier));
    }
    Ok(())
}

fn mentions(node: &TaskNode, identifier: &str) -> bool {
    node.exports.iter().any(|e| e.name == identifier)
        || node
            .features
            .iter()
            .any(|f| f.description.contains(identifier))
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
