//! Tests for the planned task graph

use super::common::*;
use std::collections::HashSet;
use std::path::PathBuf;
use synthforge::error::PlanningError;
use synthforge::planner::{plan, ExportKind, PlannerConfig, MANIFEST_FILE};
use synthforge::spec::{FeatureRequest, ProjectSpec, StageKind};
use synthforge_sdk::TaskStatus;

// ============================================================================
// Demo Project
// ============================================================================

#[test]
fn test_every_stage_is_planned() {
    let dir = tempfile::tempdir().unwrap();
    let graph = demo_graph(dir.path());

    assert_eq!(graph.stages(), StageKind::ALL.to_vec());
    assert!(graph.nodes().iter().all(|n| n.status == TaskStatus::Pending));

    let planned: usize = graph.nodes().iter().map(|n| n.features.len()).sum();
    assert_eq!(planned, demo_spec(dir.path()).features.len());
}

#[test]
fn test_topological_order_respects_stage_order() {
    let dir = tempfile::tempdir().unwrap();
    let graph = demo_graph(dir.path());

    let order = graph.topological_order().unwrap();
    assert_eq!(order.len(), graph.len());

    let stages: Vec<StageKind> = order
        .iter()
        .map(|id| graph.task(id).unwrap().stage)
        .collect();
    assert!(stages.windows(2).all(|w| w[0] <= w[1]));
}

#[test]
fn test_edges_link_adjacent_stages() {
    let dir = tempfile::tempdir().unwrap();
    let graph = demo_graph(dir.path());
    let stages = graph.stages();

    for pair in stages.windows(2) {
        let previous: HashSet<_> = graph.tasks_in(pair[0]).map(|n| n.id.clone()).collect();
        for node in graph.tasks_in(pair[1]) {
            let preds: HashSet<_> = node.predecessors.iter().cloned().collect();
            assert_eq!(preds, previous, "{}", node.id);
        }
    }
    assert!(graph
        .tasks_in(StageKind::DataPipeline)
        .all(|n| n.predecessors.is_empty()));
}

#[test]
fn test_paths_are_unique() {
    let dir = tempfile::tempdir().unwrap();
    let graph = demo_graph(dir.path());

    let mut seen = HashSet::new();
    for node in graph.nodes() {
        assert!(seen.insert(node.output_path.clone()), "{:?}", node.output_path);
        assert_ne!(node.output_path, PathBuf::from(MANIFEST_FILE));
        assert!(node.output_path.is_relative());
    }
    assert!(seen.contains(&PathBuf::from("README.md")));
    assert!(seen.contains(&PathBuf::from("src/models/mmm.py")));
}

#[test]
fn test_tests_and_docs_are_not_critical() {
    let dir = tempfile::tempdir().unwrap();
    let graph = demo_graph(dir.path());

    for node in graph.nodes() {
        if node.stage == StageKind::TestsDocs {
            assert!(!node.critical, "{}", node.id);
            assert_eq!(node.features.len(), 1);
        }
    }
    assert!(graph
        .tasks_in(StageKind::ModelArchitecture)
        .all(|n| n.critical));
}

#[test]
fn test_consumed_identifiers_become_provider_exports() {
    let dir = tempfile::tempdir().unwrap();
    let graph = demo_graph(dir.path());

    let model = graph
        .nodes()
        .iter()
        .find(|n| n.output_path == PathBuf::from("src/models/mmm.py"))
        .unwrap();
    assert!(model
        .exports
        .iter()
        .any(|e| e.name == "MarketingMixModel" && e.kind == ExportKind::Defined));

    let adstock = graph
        .nodes()
        .iter()
        .find(|n| n.output_path == PathBuf::from("src/features/adstock.py"))
        .unwrap();
    assert!(adstock.defined_exports().any(|e| e == "beta_gamma_adstock"));
}

// ============================================================================
// Planning Errors
// ============================================================================

#[test]
fn test_existing_file_is_a_conflict() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("src/models")).unwrap();
    std::fs::write(dir.path().join("src/models/mmm.py"), "# hand written\n").unwrap();

    let err = plan(&demo_spec(dir.path()), &PlannerConfig::default()).unwrap_err();
    assert!(matches!(
        err,
        PlanningError::ExistingFile { path, .. } if path == PathBuf::from("src/models/mmm.py")
    ));
}

#[test]
fn test_training_without_model_architecture() {
    let spec = ProjectSpec::new("broken", "/nonexistent/synthforge-broken")
        .with_feature(FeatureRequest::new("Load data", 0).in_stage(StageKind::DataPipeline))
        .with_feature(FeatureRequest::new("Fit with Adam", 0).in_stage(StageKind::Training));

    let err = plan(&spec, &PlannerConfig::default()).unwrap_err();
    assert!(matches!(err, PlanningError::MissingStage { .. }));
}

#[test]
fn test_no_features() {
    let spec = ProjectSpec::new("empty", "/nonexistent/synthforge-empty");
    assert!(matches!(
        plan(&spec, &PlannerConfig::default()),
        Err(PlanningError::NoFeatures)
    ));
}

#[test]
fn test_chunk_size_bounds_features_per_task() {
    let dir = tempfile::tempdir().unwrap();
    let config = PlannerConfig {
        max_features_per_task: 2,
    };
    let graph = plan(&demo_spec(dir.path()), &config).unwrap();

    assert!(graph.nodes().iter().all(|n| n.features.len() <= 2));
    let wide = demo_graph(dir.path());
    assert!(graph.len() > wide.len());
}
