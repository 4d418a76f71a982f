//! End-to-end builds against a stub synthesizer

use super::common::*;
use std::sync::Arc;
use synthforge::error::{BuildError, PlanningError, TaskError};
use synthforge::planner::MANIFEST_FILE;
use synthforge::spec::{FeatureRequest, ProjectSpec, StageKind};
use synthforge::synthesis::SynthesisOutcome;
use synthforge_sdk::{BuildEvent, BuildStatus, TaskStatus};
use tokio_util::sync::CancellationToken;

// ============================================================================
// Terminal Statuses
// ============================================================================

#[tokio::test]
async fn test_flaky_middle_stage_completes() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().script(
        B,
        vec![
            SynthesisOutcome::BackendUnavailable("connection reset".to_string()),
            SynthesisOutcome::BackendUnavailable("503 overloaded".to_string()),
        ],
    ));

    let result = coordinator(test_config(), stub.clone())
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Completed);
    assert_eq!(result.artifacts_written, 3);
    assert_eq!(result.retries(B), Some(2));
    assert_eq!(result.retries(A), Some(0));
    assert!(result.failed.is_empty());
    assert!(result.blocked.is_empty());
    assert!(!result.cancelled);

    for path in ["src/data/load.py", "src/eda/plots.py", "src/features/lags.py"] {
        assert!(dir.path().join(path).is_file(), "missing {}", path);
    }
    assert_eq!(stub.calls_for(B).len(), 3);
}

#[tokio::test]
async fn test_unusable_first_stage_fails_build() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().always(
        A,
        SynthesisOutcome::Unusable("no code block in response".to_string()),
    ));

    let result = coordinator(test_config(), stub.clone())
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Failed);
    assert_eq!(result.failed_ids(), vec![A.to_string()]);
    assert_eq!(
        result.failed[0].cause,
        TaskError::Unusable("no code block in response".to_string())
    );
    assert_eq!(result.artifacts_written, 0);
    assert_eq!(result.blocked.len(), 2);
    assert_eq!(result.task_status(B), Some(TaskStatus::Pending));
    assert_eq!(result.task_status(C), Some(TaskStatus::Pending));

    assert!(!dir.path().join("src/eda/plots.py").exists());
    assert!(!dir.path().join("src/features/lags.py").exists());
    assert!(stub.calls_for(B).is_empty());
    assert!(stub.calls_for(C).is_empty());
}

#[tokio::test]
async fn test_failed_docs_task_is_partial() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ProjectSpec::new("docs", dir.path())
        .with_feature(
            FeatureRequest::new("Load the weekly spend table", 0)
                .in_stage(StageKind::DataPipeline)
                .at_path("src/data/load.py"),
        )
        .with_feature(FeatureRequest::new("README with setup instructions", 0).in_stage(StageKind::TestsDocs));
    let stub = Arc::new(StubSynthesizer::new().always(
        "tests_docs.1",
        SynthesisOutcome::BackendRejected("content policy".to_string()),
    ));

    let result = coordinator(test_config(), stub)
        .run(spec, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::PartiallyCompleted);
    assert_eq!(result.failed_ids(), vec!["tests_docs.1".to_string()]);
    assert!(!result.failed[0].critical);
    assert!(result.blocked.is_empty());
    assert_eq!(result.artifacts_written, 1);
    assert!(!dir.path().join("README.md").exists());
}

#[tokio::test]
async fn test_optional_failure_degrades_dependents() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ProjectSpec::new("degraded", dir.path())
        .with_feature(
            FeatureRequest::new("Load the weekly spend table", 0)
                .in_stage(StageKind::DataPipeline)
                .at_path("src/data/load.py"),
        )
        .with_feature(FeatureRequest {
            optional: true,
            ..FeatureRequest::new("Optional correlation heatmap", 0)
                .in_stage(StageKind::Exploration)
                .at_path("src/eda/heatmap.py")
        })
        .with_feature(
            FeatureRequest::new("Build lagged spend columns", 0)
                .in_stage(StageKind::FeatureEngineering)
                .at_path("src/features/lags.py"),
        );
    let stub = Arc::new(
        StubSynthesizer::new().always(B, SynthesisOutcome::Unusable("empty response".to_string())),
    );

    let result = coordinator(test_config(), stub.clone())
        .run(spec, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::PartiallyCompleted);
    assert_eq!(result.task_status(C), Some(TaskStatus::Succeeded));
    assert_eq!(result.artifacts_written, 2);

    let calls = stub.calls_for(C);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].degraded, vec![B.to_string()]);
    assert!(calls[0].predecessors.is_empty());
}

// ============================================================================
// Output Tree
// ============================================================================

#[tokio::test]
async fn test_manifest_records_graph() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new());

    let result = coordinator(test_config(), stub)
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, BuildStatus::Completed);

    let manifest = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
    let doc: serde_yaml::Value = serde_yaml::from_str(&manifest).unwrap();
    assert_eq!(doc["project"].as_str(), Some("chain"));

    let tasks = doc["tasks"].as_sequence().unwrap();
    assert_eq!(tasks.len(), 3);
    assert_eq!(tasks[1]["id"].as_str(), Some(B));
    assert_eq!(tasks[1]["status"].as_str(), Some("succeeded"));
    assert_eq!(tasks[1]["predecessors"][0].as_str(), Some(A));
    assert_eq!(tasks[2]["path"].as_str(), Some("src/features/lags.py"));
}

#[tokio::test]
async fn test_manifest_can_be_disabled() {
    let dir = tempfile::tempdir().unwrap();
    let config = synthforge::BuildConfig {
        write_manifest: false,
        ..test_config()
    };

    coordinator(config, Arc::new(StubSynthesizer::new()))
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert!(!dir.path().join(MANIFEST_FILE).exists());
}

#[tokio::test]
async fn test_path_collision_never_starts() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let spec = ProjectSpec::new("clash", &out)
        .with_feature(
            FeatureRequest::new("Load spend", 0)
                .in_stage(StageKind::DataPipeline)
                .at_path("src/data/load.py"),
        )
        .with_feature(
            FeatureRequest::new("Load revenue", 0)
                .in_stage(StageKind::DataPipeline)
                .at_path("src/data/load.py"),
        );
    let stub = Arc::new(StubSynthesizer::new());

    let err = coordinator(test_config(), stub.clone())
        .run(spec, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BuildError::Planning(PlanningError::PathConflict { .. })
    ));
    assert!(stub.calls().is_empty());
    assert!(!out.exists());
}

#[tokio::test]
async fn test_events_bracket_the_build() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(test_config(), Arc::new(StubSynthesizer::new()));

    coordinator
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    let events = coordinator.reporter().history();
    assert!(matches!(
        events.first(),
        Some(BuildEvent::BuildStarted { total_stages: 3, total_tasks: 3, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(BuildEvent::BuildFinished { status: BuildStatus::Completed, artifacts_written: 3, .. })
    ));

    let committed = events
        .iter()
        .filter(|e| matches!(e, BuildEvent::ArtifactCommitted { .. }))
        .count();
    assert_eq!(committed, 3);
    assert_eq!(
        transitions(&events, A),
        vec![
            (TaskStatus::Pending, TaskStatus::Ready),
            (TaskStatus::Ready, TaskStatus::Running),
            (TaskStatus::Running, TaskStatus::Succeeded),
        ]
    );
}
