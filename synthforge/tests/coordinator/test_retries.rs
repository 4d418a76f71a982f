//! Retry accounting and escalation

use super::common::*;
use std::sync::Arc;
use synthforge::error::TaskError;
use synthforge::spec::{FeatureRequest, ProjectSpec, StageKind};
use synthforge::synthesis::SynthesisOutcome;
use synthforge_sdk::{BuildEvent, BuildStatus, TaskStatus};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_exhausted_task_fails_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().always(
        A,
        SynthesisOutcome::Unusable("response truncated".to_string()),
    ));
    let coordinator = coordinator(test_config(), stub.clone());

    let result = coordinator
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    // One attempt plus max_revision_retries
    assert_eq!(stub.calls_for(A).len(), 3);
    assert_eq!(result.retries(A), Some(2));

    let events = coordinator.reporter().history();
    let failed = transitions(&events, A)
        .into_iter()
        .filter(|(_, to)| *to == TaskStatus::Failed)
        .count();
    assert_eq!(failed, 1);

    let node = result.graph.nodes().iter().find(|n| n.id.as_str() == A).unwrap();
    assert_eq!(node.transitions.len(), 3);
    assert_eq!(node.transitions.last().unwrap().to, TaskStatus::Failed);
    assert!(node.last_artifact.is_none());
}

#[tokio::test]
async fn test_rejection_feedback_reaches_next_attempt() {
    let dir = tempfile::tempdir().unwrap();
    let spec = ProjectSpec::new("feedback", dir.path()).with_feature(FeatureRequest {
        exports: vec!["load_spend".to_string()],
        ..FeatureRequest::new("Load the weekly spend table", 0)
            .in_stage(StageKind::DataPipeline)
            .at_path("src/data/load.py")
    });
    let stub = Arc::new(StubSynthesizer::new().script(
        A,
        vec![
            SynthesisOutcome::Usable("def load_spend(:\n    pass\n".to_string()),
            SynthesisOutcome::Usable("def other():\n    return 1\n".to_string()),
        ],
    ));

    let result = coordinator(test_config(), stub.clone())
        .run(spec, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Completed);
    assert_eq!(result.retries(A), Some(2));

    let calls = stub.calls_for(A);
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.iter().map(|c| c.attempt).collect::<Vec<_>>(), vec![1, 2, 3]);
    assert!(calls[0].feedback.is_empty());
    assert!(calls[1].feedback[0].starts_with("syntax check failed"));
    assert_eq!(
        calls[2].feedback[1],
        "interface check failed: missing definition of load_spend"
    );

    let written = std::fs::read_to_string(dir.path().join("src/data/load.py")).unwrap();
    assert!(written.contains("def load_spend"));
}

#[tokio::test]
async fn test_backend_and_revision_budgets_are_independent() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().script(
        A,
        vec![
            SynthesisOutcome::BackendUnavailable("timeout".to_string()),
            SynthesisOutcome::Unusable("empty response".to_string()),
            SynthesisOutcome::BackendUnavailable("timeout".to_string()),
            SynthesisOutcome::Unusable("empty response".to_string()),
            SynthesisOutcome::BackendUnavailable("timeout".to_string()),
        ],
    ));

    let result = coordinator(test_config(), stub.clone())
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Completed);
    assert_eq!(result.retries(A), Some(5));

    assert_eq!(stub.calls_for(A).len(), 6);
}

#[tokio::test]
async fn test_failure_cause_is_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().script(
        A,
        vec![
            SynthesisOutcome::Unusable("empty response".to_string()),
            SynthesisOutcome::Unusable("empty response".to_string()),
            SynthesisOutcome::BackendRejected("invalid request".to_string()),
            SynthesisOutcome::BackendRejected("invalid request".to_string()),
            SynthesisOutcome::BackendRejected("invalid request".to_string()),
            SynthesisOutcome::BackendRejected("invalid request".to_string()),
        ],
    ));
    let coordinator = coordinator(test_config(), stub.clone());

    let result = coordinator
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Failed);
    assert_eq!(result.retries(A), Some(5));
    assert_eq!(
        result.failed[0].cause,
        TaskError::BackendRejected("invalid request".to_string())
    );

    let retried = coordinator
        .reporter()
        .history()
        .into_iter()
        .filter(|e| matches!(e, BuildEvent::TaskRetry { task_id, .. } if task_id == A))
        .count();
    assert_eq!(retried, 5);
}

#[tokio::test(start_paused = true)]
async fn test_backend_retries_back_off_exponentially() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().script(
        A,
        vec![
            SynthesisOutcome::BackendUnavailable("503".to_string()),
            SynthesisOutcome::BackendUnavailable("503".to_string()),
            SynthesisOutcome::BackendUnavailable("503".to_string()),
        ],
    ));
    let config = synthforge::BuildConfig {
        backoff_base_ms: 1_000,
        backoff_max_ms: 3_000,
        ..test_config()
    };

    let started = tokio::time::Instant::now();
    let result = coordinator(config, stub.clone())
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Completed);
    assert_eq!(result.retries(A), Some(3));
    assert_eq!(stub.calls_for(A).len(), 4);

    // 1s + 2s + 4s capped to 3s
    let elapsed = started.elapsed();
    assert!(elapsed >= std::time::Duration::from_secs(6), "{:?}", elapsed);
    assert!(elapsed < std::time::Duration::from_secs(7), "{:?}", elapsed);
}
