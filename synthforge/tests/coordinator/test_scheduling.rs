//! Stage ordering and concurrency

use super::common::*;
use std::sync::Arc;
use std::time::Duration;
use synthforge::spec::{FeatureRequest, ProjectSpec, StageKind};
use synthforge_sdk::{BuildEvent, BuildStatus, TaskStatus};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_slow_predecessor_delays_successor() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().delay(A, Duration::from_millis(150)));
    let coordinator = coordinator(test_config(), stub.clone());

    let result = coordinator
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, BuildStatus::Completed);

    let events = coordinator.reporter().history();
    let a_done = position(&events, A, TaskStatus::Succeeded).unwrap();
    let b_running = position(&events, B, TaskStatus::Running).unwrap();
    let b_done = position(&events, B, TaskStatus::Succeeded).unwrap();
    let c_running = position(&events, C, TaskStatus::Running).unwrap();
    assert!(a_done < b_running);
    assert!(b_done < c_running);

    // Successors see their predecessors' artifacts by reference
    let calls = stub.calls();
    let order: Vec<&str> = calls.iter().map(|c| c.task.as_str()).collect();
    assert_eq!(order, vec![A, B, C]);
    assert_eq!(calls[1].predecessors, vec![A.to_string()]);
    assert_eq!(calls[2].predecessors, vec![B.to_string()]);
}

#[tokio::test]
async fn test_stage_tasks_run_concurrently_within_bound() {
    let dir = tempfile::tempdir().unwrap();
    let mut spec = ProjectSpec::new("wide", dir.path());
    for n in 1..=5 {
        spec = spec.with_feature(
            FeatureRequest::new(format!("Loader for source {}", n), 0)
                .in_stage(StageKind::DataPipeline)
                .at_path(format!("src/data/source_{}.py", n)),
        );
    }

    let mut stub = StubSynthesizer::new();
    for n in 1..=5 {
        stub = stub.delay(&format!("data_pipeline.{}", n), Duration::from_millis(50));
    }
    let stub = Arc::new(stub);
    let config = synthforge::BuildConfig {
        max_concurrency: 2,
        ..test_config()
    };

    let result = coordinator(config, stub.clone())
        .run(spec, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.status, BuildStatus::Completed);
    assert_eq!(result.artifacts_written, 5);
    assert_eq!(stub.max_in_flight(), 2);
}

#[tokio::test]
async fn test_stage_events_follow_stage_order() {
    let dir = tempfile::tempdir().unwrap();
    let coordinator = coordinator(test_config(), Arc::new(StubSynthesizer::new()));

    coordinator
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();

    let started: Vec<(String, usize)> = coordinator
        .reporter()
        .history()
        .into_iter()
        .filter_map(|e| match e {
            BuildEvent::StageStarted { stage, index, .. } => Some((stage, index)),
            _ => None,
        })
        .collect();
    assert_eq!(
        started,
        vec![
            ("data_pipeline".to_string(), 1),
            ("exploration".to_string(), 2),
            ("feature_engineering".to_string(), 3),
        ]
    );
}

#[tokio::test]
async fn test_blocked_stage_emits_no_stage_events() {
    let dir = tempfile::tempdir().unwrap();
    let stub = Arc::new(StubSynthesizer::new().always(
        A,
        synthforge::synthesis::SynthesisOutcome::BackendUnavailable("down".to_string()),
    ));
    let coordinator = coordinator(test_config(), stub);

    let result = coordinator
        .run(three_stage_spec(dir.path()), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.status, BuildStatus::Failed);

    let events = coordinator.reporter().history();
    assert!(events.iter().any(|e| matches!(
        e,
        BuildEvent::StageFailed { stage, failed_tasks } if stage == "data_pipeline" && failed_tasks == &vec![A.to_string()]
    )));
    assert!(!events.iter().any(|e| matches!(
        e,
        BuildEvent::StageStarted { stage, .. } if stage == "exploration"
    )));
    assert!(transitions(&events, B).is_empty());
}
