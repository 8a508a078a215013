//! Stall detection and deployment retry scenarios.

mod common;

use chrono::{Duration, Utc};

use code_host_engine::{WorkflowConclusion, WorkflowRunStatus};
use request_pipeline::config::PipelineConfig;
use request_pipeline::workers::orchestrator::OrchestratorWorker;
use request_store::{DeploymentStatus, ImplementationStatus, PipelineState};

use common::*;

/// A request sitting in ArchitectReview past the threshold is flagged
/// exactly once.
#[tokio::test]
async fn stalled_architect_review_is_flagged_once() {
    let h = harness(PipelineConfig::default());
    let project = seed_project(&h).await;
    let request = seed_feature(&h, project.id, 5).await;
    h.store
        .override_request(request.id, |r| r.state = PipelineState::ArchitectReview)
        .await
        .unwrap();

    let orchestrator = OrchestratorWorker::new(h.ctx.clone());

    // Two simulated days in: under the 3-day threshold, still fine.
    let report = orchestrator.run_cycle(Utc::now() + Duration::days(2)).await;
    assert_eq!(report.processed, 0);
    assert!(
        h.store
            .get_request(request.id)
            .await
            .unwrap()
            .stall_notified_at
            .is_none()
    );

    // Four simulated days with no human comment: flagged.
    let report = orchestrator.run_cycle(Utc::now() + Duration::days(4)).await;
    assert_eq!(report.processed, 1);
    let flagged_at = h
        .store
        .get_request(request.id)
        .await
        .unwrap()
        .stall_notified_at
        .expect("stall flag set");

    // Later cycles emit nothing new.
    let report = orchestrator.run_cycle(Utc::now() + Duration::days(5)).await;
    assert_eq!(report.processed, 0);
    assert_eq!(
        h.store
            .get_request(request.id)
            .await
            .unwrap()
            .stall_notified_at,
        Some(flagged_at)
    );
}

/// A failed deployment retries up to the bound, then flags the stall.
#[tokio::test]
async fn deployment_failure_retries_then_stalls() {
    let mut cfg = PipelineConfig::default();
    cfg.orchestrator.deploy_workflows = vec!["deploy-api.yml".into()];
    let h = harness(cfg);
    let project = seed_project(&h).await;
    let request = seed_feature(&h, project.id, 6).await;
    h.store
        .override_request(request.id, |r| {
            r.state = PipelineState::Done;
            r.implementation_status = Some(ImplementationStatus::PrMerged);
            r.pr_number = Some(30);
            r.completed_at = Some(Utc::now() - Duration::minutes(5));
            r.deployment_status = DeploymentStatus::Pending;
        })
        .await
        .unwrap();

    let orchestrator = OrchestratorWorker::new(h.ctx.clone());

    // A run appears and the deployment moves to InProgress.
    let run = h
        .host
        .script_run("deploy-api", "main", WorkflowRunStatus::InProgress, None);
    orchestrator.run_cycle(Utc::now()).await;
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.deployment_status, DeploymentStatus::InProgress);
    assert_eq!(r.deployment_run_id, Some(run));

    // First failure: rerun-failed-jobs, Failed → Pending, retry count 1.
    h.host.script_run_result(
        run,
        WorkflowRunStatus::Completed,
        Some(WorkflowConclusion::Failure),
    );
    orchestrator.run_cycle(Utc::now()).await;
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.deployment_status, DeploymentStatus::Pending);
    assert_eq!(r.deployment_retry_count, 1);
    assert_eq!(h.host.rerun_calls(), vec![run]);

    // Fail the retried run twice more: fresh dispatches, counts 2 and 3.
    for expected_count in [2u32, 3] {
        orchestrator.run_cycle(Utc::now()).await; // Pending → InProgress
        let r = h.store.get_request(request.id).await.unwrap();
        let live = r.deployment_run_id.unwrap();
        h.host.script_run_result(
            live,
            WorkflowRunStatus::Completed,
            Some(WorkflowConclusion::Failure),
        );
        orchestrator.run_cycle(Utc::now()).await; // failure → retry
        let r = h.store.get_request(request.id).await.unwrap();
        assert_eq!(r.deployment_status, DeploymentStatus::Pending);
        assert_eq!(r.deployment_retry_count, expected_count);
    }
    assert!(!h.host.dispatched_workflows().is_empty());

    // Fourth failure exhausts the bound: Failed stays, stall flagged.
    orchestrator.run_cycle(Utc::now()).await; // Pending → InProgress
    let r = h.store.get_request(request.id).await.unwrap();
    let live = r.deployment_run_id.unwrap();
    h.host.script_run_result(
        live,
        WorkflowRunStatus::Completed,
        Some(WorkflowConclusion::Failure),
    );
    orchestrator.run_cycle(Utc::now()).await;

    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.deployment_status, DeploymentStatus::Failed);
    assert_eq!(r.deployment_retry_count, 3);
    assert!(r.stall_notified_at.is_some());
}

/// Approved requests with no session stall after a day of silence.
#[tokio::test]
async fn approved_without_session_stalls_after_a_day() {
    let h = harness(PipelineConfig::default());
    let project = seed_project(&h).await;
    let request = seed_feature(&h, project.id, 8).await;
    h.store
        .override_request(request.id, |r| r.state = PipelineState::Approved)
        .await
        .unwrap();

    let orchestrator = OrchestratorWorker::new(h.ctx.clone());
    orchestrator.run_cycle(Utc::now() + Duration::days(2)).await;

    let r = h.store.get_request(request.id).await.unwrap();
    assert!(r.stall_notified_at.is_some());

    // Health counters see the stall.
    let counters = h.store.health_counters().await;
    assert_eq!(counters.stalled, 1);
    assert_eq!(counters.pending, 1);
}
