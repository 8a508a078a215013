//! End-to-end pipeline scenarios against the in-memory store, scripted LLM
//! and in-memory code host.

mod common;

use chrono::Utc;

use code_host_engine::{WorkflowConclusion, WorkflowRunStatus};
use request_pipeline::config::PipelineConfig;
use request_pipeline::workers::architect::ArchitectWorker;
use request_pipeline::workers::code_review::CodeReviewWorker;
use request_pipeline::workers::implementation::ImplementationTriggerWorker;
use request_pipeline::workers::orchestrator::OrchestratorWorker;
use request_pipeline::workers::pr_monitor::PullRequestMonitorWorker;
use request_pipeline::workers::triage::TriageWorker;
use request_pipeline::ops::PipelineOps;
use request_store::{
    DeploymentStatus, ImplementationStatus, NewComment, PipelineState, TriageDecision,
};

use common::*;

/// Happy path in Auto mode: New, Triaged, ArchitectReview, Approved,
/// InProgress (Pending, PrOpened, ReviewApproved, PrMerged), Done, and a
/// succeeded deployment.
#[tokio::test]
async fn happy_path_reaches_done_and_deployed() {
    let h = harness(PipelineConfig::default());
    seed_repo(&h);
    let project = seed_project(&h).await;
    let request = seed_feature(&h, project.id, 41).await;

    // Triage.
    h.llm.push_response(triage_approve_json());
    let report = TriageWorker::new(h.ctx.clone()).run_cycle(Utc::now()).await;
    assert_eq!(report.processed, 1);
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::Triaged);
    assert_eq!(r.triage_count, 1);
    assert!(h.host.labels_on(41).contains(&"agent:approved".to_string()));

    let triage = h.store.latest_triage_review(request.id).await.unwrap();
    assert_eq!(triage.decision, TriageDecision::Approve);
    assert_eq!(triage.alignment_score, 85);

    // Architect (two-phase).
    h.llm.push_response(selection_json());
    h.llm.push_response(solution_json());
    let report = ArchitectWorker::new(h.ctx.clone()).run_cycle(Utc::now()).await;
    assert_eq!(report.processed, 1);
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::ArchitectReview);

    let review = h.store.latest_architect_review(request.id).await.unwrap();
    assert_eq!(review.solution_summary, "Add a search endpoint");
    assert_eq!(review.files_analyzed, 2);
    assert!(review.paths_read.contains(&"src/api.rs".to_string()));

    // Human approval.
    let ops = PipelineOps::new(h.ctx.clone());
    ops.approve_architect(review.id, "admin", None).await.unwrap();
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::Approved);

    // Implementation trigger.
    let report = ImplementationTriggerWorker::new(h.ctx.clone())
        .run_cycle(Utc::now())
        .await;
    assert_eq!(report.processed, 1);
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::InProgress);
    assert_eq!(r.implementation_status, Some(ImplementationStatus::Pending));
    assert!(r.session_id.as_deref().unwrap().starts_with("session-"));
    let assignments = h.host.assignments();
    assert_eq!(assignments.len(), 1);
    assert_eq!(assignments[0].0, 41);
    assert!(assignments[0].1.instructions.contains("## Files to modify"));

    // Coding agent opens PR 27; the monitor records it.
    open_agent_pr(&h, 27, 41, "copilot-swe-agent");
    let report = PullRequestMonitorWorker::new(h.ctx.clone())
        .run_cycle(Utc::now())
        .await;
    assert_eq!(report.processed, 1);
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.implementation_status, Some(ImplementationStatus::PrOpened));
    assert_eq!(r.pr_number, Some(27));

    // Code review approves.
    h.llm.push_response(code_review_approved_json());
    let report = CodeReviewWorker::new(h.ctx.clone()).run_cycle(Utc::now()).await;
    assert_eq!(report.processed, 1);

    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(
        r.implementation_status,
        Some(ImplementationStatus::ReviewApproved)
    );
    assert!(h.host.labels_on(41).contains(&"review:approved".to_string()));

    let code_review = h.store.latest_code_review(request.id).await.unwrap();
    assert_eq!(code_review.quality_score, 8);
    assert_eq!(code_review.files_changed, 3);

    // Auto mode: the orchestrator merges on its next cycle.
    let orchestrator = OrchestratorWorker::new(h.ctx.clone());
    orchestrator.run_cycle(Utc::now()).await;
    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::Done);
    assert_eq!(r.implementation_status, Some(ImplementationStatus::PrMerged));
    assert_eq!(r.deployment_status, DeploymentStatus::Pending);
    assert!(r.pr_number.is_some());
    assert!(r.branch_deleted);

    // The push triggers both deploy workflows; they run and succeed.
    h.host.script_run(
        "deploy-api",
        "main",
        WorkflowRunStatus::Completed,
        Some(WorkflowConclusion::Success),
    );
    h.host.script_run(
        "deploy-web",
        "main",
        WorkflowRunStatus::Completed,
        Some(WorkflowConclusion::Success),
    );
    orchestrator.run_cycle(Utc::now()).await; // Pending → InProgress
    orchestrator.run_cycle(Utc::now()).await; // InProgress → Succeeded

    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.deployment_status, DeploymentStatus::Succeeded);
    assert!(r.deployed_at.is_some());
    assert_eq!(r.deployment_retry_count, 0);
}

/// The clarification loop is capped: after `max_reviews` passes no further
/// LLM call happens, even when new submitter comments arrive.
#[tokio::test]
async fn clarification_loop_stops_at_the_cap() {
    let h = harness(PipelineConfig::default());
    let project = seed_project(&h).await;
    let request = seed_feature(&h, project.id, 7).await;
    let triage = TriageWorker::new(h.ctx.clone());

    for round in 0..3 {
        h.llm.push_response(triage_clarify_json());
        let report = triage.run_cycle(Utc::now()).await;
        assert_eq!(report.processed, 1, "round {round}");
        let r = h.store.get_request(request.id).await.unwrap();
        assert_eq!(r.state, PipelineState::NeedsClarification);

        // The submitter answers, making the request eligible again.
        h.store
            .add_comment(NewComment::human(request.id, "Dana", "all widgets please"))
            .await
            .unwrap();
    }

    // Cap reached: a fourth response is queued but never consumed.
    h.llm.push_response(triage_clarify_json());
    let report = triage.run_cycle(Utc::now()).await;
    assert_eq!(report.scanned, 0);
    assert_eq!(report.processed, 0);
    assert_eq!(h.llm.call_count(), 3);

    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::NeedsClarification);
    assert_eq!(r.triage_count, 3);
}

/// A duplicate pointer at a request that is already past triage forces a
/// rejection regardless of the model's own decision.
#[tokio::test]
async fn duplicate_of_done_request_forces_reject() {
    let h = harness(PipelineConfig::default());
    let project = seed_project(&h).await;

    let original = seed_feature(&h, project.id, 1).await;
    h.store
        .override_request(original.id, |r| {
            r.state = PipelineState::Done;
            r.implementation_status = Some(ImplementationStatus::PrMerged);
            r.pr_number = Some(9);
        })
        .await
        .unwrap();

    let duplicate = seed_feature(&h, project.id, 2).await;
    let response = format!(
        r#"{{"decision":"approve","reasoning":"looks useful","alignmentScore":80,
            "completenessScore":75,"salesAlignmentScore":70,
            "isDuplicate":true,"duplicateOfRequestId":{}}}"#,
        original.id
    );
    h.llm.push_response(response);

    TriageWorker::new(h.ctx.clone()).run_cycle(Utc::now()).await;

    let r = h.store.get_request(duplicate.id).await.unwrap();
    assert_eq!(r.state, PipelineState::Rejected);
    let review = h.store.latest_triage_review(duplicate.id).await.unwrap();
    assert_eq!(review.decision, TriageDecision::Reject);
    assert!(review.reasoning.contains("Duplicate of request"));
    assert!(h.host.labels_on(2).contains(&"agent:rejected".to_string()));
}

/// Malformed model output degrades to a Clarify review with zeroed scores
/// and the escalation reasoning.
#[tokio::test]
async fn malformed_llm_output_falls_back_to_clarify() {
    let h = harness(PipelineConfig::default());
    let project = seed_project(&h).await;
    let request = seed_feature(&h, project.id, 3).await;

    h.llm.push_response("not json at all");
    TriageWorker::new(h.ctx.clone()).run_cycle(Utc::now()).await;

    let r = h.store.get_request(request.id).await.unwrap();
    assert_eq!(r.state, PipelineState::NeedsClarification);

    let review = h.store.latest_triage_review(request.id).await.unwrap();
    assert_eq!(review.decision, TriageDecision::Clarify);
    assert!(review.reasoning.contains("could not be parsed"));
    assert_eq!(review.alignment_score, 0);
    assert_eq!(review.completeness_score, 0);
    assert_eq!(review.sales_alignment_score, 0);
}

/// Budget gate: once the daily budget is spent, the cycle is skipped and
/// no new review is written.
#[tokio::test]
async fn exhausted_daily_budget_skips_the_cycle() {
    let mut cfg = PipelineConfig::default();
    cfg.triage.daily_budget = 10;
    let h = harness(cfg);
    let project = seed_project(&h).await;
    let first = seed_feature(&h, project.id, 1).await;

    // First pass spends well past the 10-token budget.
    h.llm.push_response(triage_approve_json());
    let triage = TriageWorker::new(h.ctx.clone());
    triage.run_cycle(Utc::now()).await;
    assert!(h.store.latest_triage_review(first.id).await.is_some());

    let second = seed_feature(&h, project.id, 2).await;
    h.llm.push_response(triage_approve_json());
    let report = triage.run_cycle(Utc::now()).await;
    assert!(report.skipped_budget);
    assert!(h.store.latest_triage_review(second.id).await.is_none());
    assert_eq!(h.llm.call_count(), 1);
}

/// Invariant: the number of live coding sessions never exceeds
/// `max_concurrent`, at one dispatch per cycle.
#[tokio::test]
async fn session_slots_are_bounded() {
    let h = harness(PipelineConfig::default());
    seed_repo(&h);
    let project = seed_project(&h).await;
    let ops = PipelineOps::new(h.ctx.clone());

    for issue in 1..=4u64 {
        let r = seed_feature(&h, project.id, issue).await;
        h.store
            .override_request(r.id, |row| row.state = PipelineState::Triaged)
            .await
            .unwrap();
        let review = h
            .store
            .add_architect_review(request_store::NewArchitectReview {
                request_id: r.id,
                solution_summary: "s".into(),
                approach: "a".into(),
                solution_json: solution_json().into(),
                estimated_complexity: "low".into(),
                estimated_effort: "1d".into(),
                files_analyzed: 0,
                paths_read: vec![],
                step1_prompt_tokens: 0,
                step1_completion_tokens: 0,
                step2_prompt_tokens: 0,
                step2_completion_tokens: 0,
                model: "scripted".into(),
                duration_ms: 1,
            })
            .await;
        h.store
            .override_request(r.id, |row| row.state = PipelineState::ArchitectReview)
            .await
            .unwrap();
        ops.approve_architect(review.id, "admin", None).await.unwrap();
    }

    let trigger = ImplementationTriggerWorker::new(h.ctx.clone());
    for _ in 0..6 {
        trigger.run_cycle(Utc::now()).await;
        assert!(h.store.active_session_count().await <= 3);
    }
    assert_eq!(h.store.active_session_count().await, 3);
    assert_eq!(h.host.assignments().len(), 3);
}
