//! Implementation trigger: hands approved requests to the coding agent.
//!
//! Selection: `Approved` requests with no session and a code-host issue,
//! `updated_at` ascending, bounded by the free session slots under
//! `max_concurrent`; one dispatch per cycle. The same `trigger` routine
//! backs the explicit trigger operation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use code_host_engine::{AgentAssignment, CommitFile, RepoRef};
use request_store::{ImplementationStatus, NewComment, PipelineState, Request};

use super::{CycleReport, CycleWorker, TRIGGER_BATCH, apply_label_best_effort, comment_best_effort};
use crate::config::PipelineConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::prompts::architect::SolutionDocument;
use crate::prompts::instructions::{attachment_instructions, build_instruction_document};
use crate::{PipelineContext, labels};

pub struct ImplementationTriggerWorker {
    ctx: PipelineContext,
}

impl ImplementationTriggerWorker {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = self.ctx.config.snapshot();
        let mut report = CycleReport::default();
        if !cfg.implementation.enabled || !cfg.implementation.auto_trigger {
            return report;
        }

        let active = self.ctx.store.active_session_count().await;
        let capacity = cfg.implementation.max_concurrent.saturating_sub(active);
        if capacity == 0 {
            return report;
        }

        let candidates: Vec<Request> = self
            .ctx
            .store
            .list_by_state(PipelineState::Approved, request_store::OrderBy::UpdatedAsc)
            .await
            .into_iter()
            .filter(|r| r.session_id.is_none() && r.issue_number.is_some())
            .collect();
        report.scanned = candidates.len();

        for request in candidates
            .into_iter()
            .take(capacity.min(TRIGGER_BATCH))
        {
            if self.ctx.cancelled() {
                break;
            }
            match trigger(&self.ctx, request.id, now).await {
                Ok(true) => report.processed += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        request = request.id,
                        error = %e,
                        transient = e.is_transient(),
                        "implementation trigger failed, state unchanged"
                    );
                }
            }
        }
        report
    }
}

/// Dispatches one request to the coding agent.
///
/// Returns `Ok(false)` when the request was skipped (no approved solution);
/// a code-host failure returns `Err` with the request row untouched, to be
/// retried next cycle.
pub async fn trigger(
    ctx: &PipelineContext,
    request_id: i64,
    now: DateTime<Utc>,
) -> PipelineResult<bool> {
    let cfg = ctx.config.snapshot();
    let store = &ctx.store;
    let request = store.get_request(request_id).await?;

    if request.state != PipelineState::Approved || request.session_id.is_some() {
        return Err(PipelineError::Precondition(format!(
            "request {request_id} is not dispatchable (state {}, session {:?})",
            request.state, request.session_id
        )));
    }
    let Some(issue) = request.issue_number else {
        return Err(PipelineError::Precondition(format!(
            "request {request_id} has no code-host issue"
        )));
    };

    let Some(review) = store.latest_approved_architect_review(request.id).await else {
        warn!(request = request.id, "no approved architect review, skipping dispatch");
        return Ok(false);
    };
    let solution: SolutionDocument = serde_json::from_str(&review.solution_json)?;

    let (repo, _project) = ctx.repo_for(&request).await?;
    let mut instructions = build_instruction_document(&request, &solution);
    if !cfg.implementation.model.is_empty() {
        instructions.push_str(&format!("\n\nModel: {}\n", cfg.implementation.model));
    }

    // Stage image attachments on a side branch; fall back to the base
    // branch (and clean up) when any step fails.
    let base = cfg.implementation.base_branch.clone();
    let images: Vec<_> = store
        .attachments_for(request.id)
        .await
        .into_iter()
        .filter(|a| a.is_image())
        .collect();

    let chosen_base = if images.is_empty() {
        base.clone()
    } else {
        match stage_attachments(ctx, &repo, &base, request.id, &images).await {
            Ok(side_branch) => {
                instructions.push_str(&attachment_instructions(request.id, &images));
                side_branch
            }
            Err(e) => {
                warn!(request = request.id, error = %e, "attachment staging failed, using base branch");
                base.clone()
            }
        }
    };

    // Host effects first: a failure here leaves the request untouched.
    ctx.host
        .assign_issue_to_agent(&repo, issue, &AgentAssignment {
            agent_login: cfg.implementation.agent_login.clone(),
            instructions,
            base_branch: chosen_base,
        })
        .await?;

    let session_id = format!("session-{}-{}", request.id, now.format("%Y%m%dT%H%M%SZ"));
    apply_label_best_effort(ctx, &repo, Some(issue), labels::copilot_implementing()).await;
    comment_best_effort(
        ctx,
        &repo,
        Some(issue),
        &format!("Implementation dispatched to {} ({session_id}).", cfg.implementation.agent_login),
    )
    .await;

    store
        .add_comment(NewComment::agent(
            request.id,
            format!("Implementation triggered: {session_id}"),
        ))
        .await?;
    store
        .update_request(request.id, None, |r| {
            r.state = PipelineState::InProgress;
            r.implementation_status = Some(ImplementationStatus::Pending);
            r.session_id = Some(session_id.clone());
            r.triggered_at = Some(now);
        })
        .await?;

    info!(request = request.id, issue, "implementation triggered");
    Ok(true)
}

/// Creates `attachments/request-{id}` off `base` and commits every image as
/// `_temp-attachments/{id}/{filename}` in a single commit. Any failure
/// deletes the side branch and bubbles up.
async fn stage_attachments(
    ctx: &PipelineContext,
    repo: &RepoRef,
    base: &str,
    request_id: i64,
    images: &[request_store::Attachment],
) -> PipelineResult<String> {
    let side = format!("attachments/request-{request_id}");
    ctx.host.create_branch(repo, &side, base).await?;

    let files: Vec<CommitFile> = images
        .iter()
        .map(|a| CommitFile {
            path: format!("_temp-attachments/{request_id}/{}", a.filename),
            content: a.data.clone(),
        })
        .collect();

    match ctx
        .host
        .commit_files(
            repo,
            &side,
            &format!("Stage attachments for request {request_id}"),
            &files,
        )
        .await
    {
        Ok(()) => Ok(side),
        Err(e) => {
            if let Err(del) = ctx.host.delete_branch(repo, &side).await {
                warn!(branch = %side, error = %del, "attachment branch cleanup failed");
            }
            Err(e.into())
        }
    }
}

impl CycleWorker for ImplementationTriggerWorker {
    fn name(&self) -> &'static str {
        "implementation-trigger"
    }

    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration {
        Duration::from_secs(cfg.implementation.poll_sec)
    }

    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send {
        self.run_cycle(now)
    }
}
