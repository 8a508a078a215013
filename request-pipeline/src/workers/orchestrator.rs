//! Orchestrator: stall detection + deployment enforcement.
//!
//! Runs beside the pipeline workers and is the only writer of stall flags
//! and deployment-retry counters.
//!
//! Stall rules (warning threshold from config; fixed critical points):
//! - `NeedsClarification`: no update for N days (default 7, critical 14)
//! - `ArchitectReview`: N days (default 3, critical 7)
//! - `Approved` with no session: N days (default 1, critical 3)
//! - `InProgress` with a failed implementation: N hours since
//!   `completed_at` (default 24, critical 72)
//!
//! Deployment: merges review-approved PRs (every cycle in Auto mode, on the
//! admin signal in Staged mode), then observes the deploy workflow runs and
//! drives `deployment_status` Pending → InProgress → Succeeded/Failed with
//! bounded retries.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use request_store::{
    DeploymentStatus, ImplementationStatus, NewComment, PipelineState, Request,
};

use code_host_engine::{WorkflowConclusion, WorkflowRun, WorkflowRunStatus};

use super::{
    CycleReport, CycleWorker, apply_label_best_effort, comment_best_effort,
    remove_label_best_effort,
};
use crate::config::{DeploymentMode, PipelineConfig};
use crate::errors::PipelineResult;
use crate::{PipelineContext, labels};

/// Fixed critical escalation points; the config scales the warning
/// thresholds only.
const CRITICAL_NEEDS_CLARIFICATION_DAYS: i64 = 14;
const CRITICAL_ARCHITECT_REVIEW_DAYS: i64 = 7;
const CRITICAL_APPROVED_DAYS: i64 = 3;
const CRITICAL_FAILED_HOURS: i64 = 72;

pub struct OrchestratorWorker {
    ctx: PipelineContext,
}

impl OrchestratorWorker {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = self.ctx.config.snapshot();
        let mut report = CycleReport::default();
        if !cfg.orchestrator.enabled {
            return report;
        }

        report.processed += self.detect_stalls(&cfg, now).await;

        if cfg.orchestrator.deployment_mode == DeploymentMode::Auto {
            report.processed += self.merge_phase(now).await;
        }
        report.processed += self.observe_deployments(&cfg, now).await;

        report
    }

    /* ---------------------------- stalls ---------------------------- */

    /// Flags newly stalled requests; returns how many were flagged. Exactly
    /// one structured notification is emitted per transition into the
    /// stalled state (the flag gates re-emission).
    async fn detect_stalls(&self, cfg: &PipelineConfig, now: DateTime<Utc>) -> usize {
        let store = &self.ctx.store;
        let mut flagged = 0usize;

        let mut stalled: Vec<(Request, &'static str, bool)> = Vec::new();

        for r in store
            .list_by_state(
                PipelineState::NeedsClarification,
                request_store::OrderBy::UpdatedAsc,
            )
            .await
        {
            let days = (now - r.updated_at).num_days();
            if r.stall_notified_at.is_none()
                && days >= cfg.orchestrator.needs_clarification_stale_days
            {
                let critical = days >= CRITICAL_NEEDS_CLARIFICATION_DAYS;
                stalled.push((r, "needs-clarification", critical));
            }
        }

        for r in store
            .list_by_state(
                PipelineState::ArchitectReview,
                request_store::OrderBy::UpdatedAsc,
            )
            .await
        {
            let days = (now - r.updated_at).num_days();
            if r.stall_notified_at.is_none() && days >= cfg.orchestrator.architect_review_stale_days
            {
                let critical = days >= CRITICAL_ARCHITECT_REVIEW_DAYS;
                stalled.push((r, "architect-review", critical));
            }
        }

        for r in store
            .list_by_state(PipelineState::Approved, request_store::OrderBy::UpdatedAsc)
            .await
        {
            if r.session_id.is_some() {
                continue;
            }
            let days = (now - r.updated_at).num_days();
            if r.stall_notified_at.is_none() && days >= cfg.orchestrator.approved_stale_days {
                let critical = days >= CRITICAL_APPROVED_DAYS;
                stalled.push((r, "approved-untriggered", critical));
            }
        }

        for r in store
            .list_by_state(PipelineState::InProgress, request_store::OrderBy::UpdatedAsc)
            .await
        {
            if r.implementation_status != Some(ImplementationStatus::Failed) {
                continue;
            }
            let anchor = r.completed_at.unwrap_or(r.updated_at);
            let hours = (now - anchor).num_hours();
            if r.stall_notified_at.is_none() && hours >= cfg.orchestrator.failed_stale_hours {
                let critical = hours >= CRITICAL_FAILED_HOURS;
                stalled.push((r, "implementation-failed", critical));
            }
        }

        for (r, rule, critical) in stalled {
            let res = store
                .update_request(r.id, Some(r.updated_at), |row| {
                    row.stall_notified_at = Some(now);
                })
                .await;
            match res {
                Ok(_) => {
                    flagged += 1;
                    if critical {
                        error!(
                            request = r.id,
                            rule,
                            state = %r.state,
                            severity = "critical",
                            "request stalled"
                        );
                    } else {
                        warn!(
                            request = r.id,
                            rule,
                            state = %r.state,
                            severity = "warning",
                            "request stalled"
                        );
                    }
                }
                Err(e) => {
                    // The row moved under us; it is no longer stalled.
                    info!(request = r.id, error = %e, "stall flag skipped, row changed");
                }
            }
        }
        flagged
    }

    /* ------------------------- merge phase -------------------------- */

    /// Auto mode: merge every review-approved PR. Returns merged count.
    async fn merge_phase(&self, now: DateTime<Utc>) -> usize {
        let mut merged = 0usize;
        for r in self
            .ctx
            .store
            .list_by_state(PipelineState::InProgress, request_store::OrderBy::UpdatedAsc)
            .await
        {
            if r.implementation_status != Some(ImplementationStatus::ReviewApproved) {
                continue;
            }
            if self.ctx.cancelled() {
                break;
            }
            match merge_approved_request(&self.ctx, r.id, now).await {
                Ok(true) => merged += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(request = r.id, error = %e, "merge failed, will retry next cycle");
                }
            }
        }
        merged
    }

    /* ---------------------- deployment observer ---------------------- */

    /// Watches workflow runs for requests in `Done` with a live deployment
    /// and advances `deployment_status`. Returns how many rows changed.
    async fn observe_deployments(&self, cfg: &PipelineConfig, now: DateTime<Utc>) -> usize {
        let mut changed = 0usize;
        for r in self
            .ctx
            .store
            .list_by_state(PipelineState::Done, request_store::OrderBy::UpdatedAsc)
            .await
        {
            if !matches!(
                r.deployment_status,
                DeploymentStatus::Pending | DeploymentStatus::InProgress
            ) {
                continue;
            }
            if self.ctx.cancelled() {
                break;
            }
            match self.observe_one(cfg, &r, now).await {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(request = r.id, error = %e, "deployment observation failed");
                }
            }
        }
        changed
    }

    async fn observe_one(
        &self,
        cfg: &PipelineConfig,
        request: &Request,
        now: DateTime<Utc>,
    ) -> PipelineResult<bool> {
        let store = &self.ctx.store;
        let (repo, _project) = self.ctx.repo_for(request).await?;
        let since = request.completed_at;

        // Latest run per deploy workflow, created after the merge.
        let mut latest: Vec<WorkflowRun> = Vec::new();
        for wf in &cfg.orchestrator.deploy_workflows {
            if let Some(run) = self
                .ctx
                .host
                .list_workflow_runs(&repo, wf, since)
                .await?
                .into_iter()
                .next()
            {
                latest.push(run);
            }
        }

        match request.deployment_status {
            DeploymentStatus::Pending => {
                let Some(first) = latest.first() else {
                    // Push has not produced runs yet; keep waiting.
                    return Ok(false);
                };
                store
                    .update_request(request.id, Some(request.updated_at), |r| {
                        r.deployment_status = DeploymentStatus::InProgress;
                        r.deployment_run_id = Some(first.id);
                    })
                    .await?;
                info!(request = request.id, run = first.id, "deployment in progress");
                Ok(true)
            }

            DeploymentStatus::InProgress => {
                let failed_run = latest.iter().find(|r| {
                    r.status == WorkflowRunStatus::Completed
                        && matches!(
                            r.conclusion,
                            Some(WorkflowConclusion::Failure | WorkflowConclusion::Cancelled)
                        )
                });
                if let Some(run) = failed_run {
                    self.handle_deploy_failure(cfg, request, run.id, now).await?;
                    return Ok(true);
                }

                let all_succeeded = !latest.is_empty()
                    && latest.iter().all(|r| {
                        r.status == WorkflowRunStatus::Completed
                            && r.conclusion == Some(WorkflowConclusion::Success)
                    });
                if all_succeeded {
                    store
                        .update_request(request.id, Some(request.updated_at), |r| {
                            r.deployment_status = DeploymentStatus::Succeeded;
                            r.deployed_at = Some(now);
                            r.deployment_retry_count = 0;
                        })
                        .await?;
                    store
                        .add_comment(NewComment::agent(request.id, "Deployment succeeded."))
                        .await?;
                    info!(request = request.id, "deployment succeeded");
                    return Ok(true);
                }
                Ok(false)
            }

            _ => Ok(false),
        }
    }

    /// Failure policy: bounded auto-retry. The first retry re-runs the
    /// failed jobs; later retries dispatch fresh workflow runs. Exhausted
    /// retries leave the deployment `Failed` and flag the stall.
    async fn handle_deploy_failure(
        &self,
        cfg: &PipelineConfig,
        request: &Request,
        failed_run_id: u64,
        now: DateTime<Utc>,
    ) -> PipelineResult<()> {
        let store = &self.ctx.store;
        let (repo, _project) = self.ctx.repo_for(request).await?;

        let failed = store
            .update_request(request.id, Some(request.updated_at), |r| {
                r.deployment_status = DeploymentStatus::Failed;
                r.deployment_run_id = Some(failed_run_id);
            })
            .await?;

        if failed.deployment_retry_count >= cfg.orchestrator.max_deploy_retries {
            store
                .update_request(request.id, None, |r| {
                    r.stall_notified_at = Some(now);
                })
                .await?;
            error!(
                request = request.id,
                retries = failed.deployment_retry_count,
                "deployment retries exhausted, flagged as stalled"
            );
            return Ok(());
        }

        let attempt = failed.deployment_retry_count + 1;
        if attempt == 1 {
            self.ctx.host.rerun_failed_jobs(&repo, failed_run_id).await?;
        } else {
            for wf in &cfg.orchestrator.deploy_workflows {
                self.ctx
                    .host
                    .dispatch_workflow(&repo, wf, &cfg.implementation.base_branch)
                    .await?;
            }
        }

        store
            .update_request(request.id, None, |r| {
                r.deployment_status = DeploymentStatus::Pending;
                r.deployment_retry_count = attempt;
            })
            .await?;
        warn!(
            request = request.id,
            attempt,
            run = failed_run_id,
            "deployment failed, retrying"
        );
        Ok(())
    }
}

/// Merges one review-approved request's PR and completes the request.
///
/// Shared by the auto-mode orchestrator cycle, the post-approval path of
/// the code-review worker, and the staged-deploy operation. Returns
/// `Ok(false)` when the PR could not be merged yet (retried next cycle).
pub(crate) async fn merge_approved_request(
    ctx: &PipelineContext,
    request_id: i64,
    now: DateTime<Utc>,
) -> PipelineResult<bool> {
    let store = &ctx.store;
    let request = store.get_request(request_id).await?;
    if request.state != PipelineState::InProgress
        || request.implementation_status != Some(ImplementationStatus::ReviewApproved)
    {
        return Ok(false);
    }
    let Some(pr_number) = request.pr_number else {
        return Ok(false);
    };

    let (repo, _project) = ctx.repo_for(&request).await?;
    let pr = ctx.host.pull_request(&repo, pr_number).await?;
    if pr.merged {
        // Merged externally; fall through to bookkeeping.
    } else {
        // Strip staged attachments from the PR branch before they can land
        // on the base branch, then drop the staging branch itself.
        let staging = format!("attachments/request-{request_id}");
        if ctx.host.branch_exists(&repo, &staging).await.unwrap_or(false) {
            let prefix = format!("_temp-attachments/{request_id}/");
            if let Err(e) = ctx
                .host
                .delete_prefix(
                    &repo,
                    &pr.head_branch,
                    &prefix,
                    &format!("Remove staged attachments for request {request_id}"),
                )
                .await
            {
                warn!(request = request_id, error = %e, "attachment strip failed");
            }
            if let Err(e) = ctx.host.delete_branch(&repo, &staging).await {
                warn!(request = request_id, error = %e, "staging branch delete failed");
            }
        }

        let title = format!("{} (request #{request_id})", request.title);
        let mut merged = ctx.host.merge_pull_request(&repo, pr_number, &title).await?;
        if !merged {
            // Behind base; refresh and try once more.
            ctx.host.update_pr_branch(&repo, pr_number).await?;
            merged = ctx.host.merge_pull_request(&repo, pr_number, &title).await?;
        }
        if !merged {
            warn!(request = request_id, pr = pr_number, "pr not mergeable yet");
            return Ok(false);
        }
    }

    store
        .update_request(request_id, None, |r| {
            r.implementation_status = Some(ImplementationStatus::PrMerged);
            r.state = PipelineState::Done;
            r.deployment_status = DeploymentStatus::Pending;
            if r.completed_at.is_none() {
                r.completed_at = Some(now);
            }
            r.branch_deleted = true;
        })
        .await?;
    store
        .add_comment(NewComment::agent(
            request_id,
            format!("Pull request #{pr_number} merged; deployment pending."),
        ))
        .await?;

    // Host cleanup, all best-effort.
    if let Err(e) = ctx.host.delete_branch(&repo, &pr.head_branch).await {
        warn!(request = request_id, branch = %pr.head_branch, error = %e, "branch delete failed");
    }
    remove_label_best_effort(ctx, &repo, request.issue_number, "deploy:staged").await;
    apply_label_best_effort(ctx, &repo, request.issue_number, labels::copilot_complete()).await;
    comment_best_effort(
        ctx,
        &repo,
        request.issue_number,
        &format!("Pull request #{pr_number} merged."),
    )
    .await;

    info!(request = request_id, pr = pr_number, "request merged and done");
    Ok(true)
}

impl CycleWorker for OrchestratorWorker {
    fn name(&self) -> &'static str {
        "orchestrator"
    }

    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration {
        Duration::from_secs(cfg.orchestrator.poll_sec)
    }

    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send {
        self.run_cycle(now)
    }
}
