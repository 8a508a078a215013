//! Operations exposed to the intake boundary.
//!
//! The HTTP surface itself is an external collaborator; this is the typed
//! contract it calls into. Resets clear the stage counters and `last*_at`
//! so both re-review triggers (explicit reset and comment polling)
//! converge; human decisions on architect reviews move the request along
//! the pipeline graph.

use chrono::Utc;
use tracing::info;

use request_store::{
    ArchitectDecision, HealthCounters, ImplementationStatus, NewComment, PipelineState,
};

use crate::config::{DeploymentMode, PipelineConfig};
use crate::errors::{PipelineError, PipelineResult};
use crate::workers::{implementation, orchestrator::merge_approved_request};
use crate::{PipelineContext, labels};

/// Intake-facing operations over one shared context.
#[derive(Clone)]
pub struct PipelineOps {
    ctx: PipelineContext,
}

impl PipelineOps {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Resets a request to `New` with cleared triage counters; the triage
    /// worker picks it up on its next cycle.
    pub async fn queue_triage(&self, request_id: i64) -> PipelineResult<()> {
        self.ctx
            .store
            .override_request(request_id, |r| {
                r.state = PipelineState::New;
                r.triage_count = 0;
                r.last_triage_at = None;
            })
            .await?;
        self.ctx
            .store
            .add_comment(NewComment::agent(request_id, "Request queued for re-triage."))
            .await?;
        info!(request = request_id, "queued for triage");
        Ok(())
    }

    /// Resets a request to `Triaged` with cleared architect counters.
    pub async fn queue_architect(&self, request_id: i64) -> PipelineResult<()> {
        self.ctx
            .store
            .override_request(request_id, |r| {
                r.state = PipelineState::Triaged;
                r.architect_count = 0;
                r.last_architect_at = None;
            })
            .await?;
        self.ctx
            .store
            .add_comment(NewComment::agent(
                request_id,
                "Request queued for a fresh architect review.",
            ))
            .await?;
        info!(request = request_id, "queued for architect");
        Ok(())
    }

    /// Marks an architect review approved and moves the request to
    /// `Approved`.
    pub async fn approve_architect(
        &self,
        review_id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> PipelineResult<()> {
        let review = self
            .ctx
            .store
            .update_architect_review(review_id, |r| {
                r.decision = ArchitectDecision::Approved;
                r.approved_by = Some(actor.to_string());
                r.approved_at = Some(Utc::now());
            })
            .await?;
        self.ctx
            .store
            .update_request(review.request_id, None, |r| {
                r.state = PipelineState::Approved;
            })
            .await?;
        let note = match reason {
            Some(why) => format!("Solution approved by {actor}: {why}"),
            None => format!("Solution approved by {actor}."),
        };
        self.ctx
            .store
            .add_comment(NewComment::human(review.request_id, actor, note))
            .await?;
        info!(review = review_id, request = review.request_id, "architect approved");
        Ok(())
    }

    /// Marks an architect review rejected and returns the request to
    /// `Triaged` for another design round.
    pub async fn reject_architect(
        &self,
        review_id: i64,
        actor: &str,
        reason: Option<&str>,
    ) -> PipelineResult<()> {
        let review = self
            .ctx
            .store
            .update_architect_review(review_id, |r| {
                r.decision = ArchitectDecision::Rejected;
                if let Some(why) = reason {
                    r.human_feedback = Some(why.to_string());
                }
            })
            .await?;
        self.ctx
            .store
            .update_request(review.request_id, None, |r| {
                r.state = PipelineState::Triaged;
            })
            .await?;
        let note = match reason {
            Some(why) => format!("Solution rejected by {actor}: {why}"),
            None => format!("Solution rejected by {actor}."),
        };
        self.ctx
            .store
            .add_comment(NewComment::human(review.request_id, actor, note))
            .await?;
        info!(review = review_id, request = review.request_id, "architect rejected");
        Ok(())
    }

    /// Records feedback on an architect review; the comment makes the
    /// request eligible for a revision round on the next architect poll.
    pub async fn feedback_architect(
        &self,
        review_id: i64,
        actor: &str,
        feedback: &str,
    ) -> PipelineResult<()> {
        let review = self
            .ctx
            .store
            .update_architect_review(review_id, |r| {
                r.decision = ArchitectDecision::Revised;
                r.human_feedback = Some(feedback.to_string());
            })
            .await?;
        self.ctx
            .store
            .add_comment(NewComment::human(review.request_id, actor, feedback))
            .await?;
        info!(review = review_id, request = review.request_id, "architect feedback recorded");
        Ok(())
    }

    /// Admin override of a triage outcome: forces the request into
    /// `new_state` regardless of the worker graph.
    pub async fn override_triage(
        &self,
        review_id: i64,
        actor: &str,
        new_state: PipelineState,
        reason: Option<&str>,
    ) -> PipelineResult<()> {
        let review = self.ctx.store.get_triage_review(review_id).await?;
        self.ctx
            .store
            .override_request(review.request_id, |r| {
                r.state = new_state;
            })
            .await?;
        let note = match reason {
            Some(why) => format!("Triage overridden to {new_state} by {actor}: {why}"),
            None => format!("Triage overridden to {new_state} by {actor}."),
        };
        self.ctx
            .store
            .add_comment(NewComment::human(review.request_id, actor, note))
            .await?;
        info!(review = review_id, request = review.request_id, state = %new_state, "triage overridden");
        Ok(())
    }

    /// Dispatches one request to the coding agent immediately.
    pub async fn trigger_implementation(&self, request_id: i64) -> PipelineResult<()> {
        let dispatched = implementation::trigger(&self.ctx, request_id, Utc::now()).await?;
        if !dispatched {
            return Err(PipelineError::Precondition(format!(
                "request {request_id} has no approved architect review"
            )));
        }
        Ok(())
    }

    /// Rejects the current implementation attempt: the request returns to
    /// `Approved` with all agent fields cleared, ready for a re-trigger.
    pub async fn reject_implementation(
        &self,
        request_id: i64,
        reason: Option<&str>,
    ) -> PipelineResult<()> {
        let request = self
            .ctx
            .store
            .override_request(request_id, |r| {
                r.state = PipelineState::Approved;
                r.clear_implementation();
                r.deployment_status = request_store::DeploymentStatus::None;
            })
            .await?;
        let note = match reason {
            Some(why) => format!("Implementation rejected: {why}"),
            None => "Implementation rejected.".to_string(),
        };
        self.ctx
            .store
            .add_comment(NewComment::agent(request_id, note))
            .await?;

        if let Ok((repo, _)) = self.ctx.repo_for(&request).await {
            if let Some(issue) = request.issue_number {
                let _ = self
                    .ctx
                    .host
                    .remove_label(&repo, issue, &labels::copilot_implementing().name)
                    .await;
            }
        }
        info!(request = request_id, "implementation rejected");
        Ok(())
    }

    /// Staged mode: merges every review-approved PR now. Returns the count
    /// of merged requests.
    pub async fn deploy_staged(&self) -> PipelineResult<usize> {
        let now = Utc::now();
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
            if merge_approved_request(&self.ctx, r.id, now).await? {
                merged += 1;
            }
        }
        info!(merged, "staged deployment triggered");
        Ok(merged)
    }

    /// Re-runs or freshly dispatches the deploy workflows for one request
    /// whose deployment failed.
    pub async fn retry_deployment(&self, request_id: i64) -> PipelineResult<()> {
        let cfg = self.ctx.config.snapshot();
        let request = self.ctx.store.get_request(request_id).await?;
        if request.deployment_status != request_store::DeploymentStatus::Failed {
            return Err(PipelineError::Precondition(format!(
                "request {request_id} has no failed deployment"
            )));
        }
        let (repo, _project) = self.ctx.repo_for(&request).await?;

        match request.deployment_run_id {
            Some(run_id) if request.deployment_retry_count == 0 => {
                self.ctx.host.rerun_failed_jobs(&repo, run_id).await?;
            }
            _ => {
                for wf in &cfg.orchestrator.deploy_workflows {
                    self.ctx
                        .host
                        .dispatch_workflow(&repo, wf, &cfg.implementation.base_branch)
                        .await?;
                }
            }
        }

        self.ctx
            .store
            .update_request(request_id, None, |r| {
                r.deployment_status = request_store::DeploymentStatus::Pending;
                r.deployment_retry_count += 1;
            })
            .await?;
        info!(request = request_id, "deployment retry requested");
        Ok(())
    }

    /// Pipeline counters for the intake health endpoint.
    pub async fn health(&self) -> HealthCounters {
        self.ctx.store.health_counters().await
    }

    /// Current config snapshot (serialized by the intake layer).
    pub fn config(&self) -> PipelineConfig {
        (*self.ctx.config.snapshot()).clone()
    }

    /// Replaces the runtime config; visible to every worker's next cycle.
    pub fn update_config(&self, cfg: PipelineConfig) {
        self.ctx.config.replace(cfg);
    }

    /// Current deployment mode (used by the intake layer to decide whether
    /// to offer the staged-deploy action).
    pub fn deployment_mode(&self) -> DeploymentMode {
        self.ctx.config.snapshot().orchestrator.deployment_mode
    }
}
