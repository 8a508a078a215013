//! Code-review worker: reviews the PR diff against the approved solution.
//!
//! For every request in `PrOpened` without a review for the current PR:
//! fetch metadata + unified diff, run the structured review, persist the
//! artifact, post the PR review, and advance to `ReviewApproved` on
//! approval. In Auto deployment mode an approval proceeds straight to the
//! merge routine; in Staged mode the request is labeled `deploy:staged`
//! and held for the admin signal.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ai_llm_service::{ChatClient, ChatRequest};
use code_host_engine::PrReviewVerdict;
use request_store::{
    CodeReviewDecision, ImplementationStatus, NewCodeReview, NewComment, PipelineState, Request,
    ReviewKind,
};

use super::orchestrator::merge_approved_request;
use super::{CycleReport, CycleWorker, apply_label_best_effort};
use crate::config::{DeploymentMode, PipelineConfig};
use crate::errors::PipelineResult;
use crate::prompts::code_review::{
    CodeReviewResponse, DEFAULT_SYSTEM_PROMPT, build_user_message,
};
use crate::prompts::parse_llm_json;
use crate::{PipelineContext, labels, telemetry};

pub struct CodeReviewWorker {
    ctx: PipelineContext,
}

impl CodeReviewWorker {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = self.ctx.config.snapshot();
        let mut report = CycleReport::default();
        if !cfg.code_review.enabled {
            return report;
        }
        let Some(llm) = self.ctx.llm.clone() else {
            return report;
        };

        let mut candidates = Vec::new();
        for r in self
            .ctx
            .store
            .list_by_state(PipelineState::InProgress, request_store::OrderBy::UpdatedAsc)
            .await
        {
            let Some(pr) = r.pr_number else { continue };
            if r.implementation_status != Some(ImplementationStatus::PrOpened) {
                continue;
            }
            if self.ctx.store.code_review_for_pr(r.id, pr).await.is_some() {
                continue;
            }
            candidates.push(r);
        }
        report.scanned = candidates.len();

        for request in candidates {
            if self.ctx.cancelled() {
                break;
            }
            match self.process(&llm, &cfg, &request, now).await {
                Ok(decision) => {
                    report.processed += 1;
                    info!(
                        request = request.id,
                        decision = decision.as_str(),
                        "code review complete"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        request = request.id,
                        error = %e,
                        transient = e.is_transient(),
                        "code review failed, will retry next cycle"
                    );
                }
            }
        }
        report
    }

    async fn process(
        &self,
        llm: &ChatClient,
        cfg: &PipelineConfig,
        request: &Request,
        now: DateTime<Utc>,
    ) -> PipelineResult<CodeReviewDecision> {
        let store = &self.ctx.store;
        let (repo, _project) = self.ctx.repo_for(request).await?;
        let Some(pr_number) = request.pr_number else {
            return Err(crate::errors::PipelineError::Precondition(format!(
                "request {} has no tracked pr",
                request.id
            )));
        };

        let pr = self.ctx.host.pull_request(&repo, pr_number).await?;
        let diff = self.ctx.host.pull_request_diff(&repo, pr_number).await?;

        let solution = store.latest_approved_architect_review(request.id).await;
        let (solution_summary, solution_json) = match &solution {
            Some(s) => (s.solution_summary.as_str(), s.solution_json.as_str()),
            None => ("(no approved solution on file)", "{}"),
        };

        let system = self
            .ctx
            .system_prompt_or("code-review", DEFAULT_SYSTEM_PROMPT)
            .await;
        let user = build_user_message(
            request,
            solution_summary,
            solution_json,
            &diff,
            cfg.code_review.max_input_tokens,
        );
        telemetry::dump_prompt("code-review", request.id, &system, &user).await;

        let outcome = llm
            .chat(&ChatRequest {
                system,
                user,
                temperature: cfg.code_review.temperature,
                max_tokens: cfg.code_review.max_tokens,
            })
            .await?;

        let response = parse_llm_json::<CodeReviewResponse>(&outcome.text).unwrap_or_else(|e| {
            warn!(request = request.id, error = %e, "review response unparseable, degrading");
            CodeReviewResponse::parse_fallback(&outcome.text)
        });
        let decision = response.parsed_decision();

        let review = store
            .add_code_review(NewCodeReview {
                request_id: request.id,
                pr_number,
                decision,
                summary: response.summary.clone(),
                design_compliance: response.design_compliance,
                design_compliance_notes: response.design_compliance_notes.clone(),
                security_pass: response.security_pass,
                security_notes: response.security_notes.clone(),
                coding_standards_pass: response.coding_standards_pass,
                coding_standards_notes: response.coding_standards_notes.clone(),
                quality_score: response.quality_score,
                files_changed: pr.files_changed,
                lines_added: pr.additions,
                lines_removed: pr.deletions,
                prompt_tokens: outcome.usage.prompt_tokens,
                completion_tokens: outcome.usage.completion_tokens,
                model: outcome.model.clone(),
                duration_ms: outcome.latency_ms,
            })
            .await;

        let body = format!(
            "**Code review: {}** (quality {}/10)\n\n{}\n\n- Design compliance: {} — {}\n- Security: {} — {}\n- Coding standards: {} — {}",
            review.decision.as_str(),
            review.quality_score,
            review.summary,
            pass_str(review.design_compliance),
            review.design_compliance_notes,
            pass_str(review.security_pass),
            review.security_notes,
            pass_str(review.coding_standards_pass),
            review.coding_standards_notes,
        );
        store
            .add_comment(
                NewComment::agent(request.id, body.clone())
                    .for_review(ReviewKind::CodeReview, review.id),
            )
            .await?;

        // Host effects.
        let verdict = match decision {
            CodeReviewDecision::Approved => PrReviewVerdict::Approve,
            _ => PrReviewVerdict::RequestChanges,
        };
        if let Err(e) = self
            .ctx
            .host
            .post_pr_review(&repo, pr_number, verdict, &body)
            .await
        {
            warn!(request = request.id, pr = pr_number, error = %e, "pr review post failed");
        }
        let label = match decision {
            CodeReviewDecision::Approved => labels::review_approved(),
            _ => labels::review_changes_requested(),
        };
        apply_label_best_effort(&self.ctx, &repo, request.issue_number, label).await;

        if decision == CodeReviewDecision::Approved {
            store
                .update_request(request.id, None, |r| {
                    r.implementation_status = Some(ImplementationStatus::ReviewApproved);
                })
                .await?;

            match cfg.orchestrator.deployment_mode {
                DeploymentMode::Auto => {
                    // With auto_merge the reviewer merges on the spot;
                    // otherwise the orchestrator picks it up next cycle.
                    if cfg.code_review.auto_merge {
                        if let Err(e) = merge_approved_request(&self.ctx, request.id, now).await {
                            warn!(request = request.id, error = %e, "post-approval merge failed, orchestrator will retry");
                        }
                    }
                }
                DeploymentMode::Staged => {
                    apply_label_best_effort(
                        &self.ctx,
                        &repo,
                        request.issue_number,
                        labels::deploy_staged(),
                    )
                    .await;
                }
            }
        }

        Ok(decision)
    }
}

fn pass_str(pass: bool) -> &'static str {
    if pass { "pass" } else { "FAIL" }
}

impl CycleWorker for CodeReviewWorker {
    fn name(&self) -> &'static str {
        "code-review"
    }

    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration {
        Duration::from_secs(cfg.implementation.pr_poll_sec)
    }

    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send {
        self.run_cycle(now)
    }
}
