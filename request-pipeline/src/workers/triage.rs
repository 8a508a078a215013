//! Triage worker: product-owner pass over new and re-clarified requests.
//!
//! Selection predicate (creation ascending, batch 5): requests in `New`
//! that were never triaged, plus requests in `NeedsClarification` under the
//! review cap where a human comment is newer than `last_triage_at`.
//!
//! Each pass produces exactly one TriageReview + one agent comment and
//! advances the state; the code-host label/comment happens after the store
//! commit and is best-effort.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ai_llm_service::{ChatClient, ChatRequest};
use request_store::{
    NewComment, NewTriageReview, PipelineState, Priority, Request, ReviewKind, TriageDecision,
};

use super::{CycleReport, CycleWorker, TRIAGE_BATCH, apply_label_best_effort, comment_best_effort};
use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::prompts::triage::{
    TriageResponse, build_system_message, build_user_message, render_comment,
};
use crate::prompts::{parse_llm_json, triage::DEFAULT_SYSTEM_PROMPT};
use crate::{PipelineContext, budget, labels, telemetry};

/// States a duplicate target must be in for the duplicate pointer to force
/// a rejection.
const DUPLICATE_BLOCKING_STATES: &[PipelineState] = &[
    PipelineState::Triaged,
    PipelineState::Approved,
    PipelineState::InProgress,
    PipelineState::Done,
];

pub struct TriageWorker {
    ctx: PipelineContext,
    budget_warned: AtomicBool,
}

impl TriageWorker {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            budget_warned: AtomicBool::new(false),
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = self.ctx.config.snapshot();
        let mut report = CycleReport::default();
        if !cfg.triage.enabled {
            return report;
        }
        let Some(llm) = self.ctx.llm.clone() else {
            return report;
        };

        if let Some(hit) = budget::check(
            &self.ctx.store,
            budget::TokenKind::Triage,
            cfg.triage.daily_budget,
            cfg.triage.monthly_budget,
            now,
        )
        .await
        {
            if !self.budget_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    window = hit.window,
                    used = hit.used,
                    limit = hit.limit,
                    "triage token budget exceeded, skipping cycles"
                );
            }
            report.skipped_budget = true;
            return report;
        }
        self.budget_warned.store(false, Ordering::Relaxed);

        let candidates = self.candidates(&cfg).await;
        report.scanned = candidates.len();

        for request in candidates.into_iter().take(TRIAGE_BATCH) {
            if self.ctx.cancelled() {
                break;
            }
            match self.process(&llm, &cfg, &request, now).await {
                Ok(decision) => {
                    report.processed += 1;
                    info!(
                        request = request.id,
                        decision = decision.as_str(),
                        "triage complete"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        request = request.id,
                        error = %e,
                        transient = e.is_transient(),
                        "triage failed, will retry next cycle"
                    );
                }
            }
        }
        report
    }

    /// Applies the selection predicate.
    async fn candidates(&self, cfg: &PipelineConfig) -> Vec<Request> {
        let store = &self.ctx.store;
        let mut out: Vec<Request> = store
            .list_by_state(PipelineState::New, request_store::OrderBy::CreatedAsc)
            .await
            .into_iter()
            .filter(|r| r.triage_count == 0)
            .collect();

        for r in store
            .list_by_state(
                PipelineState::NeedsClarification,
                request_store::OrderBy::CreatedAsc,
            )
            .await
        {
            if r.triage_count >= cfg.triage.max_reviews {
                continue;
            }
            let Some(human_at) = store.latest_human_comment_at(r.id).await else {
                continue;
            };
            if r.last_triage_at.is_none_or(|t| human_at > t) {
                out.push(r);
            }
        }

        out.sort_by_key(|r| (r.created_at, r.id));
        out
    }

    async fn process(
        &self,
        llm: &ChatClient,
        cfg: &PipelineConfig,
        request: &Request,
        now: DateTime<Utc>,
    ) -> PipelineResult<TriageDecision> {
        let store = &self.ctx.store;
        let (repo, _project) = self.ctx.repo_for(request).await?;

        let siblings = store
            .recent_project_requests(request.project_id, request.id, 50)
            .await;
        let comments = store.comments_for(request.id).await;

        let role = self
            .ctx
            .system_prompt_or("triage", DEFAULT_SYSTEM_PROMPT)
            .await;
        let system = build_system_message(
            &role,
            &self.ctx.refdocs.product_objectives().await,
            &self.ctx.refdocs.sales_positioning().await,
        );
        let user = build_user_message(request, &siblings, &comments);
        telemetry::dump_prompt("triage", request.id, &system, &user).await;

        let outcome = llm
            .chat(&ChatRequest {
                system,
                user,
                temperature: cfg.triage.temperature,
                max_tokens: cfg.triage.max_tokens,
            })
            .await?;

        let response = parse_llm_json::<TriageResponse>(&outcome.text).unwrap_or_else(|e| {
            warn!(request = request.id, error = %e, "triage response unparseable, falling back to clarify");
            TriageResponse::parse_fallback()
        });

        let mut decision = response.parsed_decision();
        let mut reasoning = response.reasoning.clone();

        // A duplicate pointer at anything already past triage forces a
        // rejection regardless of the model's own decision field.
        if let Some(dup_id) = response.duplicate_of_request_id {
            if let Ok(dup) = store.get_request(dup_id).await {
                if DUPLICATE_BLOCKING_STATES.contains(&dup.state) {
                    decision = TriageDecision::Reject;
                    reasoning = format!(
                        "{reasoning}\n\nDuplicate of request #{dup_id} (currently {}).",
                        dup.state
                    );
                }
            }
        }

        let review = store
            .add_triage_review(NewTriageReview {
                request_id: request.id,
                decision,
                reasoning,
                alignment_score: response.alignment_score,
                completeness_score: response.completeness_score,
                sales_alignment_score: response.sales_alignment_score,
                suggested_priority: response
                    .suggested_priority
                    .as_deref()
                    .and_then(Priority::parse_lenient)
                    .map(|p| p.as_str().to_string()),
                tags: response.tags.clone(),
                prompt_tokens: outcome.usage.prompt_tokens,
                completion_tokens: outcome.usage.completion_tokens,
                model: outcome.model.clone(),
                duration_ms: outcome.latency_ms,
            })
            .await;

        let comment_body = render_comment(&review, &response.clarification_questions);
        store
            .add_comment(
                NewComment::agent(request.id, comment_body.clone())
                    .for_review(ReviewKind::Triage, review.id),
            )
            .await?;

        let next_state = match decision {
            TriageDecision::Approve => PipelineState::Triaged,
            TriageDecision::Reject => PipelineState::Rejected,
            TriageDecision::Clarify => PipelineState::NeedsClarification,
        };
        store
            .update_request(request.id, None, |r| {
                r.state = next_state;
                r.triage_count += 1;
                r.last_triage_at = Some(now);
            })
            .await?;

        // Host effects after the commit.
        let label = match decision {
            TriageDecision::Approve => labels::agent_approved(),
            TriageDecision::Reject => labels::agent_rejected(),
            TriageDecision::Clarify => labels::agent_needs_info(),
        };
        apply_label_best_effort(&self.ctx, &repo, request.issue_number, label).await;
        comment_best_effort(&self.ctx, &repo, request.issue_number, &comment_body).await;

        Ok(decision)
    }
}

impl CycleWorker for TriageWorker {
    fn name(&self) -> &'static str {
        "triage"
    }

    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration {
        Duration::from_secs(cfg.triage.poll_sec)
    }

    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send {
        self.run_cycle(now)
    }
}
