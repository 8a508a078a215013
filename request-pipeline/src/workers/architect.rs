//! Architect worker: two-phase solution design for triaged requests.
//!
//! Phase A asks the model to select the relevant files from the repository
//! map; phase B designs the solution against the fetched file contents
//! (subject to the char budget). A human comment on a request already in
//! `ArchitectReview` triggers a revision round that carries the prior
//! solution summary and the feedback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use ai_llm_service::{ChatClient, ChatRequest};
use request_store::{
    ArchitectReview, NewArchitectReview, NewComment, PipelineState, Request, ReviewKind,
};

use super::{ARCHITECT_BATCH, CycleReport, CycleWorker, comment_best_effort};
use crate::config::PipelineConfig;
use crate::errors::PipelineResult;
use crate::prompts::architect::{
    DEFAULT_SYSTEM_PROMPT, RevisionContext, SELECTION_MAX_TOKENS, SolutionDocument,
    build_selection_system, build_selection_user, build_solution_system, build_solution_user,
    fit_file_sections, parse_file_selection,
};
use crate::prompts::parse_llm_json;
use crate::{PipelineContext, budget, telemetry};

pub struct ArchitectWorker {
    ctx: PipelineContext,
    budget_warned: AtomicBool,
}

impl ArchitectWorker {
    pub fn new(ctx: PipelineContext) -> Self {
        Self {
            ctx,
            budget_warned: AtomicBool::new(false),
        }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = self.ctx.config.snapshot();
        let mut report = CycleReport::default();
        if !cfg.architect.enabled {
            return report;
        }
        let Some(llm) = self.ctx.llm.clone() else {
            return report;
        };

        if let Some(hit) = budget::check(
            &self.ctx.store,
            budget::TokenKind::Architect,
            cfg.architect.daily_budget,
            cfg.architect.monthly_budget,
            now,
        )
        .await
        {
            if !self.budget_warned.swap(true, Ordering::Relaxed) {
                warn!(
                    window = hit.window,
                    used = hit.used,
                    limit = hit.limit,
                    "architect token budget exceeded, skipping cycles"
                );
            }
            report.skipped_budget = true;
            return report;
        }
        self.budget_warned.store(false, Ordering::Relaxed);

        let candidates = self.candidates(&cfg).await;
        report.scanned = candidates.len();

        for request in candidates.into_iter().take(ARCHITECT_BATCH) {
            if self.ctx.cancelled() {
                break;
            }
            match self.process(&llm, &cfg, &request, now).await {
                Ok(()) => {
                    report.processed += 1;
                    info!(request = request.id, "architect review produced");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        request = request.id,
                        error = %e,
                        transient = e.is_transient(),
                        "architect pass failed, will retry next cycle"
                    );
                }
            }
        }
        report
    }

    async fn candidates(&self, cfg: &PipelineConfig) -> Vec<Request> {
        let store = &self.ctx.store;
        let mut out: Vec<Request> = store
            .list_by_state(PipelineState::Triaged, request_store::OrderBy::CreatedAsc)
            .await
            .into_iter()
            .filter(|r| r.architect_count == 0)
            .collect();

        // Revision trigger: a human commented after the last architect pass.
        for r in store
            .list_by_state(
                PipelineState::ArchitectReview,
                request_store::OrderBy::CreatedAsc,
            )
            .await
        {
            if r.architect_count >= cfg.architect.max_reviews {
                continue;
            }
            let Some(human_at) = store.latest_human_comment_at(r.id).await else {
                continue;
            };
            if r.last_architect_at.is_none_or(|t| human_at > t) {
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
    ) -> PipelineResult<()> {
        let store = &self.ctx.store;
        let (repo, _project) = self.ctx.repo_for(request).await?;
        let branch = cfg.implementation.base_branch.clone();

        let map = self
            .ctx
            .codebase
            .repo_map(&self.ctx.host, &repo, &branch)
            .await?;
        let po_review = store.latest_triage_review(request.id).await;

        // Phase A: file selection.
        let selection_user =
            build_selection_user(request, &map, po_review.as_ref(), cfg.architect.max_files);
        telemetry::dump_prompt("architect-select", request.id, "", &selection_user).await;
        let step1 = llm
            .chat(&ChatRequest {
                system: build_selection_system(),
                user: selection_user,
                temperature: cfg.architect.temperature,
                max_tokens: SELECTION_MAX_TOKENS,
            })
            .await?;

        let selected: Vec<String> = parse_file_selection(&step1.text)
            .unwrap_or_default()
            .into_iter()
            .filter(|p| map.contains(p))
            .take(cfg.architect.max_files)
            .collect();
        if selected.is_empty() {
            warn!(request = request.id, "selection phase produced no usable paths");
        }

        // Fetch contents (parallel, throttled, cached) and fit the budget.
        let fetched = self
            .ctx
            .codebase
            .file_contents(&self.ctx.host, &repo, &branch, &selected)
            .await;
        let present: Vec<(String, String)> = fetched
            .into_iter()
            .filter_map(|(path, content)| content.map(|c| (path, c)))
            .collect();
        let files = fit_file_sections(present, cfg.architect.max_content_chars);
        let paths_read: Vec<String> = files.iter().map(|(p, _)| p.clone()).collect();

        // Revision context when a human sent this back.
        let prior: Option<ArchitectReview> = if request.state == PipelineState::ArchitectReview {
            store.latest_architect_review(request.id).await
        } else {
            None
        };
        let feedback = match &prior {
            Some(p) => match &p.human_feedback {
                Some(f) => f.clone(),
                None => store
                    .comments_for(request.id)
                    .await
                    .iter()
                    .rev()
                    .find(|c| !c.is_agent)
                    .map(|c| c.content.clone())
                    .unwrap_or_default(),
            },
            None => String::new(),
        };
        let revision = prior.as_ref().map(|p| RevisionContext {
            prior_summary: &p.solution_summary,
            human_feedback: &feedback,
        });

        // Phase B: solution proposal.
        let role = self
            .ctx
            .system_prompt_or("architect", DEFAULT_SYSTEM_PROMPT)
            .await;
        let system = build_solution_system(
            &role,
            &self.ctx.refdocs.product_objectives().await,
            &self.ctx.refdocs.sales_positioning().await,
        );
        let user = build_solution_user(request, &map, &files, po_review.as_ref(), revision);
        telemetry::dump_prompt("architect-solution", request.id, &system, &user).await;

        let step2 = llm
            .chat(&ChatRequest {
                system,
                user,
                temperature: cfg.architect.temperature,
                max_tokens: cfg.architect.max_tokens,
            })
            .await?;

        let mut doc = parse_llm_json::<SolutionDocument>(&step2.text).unwrap_or_else(|e| {
            warn!(request = request.id, error = %e, "solution unparseable, storing fallback document");
            SolutionDocument::parse_fallback(&step2.text)
        });
        doc.annotate_unknown_paths(&map);
        let solution_json = serde_json::to_string(&doc)?;

        let review = store
            .add_architect_review(NewArchitectReview {
                request_id: request.id,
                solution_summary: doc.solution_summary.clone(),
                approach: doc.approach.clone(),
                solution_json,
                estimated_complexity: doc.estimated_complexity.clone(),
                estimated_effort: doc.estimated_effort.clone(),
                files_analyzed: files.len() as u32,
                paths_read,
                step1_prompt_tokens: step1.usage.prompt_tokens,
                step1_completion_tokens: step1.usage.completion_tokens,
                step2_prompt_tokens: step2.usage.prompt_tokens,
                step2_completion_tokens: step2.usage.completion_tokens,
                model: step2.model.clone(),
                duration_ms: step1.latency_ms + step2.latency_ms,
            })
            .await;

        let mut comment_body = format!(
            "**Architect solution ({} / {})**\n\n{}\n\n{}",
            review.estimated_complexity, review.estimated_effort,
            review.solution_summary, review.approach,
        );
        if !doc.unknown_paths.is_empty() {
            comment_body.push_str(&format!(
                "\n\nPaths not found in the repository map: {}",
                doc.unknown_paths.join(", ")
            ));
        }
        if !doc.clarification_questions.is_empty() {
            comment_body.push_str("\n\nOpen questions:\n");
            for q in &doc.clarification_questions {
                comment_body.push_str(&format!("- {q}\n"));
            }
        }
        store
            .add_comment(
                NewComment::agent(request.id, comment_body.clone())
                    .for_review(ReviewKind::Architect, review.id),
            )
            .await?;

        store
            .update_request(request.id, None, |r| {
                r.state = PipelineState::ArchitectReview;
                r.architect_count += 1;
                r.last_architect_at = Some(now);
            })
            .await?;

        comment_best_effort(&self.ctx, &repo, request.issue_number, &comment_body).await;
        Ok(())
    }
}

impl CycleWorker for ArchitectWorker {
    fn name(&self) -> &'static str {
        "architect"
    }

    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration {
        Duration::from_secs(cfg.architect.poll_sec)
    }

    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send {
        self.run_cycle(now)
    }
}
