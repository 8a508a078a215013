//! PR monitor: observes the coding agent's pull-request lifecycle.
//!
//! For every request with an active session, until it reaches `PrMerged`
//! or `Failed`:
//! - `Pending`/`Working` with no PR yet: search open PRs by the agent
//!   author that reference `#{issue}`; record the PR when found.
//! - `PrOpened`: a merged PR completes the request (`Done`, deployment
//!   `Pending`); a PR closed unmerged fails it.
//!
//! The monitor runs as a single instance, so within one request at most
//! one monitor cycle is ever active.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use code_host_engine::PrState;
use request_store::{
    DeploymentStatus, ImplementationStatus, NewComment, PipelineState, Request,
};

use super::{CycleReport, CycleWorker};
use crate::PipelineContext;
use crate::config::PipelineConfig;
use crate::errors::PipelineResult;

pub struct PullRequestMonitorWorker {
    ctx: PipelineContext,
}

impl PullRequestMonitorWorker {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    pub async fn run_cycle(&self, now: DateTime<Utc>) -> CycleReport {
        let cfg = self.ctx.config.snapshot();
        let mut report = CycleReport::default();
        if !cfg.implementation.enabled {
            return report;
        }

        let candidates: Vec<Request> = self
            .ctx
            .store
            .list_by_state(PipelineState::InProgress, request_store::OrderBy::UpdatedAsc)
            .await
            .into_iter()
            .filter(|r| {
                r.session_id.is_some()
                    && matches!(
                        r.implementation_status,
                        Some(
                            ImplementationStatus::Pending
                                | ImplementationStatus::Working
                                | ImplementationStatus::PrOpened
                        )
                    )
            })
            .collect();
        report.scanned = candidates.len();

        for request in candidates {
            if self.ctx.cancelled() {
                break;
            }
            match self.observe(&cfg, &request, now).await {
                Ok(changed) => {
                    if changed {
                        report.processed += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        request = request.id,
                        error = %e,
                        transient = e.is_transient(),
                        "pr monitor pass failed"
                    );
                }
            }
        }
        report
    }

    async fn observe(
        &self,
        cfg: &PipelineConfig,
        request: &Request,
        now: DateTime<Utc>,
    ) -> PipelineResult<bool> {
        let store = &self.ctx.store;
        let (repo, _project) = self.ctx.repo_for(request).await?;

        match request.implementation_status {
            Some(ImplementationStatus::Pending) | Some(ImplementationStatus::Working) => {
                let Some(issue) = request.issue_number else {
                    return Ok(false);
                };
                let Some(pr) = self
                    .ctx
                    .host
                    .find_pr_for_issue(&repo, issue, &cfg.implementation.agent_login)
                    .await?
                else {
                    return Ok(false);
                };

                store
                    .update_request(request.id, Some(request.updated_at), |r| {
                        r.pr_number = Some(pr.number);
                        r.pr_url = Some(pr.url.clone());
                        r.branch_name = Some(pr.head_branch.clone());
                        r.implementation_status = Some(ImplementationStatus::PrOpened);
                    })
                    .await?;
                store
                    .add_comment(NewComment::agent(
                        request.id,
                        format!("Pull request #{} opened: {}", pr.number, pr.url),
                    ))
                    .await?;
                info!(request = request.id, pr = pr.number, "pr opened");
                Ok(true)
            }

            Some(ImplementationStatus::PrOpened) => {
                let Some(pr_number) = request.pr_number else {
                    return Ok(false);
                };
                let pr = self.ctx.host.pull_request(&repo, pr_number).await?;

                if pr.merged {
                    store
                        .update_request(request.id, Some(request.updated_at), |r| {
                            r.implementation_status = Some(ImplementationStatus::PrMerged);
                            r.completed_at = Some(now);
                            r.state = PipelineState::Done;
                            r.deployment_status = DeploymentStatus::Pending;
                        })
                        .await?;
                    store
                        .add_comment(NewComment::agent(
                            request.id,
                            format!("Pull request #{pr_number} merged; deployment pending."),
                        ))
                        .await?;
                    info!(request = request.id, pr = pr_number, "pr merged, request done");
                    return Ok(true);
                }

                if pr.state == PrState::Closed {
                    store
                        .update_request(request.id, Some(request.updated_at), |r| {
                            r.implementation_status = Some(ImplementationStatus::Failed);
                            r.completed_at = Some(now);
                        })
                        .await?;
                    store
                        .add_comment(NewComment::agent(
                            request.id,
                            format!("Pull request #{pr_number} was closed without merging."),
                        ))
                        .await?;
                    warn!(request = request.id, pr = pr_number, "pr closed unmerged");
                    return Ok(true);
                }
                Ok(false)
            }

            _ => Ok(false),
        }
    }
}

impl CycleWorker for PullRequestMonitorWorker {
    fn name(&self) -> &'static str {
        "pr-monitor"
    }

    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration {
        Duration::from_secs(cfg.implementation.pr_poll_sec)
    }

    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send {
        self.run_cycle(now)
    }
}
