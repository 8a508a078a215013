//! The cooperating worker set.
//!
//! Every worker is a structure with a cycle function; the polling skeleton
//! is shared via composition (`spawn`), not a class hierarchy. A worker
//! loop is: staggered startup delay, then `while alive { run cycle; sleep
//! poll-interval }`. Shutdown is a watch channel honored between external
//! calls and between requests within a batch; one request's failure is
//! logged and the loop continues.
//!
//! Single-writer discipline: each worker selects requests by a state
//! predicate no other worker matches, so a request row is never processed
//! by two workers at once. The PR monitor additionally runs as a single
//! instance, which is the per-request ordering guarantee.

pub mod architect;
pub mod code_review;
pub mod implementation;
pub mod orchestrator;
pub mod pr_monitor;
pub mod triage;

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use code_host_engine::{Label, RepoRef};

use crate::PipelineContext;
use crate::config::PipelineConfig;

/// Per-cycle batch sizes.
pub(crate) const TRIAGE_BATCH: usize = 5;
pub(crate) const ARCHITECT_BATCH: usize = 3;
pub(crate) const TRIGGER_BATCH: usize = 1;

/// What one cycle did; logged and asserted on in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct CycleReport {
    pub scanned: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped_budget: bool,
}

/// A long-lived polling worker. Implemented by each stage; driven by
/// [`spawn`].
pub trait CycleWorker: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Poll interval read from the *current* config snapshot each loop
    /// iteration, so admin changes apply without restart.
    fn poll_interval(&self, cfg: &PipelineConfig) -> Duration;

    /// One scan-and-process pass. Must not panic and must not let a single
    /// request's failure abort the batch.
    fn cycle(&self, now: DateTime<Utc>) -> impl Future<Output = CycleReport> + Send;
}

/// Spawns the polling loop for `worker`.
pub fn spawn<W: CycleWorker>(worker: W, ctx: &PipelineContext) -> JoinHandle<()> {
    let config = ctx.config.clone();
    let mut shutdown = ctx.shutdown_receiver();
    tokio::spawn(async move {
        let delay = startup_delay(worker.name());
        info!(worker = worker.name(), delay_ms = delay.as_millis() as u64, "worker starting");
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown.changed() => {
                info!(worker = worker.name(), "worker stopped before first cycle");
                return;
            }
        }

        loop {
            if *shutdown.borrow() {
                break;
            }
            let report = worker.cycle(Utc::now()).await;
            debug!(
                worker = worker.name(),
                scanned = report.scanned,
                processed = report.processed,
                failed = report.failed,
                skipped_budget = report.skipped_budget,
                "cycle done"
            );

            let interval = worker.poll_interval(&config.snapshot());
            tokio::select! {
                _ = sleep(interval) => {}
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!(worker = worker.name(), "worker stopped");
    })
}

/// Startup delay in 5-15 s, staggered deterministically by worker name so
/// the workers do not all hit the store at once.
fn startup_delay(name: &str) -> Duration {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    Duration::from_millis(5_000 + hasher.finish() % 10_000)
}

/* -------------------- best-effort host effects -------------------- */

/// Code-host effects run after the store commit; a failure is logged and
/// reconciled by a later write, never propagated.
pub(crate) async fn apply_label_best_effort(
    ctx: &PipelineContext,
    repo: &RepoRef,
    issue: Option<u64>,
    label: Label,
) {
    let Some(issue) = issue else { return };
    if let Err(e) = ctx.host.apply_namespaced_label(repo, issue, &label).await {
        warn!(%repo, issue, label = %label.name, error = %e, "label apply failed");
    }
}

pub(crate) async fn remove_label_best_effort(
    ctx: &PipelineContext,
    repo: &RepoRef,
    issue: Option<u64>,
    name: &str,
) {
    let Some(issue) = issue else { return };
    if let Err(e) = ctx.host.remove_label(repo, issue, name).await {
        warn!(%repo, issue, label = name, error = %e, "label remove failed");
    }
}

pub(crate) async fn comment_best_effort(
    ctx: &PipelineContext,
    repo: &RepoRef,
    issue: Option<u64>,
    body: &str,
) {
    let Some(issue) = issue else { return };
    if let Err(e) = ctx.host.post_issue_comment(repo, issue, body).await {
        warn!(%repo, issue, error = %e, "issue comment failed");
    }
}

#[cfg(test)]
mod tests {
    use super::startup_delay;

    #[test]
    fn startup_delays_are_staggered_and_bounded() {
        let delays: Vec<_> = ["triage", "architect", "pr-monitor"]
            .iter()
            .map(|n| startup_delay(n))
            .collect();
        for d in &delays {
            assert!(d.as_millis() >= 5_000 && d.as_millis() < 15_000);
        }
        // Same name, same delay (deterministic).
        assert_eq!(startup_delay("triage"), startup_delay("triage"));
    }
}
