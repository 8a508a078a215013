//! Token budget gates.
//!
//! Each LLM-driven worker sums the tokens its review table spent in the
//! current UTC day and month at the start of every cycle. A positive budget
//! that is already exceeded skips the cycle (not the worker) with one
//! warning.

use chrono::{DateTime, Datelike, TimeZone, Utc};

use request_store::RequestStore;

/// Which review table a gate sums over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Triage,
    Architect,
}

/// A tripped budget gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetExceeded {
    pub kind: TokenKind,
    /// "daily" or "monthly".
    pub window: &'static str,
    pub used: u64,
    pub limit: u64,
}

/// Start of the UTC day containing `now`.
pub fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), now.day(), 0, 0, 0)
        .single()
        .expect("valid day start")
}

/// Start of the UTC month containing `now`.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("valid month start")
}

/// Checks the daily and monthly budgets (0 = unlimited) against the review
/// table. Returns the first window that is exhausted.
pub async fn check(
    store: &RequestStore,
    kind: TokenKind,
    daily_budget: u64,
    monthly_budget: u64,
    now: DateTime<Utc>,
) -> Option<BudgetExceeded> {
    if daily_budget == 0 && monthly_budget == 0 {
        return None;
    }

    let sum = |since| async move {
        match kind {
            TokenKind::Triage => store.triage_tokens_since(since).await,
            TokenKind::Architect => store.architect_tokens_since(since).await,
        }
    };

    if daily_budget > 0 {
        let used = sum(day_start(now)).await;
        if used >= daily_budget {
            return Some(BudgetExceeded {
                kind,
                window: "daily",
                used,
                limit: daily_budget,
            });
        }
    }
    if monthly_budget > 0 {
        let used = sum(month_start(now)).await;
        if used >= monthly_budget {
            return Some(BudgetExceeded {
                kind,
                window: "monthly",
                used,
                limit: monthly_budget,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use request_store::{BugDetails, NewRequest, NewTriageReview, Priority, RequestType, TriageDecision};

    async fn store_with_spend(tokens: u32) -> RequestStore {
        let store = RequestStore::new();
        let r = store
            .insert_request(NewRequest {
                project_id: 1,
                title: "t".into(),
                description: "d".into(),
                submitter_name: "s".into(),
                submitter_email: "s@example.com".into(),
                request_type: RequestType::Feature,
                priority: Priority::Low,
                bug: BugDetails::default(),
                issue_number: None,
            })
            .await;
        store
            .add_triage_review(NewTriageReview {
                request_id: r.id,
                decision: TriageDecision::Approve,
                reasoning: "ok".into(),
                alignment_score: 1,
                completeness_score: 1,
                sales_alignment_score: 1,
                suggested_priority: None,
                tags: vec![],
                prompt_tokens: tokens,
                completion_tokens: 0,
                model: "test".into(),
                duration_ms: 1,
            })
            .await;
        store
    }

    #[test]
    fn window_starts_are_utc_midnights() {
        let now = Utc.with_ymd_and_hms(2026, 7, 14, 13, 45, 9).unwrap();
        assert_eq!(day_start(now).to_rfc3339(), "2026-07-14T00:00:00+00:00");
        assert_eq!(month_start(now).to_rfc3339(), "2026-07-01T00:00:00+00:00");
    }

    #[tokio::test]
    async fn zero_budget_means_unlimited() {
        let store = store_with_spend(1_000_000).await;
        assert!(check(&store, TokenKind::Triage, 0, 0, Utc::now()).await.is_none());
    }

    #[tokio::test]
    async fn exhausted_daily_budget_trips_first() {
        let store = store_with_spend(500).await;
        let hit = check(&store, TokenKind::Triage, 100, 100_000, Utc::now())
            .await
            .unwrap();
        assert_eq!(hit.window, "daily");
        assert_eq!(hit.used, 500);
    }

    #[tokio::test]
    async fn budget_with_headroom_passes() {
        let store = store_with_spend(500).await;
        assert!(
            check(&store, TokenKind::Triage, 10_000, 0, Utc::now())
                .await
                .is_none()
        );
    }
}
