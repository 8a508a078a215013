//! In-memory store backend.
//!
//! One `tokio::sync::RwLock` over the whole table set: a write guard is the
//! transaction, so per-request read-modify-write is atomic by construction.
//! The same discipline a SQL backend would provide is still enforced
//! explicitly so callers cannot grow to depend on the big lock:
//! - `update_request` takes an optional `expected_updated_at` version token
//!   and fails with `Conflict` on mismatch,
//! - every request mutation bumps `updated_at` (monotonically),
//! - state changes are validated against the pipeline graph and leave the
//!   row untouched when illegal.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{StoreError, StoreResult};
use crate::model::reviews::clamp_score;
use crate::model::*;
use crate::state::PipelineState;

/// Ordering for request listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderBy {
    CreatedAsc,
    UpdatedAsc,
}

/// Aggregate counters served by the `health` operation.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct HealthCounters {
    pub stalled: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct StoreInner {
    next_id: i64,
    projects: HashMap<i64, Project>,
    requests: BTreeMap<i64, Request>,
    comments: Vec<Comment>,
    attachments: Vec<Attachment>,
    triage_reviews: Vec<TriageReview>,
    architect_reviews: Vec<ArchitectReview>,
    code_reviews: Vec<CodeReview>,
    system_prompts: HashMap<String, SystemPrompt>,
}

impl StoreInner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// The narrow store surface the pipeline consumes.
///
/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct RequestStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl RequestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /* ------------------------- projects ------------------------- */

    pub async fn insert_project(&self, new: NewProject) -> Project {
        let mut g = self.inner.write().await;
        let id = g.next_id();
        let project = Project {
            id,
            owner: new.owner,
            repo: new.repo,
            display_name: new.display_name,
            active: true,
        };
        g.projects.insert(id, project.clone());
        project
    }

    pub async fn get_project(&self, id: i64) -> StoreResult<Project> {
        self.inner
            .read()
            .await
            .projects
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "project",
                id,
            })
    }

    /* ------------------------- requests ------------------------- */

    pub async fn insert_request(&self, new: NewRequest) -> Request {
        let mut g = self.inner.write().await;
        let id = g.next_id();
        let now = Utc::now();
        let request = Request {
            id,
            project_id: new.project_id,
            title: new.title,
            description: new.description,
            submitter_name: new.submitter_name,
            submitter_email: new.submitter_email,
            request_type: new.request_type,
            priority: new.priority,
            bug: new.bug,
            state: PipelineState::New,
            last_triage_at: None,
            triage_count: 0,
            last_architect_at: None,
            architect_count: 0,
            issue_number: new.issue_number,
            session_id: None,
            pr_number: None,
            pr_url: None,
            branch_name: None,
            triggered_at: None,
            completed_at: None,
            implementation_status: None,
            deployment_status: DeploymentStatus::None,
            deployment_run_id: None,
            deployed_at: None,
            deployment_retry_count: 0,
            branch_deleted: false,
            stall_notified_at: None,
            created_at: now,
            updated_at: now,
        };
        g.requests.insert(id, request.clone());
        debug!(request = id, "request inserted");
        request
    }

    pub async fn get_request(&self, id: i64) -> StoreResult<Request> {
        self.inner
            .read()
            .await
            .requests
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "request",
                id,
            })
    }

    /// Requests in `state`, ordered, no limit (callers batch).
    pub async fn list_by_state(&self, state: PipelineState, order: OrderBy) -> Vec<Request> {
        let g = self.inner.read().await;
        let mut rows: Vec<Request> = g
            .requests
            .values()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        match order {
            OrderBy::CreatedAsc => rows.sort_by_key(|r| (r.created_at, r.id)),
            OrderBy::UpdatedAsc => rows.sort_by_key(|r| (r.updated_at, r.id)),
        }
        rows
    }

    /// Recent sibling requests of the same project (newest first), excluding
    /// the request under review. Used for duplicate context during triage.
    pub async fn recent_project_requests(
        &self,
        project_id: i64,
        exclude: i64,
        limit: usize,
    ) -> Vec<Request> {
        let g = self.inner.read().await;
        let mut rows: Vec<Request> = g
            .requests
            .values()
            .filter(|r| r.project_id == project_id && r.id != exclude)
            .cloned()
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        rows.truncate(limit);
        rows
    }

    /// Number of requests currently holding a coding-agent session slot.
    pub async fn active_session_count(&self) -> usize {
        self.inner
            .read()
            .await
            .requests
            .values()
            .filter(|r| {
                r.implementation_status
                    .is_some_and(|s| s.holds_session_slot())
            })
            .count()
    }

    /// Atomic read-modify-write on one request row.
    ///
    /// `expected_updated_at` is the optimistic-concurrency token: when given
    /// and stale, the write fails with [`StoreError::Conflict`] and nothing
    /// changes. A state change outside the pipeline graph fails with
    /// [`StoreError::IllegalTransition`], also leaving the row untouched.
    /// Successful writes bump `updated_at` monotonically; a state change
    /// clears the stall flag.
    pub async fn update_request<F>(
        &self,
        id: i64,
        expected_updated_at: Option<DateTime<Utc>>,
        mutate: F,
    ) -> StoreResult<Request>
    where
        F: FnOnce(&mut Request),
    {
        let mut g = self.inner.write().await;
        let row = g.requests.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "request",
            id,
        })?;

        if let Some(expected) = expected_updated_at {
            if row.updated_at != expected {
                return Err(StoreError::Conflict { id });
            }
        }

        let mut next = row.clone();
        mutate(&mut next);
        // Identity is immutable regardless of what the closure did.
        next.id = row.id;
        next.created_at = row.created_at;

        if next.state != row.state {
            if !row.state.can_transition_to(next.state) {
                return Err(StoreError::IllegalTransition {
                    id,
                    from: row.state,
                    to: next.state,
                });
            }
            next.stall_notified_at = None;
        }

        let now = Utc::now();
        next.updated_at = if now > row.updated_at {
            now
        } else {
            row.updated_at + Duration::microseconds(1)
        };

        *row = next;
        Ok(row.clone())
    }

    /// Admin override write: like [`RequestStore::update_request`] but
    /// without transition validation. Reset and override operations move
    /// requests against the worker graph deliberately; everything else
    /// (monotonic `updated_at`, stall-flag clearing) still applies.
    pub async fn override_request<F>(&self, id: i64, mutate: F) -> StoreResult<Request>
    where
        F: FnOnce(&mut Request),
    {
        let mut g = self.inner.write().await;
        let row = g.requests.get_mut(&id).ok_or(StoreError::NotFound {
            entity: "request",
            id,
        })?;

        let mut next = row.clone();
        mutate(&mut next);
        next.id = row.id;
        next.created_at = row.created_at;
        if next.state != row.state {
            next.stall_notified_at = None;
        }

        let now = Utc::now();
        next.updated_at = if now > row.updated_at {
            now
        } else {
            row.updated_at + Duration::microseconds(1)
        };

        *row = next;
        Ok(row.clone())
    }

    /* ------------------------- comments ------------------------- */

    /// Appends a comment and bumps the request's `updated_at` (a comment is
    /// activity for stall purposes).
    pub async fn add_comment(&self, new: NewComment) -> StoreResult<Comment> {
        let mut g = self.inner.write().await;
        if !g.requests.contains_key(&new.request_id) {
            return Err(StoreError::NotFound {
                entity: "request",
                id: new.request_id,
            });
        }
        let id = g.next_id();
        let comment = Comment {
            id,
            request_id: new.request_id,
            author: new.author,
            content: new.content,
            is_agent: new.is_agent,
            review_kind: new.review_kind,
            review_id: new.review_id,
            created_at: Utc::now(),
        };
        g.comments.push(comment.clone());
        if let Some(row) = g.requests.get_mut(&new.request_id) {
            let now = Utc::now();
            row.updated_at = if now > row.updated_at {
                now
            } else {
                row.updated_at + Duration::microseconds(1)
            };
        }
        Ok(comment)
    }

    /// Comments of a request, oldest first.
    pub async fn comments_for(&self, request_id: i64) -> Vec<Comment> {
        let g = self.inner.read().await;
        let mut rows: Vec<Comment> = g
            .comments
            .iter()
            .filter(|c| c.request_id == request_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        rows
    }

    /// Creation time of the newest non-agent comment, if any.
    pub async fn latest_human_comment_at(&self, request_id: i64) -> Option<DateTime<Utc>> {
        self.inner
            .read()
            .await
            .comments
            .iter()
            .filter(|c| c.request_id == request_id && !c.is_agent)
            .map(|c| c.created_at)
            .max()
    }

    /* ------------------------ attachments ----------------------- */

    pub async fn add_attachment(&self, new: NewAttachment) -> StoreResult<Attachment> {
        let mut g = self.inner.write().await;
        if !g.requests.contains_key(&new.request_id) {
            return Err(StoreError::NotFound {
                entity: "request",
                id: new.request_id,
            });
        }
        let id = g.next_id();
        let attachment = Attachment {
            id,
            request_id: new.request_id,
            filename: new.filename,
            content_type: new.content_type,
            data: new.data,
            created_at: Utc::now(),
        };
        g.attachments.push(attachment.clone());
        Ok(attachment)
    }

    pub async fn attachments_for(&self, request_id: i64) -> Vec<Attachment> {
        self.inner
            .read()
            .await
            .attachments
            .iter()
            .filter(|a| a.request_id == request_id)
            .cloned()
            .collect()
    }

    /* ----------------------- triage reviews --------------------- */

    pub async fn add_triage_review(&self, new: NewTriageReview) -> TriageReview {
        let mut g = self.inner.write().await;
        let id = g.next_id();
        let review = TriageReview {
            id,
            request_id: new.request_id,
            decision: new.decision,
            reasoning: new.reasoning,
            alignment_score: clamp_score(new.alignment_score, 0, 100),
            completeness_score: clamp_score(new.completeness_score, 0, 100),
            sales_alignment_score: clamp_score(new.sales_alignment_score, 0, 100),
            suggested_priority: new.suggested_priority,
            tags: new.tags,
            prompt_tokens: new.prompt_tokens,
            completion_tokens: new.completion_tokens,
            model: new.model,
            duration_ms: new.duration_ms,
            created_at: Utc::now(),
        };
        g.triage_reviews.push(review.clone());
        review
    }

    pub async fn get_triage_review(&self, id: i64) -> StoreResult<TriageReview> {
        self.inner
            .read()
            .await
            .triage_reviews
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "triage review",
                id,
            })
    }

    pub async fn latest_triage_review(&self, request_id: i64) -> Option<TriageReview> {
        self.inner
            .read()
            .await
            .triage_reviews
            .iter()
            .filter(|r| r.request_id == request_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /// Sum of triage tokens (prompt + completion) for reviews created at or
    /// after `since`. Budget gates call this with UTC day/month starts.
    pub async fn triage_tokens_since(&self, since: DateTime<Utc>) -> u64 {
        self.inner
            .read()
            .await
            .triage_reviews
            .iter()
            .filter(|r| r.created_at >= since)
            .map(|r| u64::from(r.prompt_tokens) + u64::from(r.completion_tokens))
            .sum()
    }

    /* ---------------------- architect reviews ------------------- */

    pub async fn add_architect_review(&self, new: NewArchitectReview) -> ArchitectReview {
        let mut g = self.inner.write().await;
        let id = g.next_id();
        let review = ArchitectReview {
            id,
            request_id: new.request_id,
            solution_summary: new.solution_summary,
            approach: new.approach,
            solution_json: new.solution_json,
            estimated_complexity: new.estimated_complexity,
            estimated_effort: new.estimated_effort,
            files_analyzed: new.files_analyzed,
            paths_read: new.paths_read,
            step1_prompt_tokens: new.step1_prompt_tokens,
            step1_completion_tokens: new.step1_completion_tokens,
            step2_prompt_tokens: new.step2_prompt_tokens,
            step2_completion_tokens: new.step2_completion_tokens,
            model: new.model,
            duration_ms: new.duration_ms,
            decision: ArchitectDecision::Pending,
            human_feedback: None,
            approved_by: None,
            approved_at: None,
            created_at: Utc::now(),
        };
        g.architect_reviews.push(review.clone());
        review
    }

    pub async fn get_architect_review(&self, id: i64) -> StoreResult<ArchitectReview> {
        self.inner
            .read()
            .await
            .architect_reviews
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(StoreError::NotFound {
                entity: "architect review",
                id,
            })
    }

    /// Mutates one architect review (human decisions: approve / reject /
    /// feedback).
    pub async fn update_architect_review<F>(&self, id: i64, mutate: F) -> StoreResult<ArchitectReview>
    where
        F: FnOnce(&mut ArchitectReview),
    {
        let mut g = self.inner.write().await;
        let row = g
            .architect_reviews
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(StoreError::NotFound {
                entity: "architect review",
                id,
            })?;
        mutate(row);
        Ok(row.clone())
    }

    pub async fn latest_architect_review(&self, request_id: i64) -> Option<ArchitectReview> {
        self.inner
            .read()
            .await
            .architect_reviews
            .iter()
            .filter(|r| r.request_id == request_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /// Latest architect review carrying a human Approved decision.
    pub async fn latest_approved_architect_review(
        &self,
        request_id: i64,
    ) -> Option<ArchitectReview> {
        self.inner
            .read()
            .await
            .architect_reviews
            .iter()
            .filter(|r| r.request_id == request_id && r.decision == ArchitectDecision::Approved)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    pub async fn architect_tokens_since(&self, since: DateTime<Utc>) -> u64 {
        self.inner
            .read()
            .await
            .architect_reviews
            .iter()
            .filter(|r| r.created_at >= since)
            .map(|r| r.total_tokens())
            .sum()
    }

    /* ------------------------ code reviews ---------------------- */

    pub async fn add_code_review(&self, new: NewCodeReview) -> CodeReview {
        let mut g = self.inner.write().await;
        let id = g.next_id();
        let review = CodeReview {
            id,
            request_id: new.request_id,
            pr_number: new.pr_number,
            decision: new.decision,
            summary: new.summary,
            design_compliance: new.design_compliance,
            design_compliance_notes: new.design_compliance_notes,
            security_pass: new.security_pass,
            security_notes: new.security_notes,
            coding_standards_pass: new.coding_standards_pass,
            coding_standards_notes: new.coding_standards_notes,
            quality_score: clamp_score(new.quality_score, 1, 10),
            files_changed: new.files_changed,
            lines_added: new.lines_added,
            lines_removed: new.lines_removed,
            prompt_tokens: new.prompt_tokens,
            completion_tokens: new.completion_tokens,
            model: new.model,
            duration_ms: new.duration_ms,
            created_at: Utc::now(),
        };
        g.code_reviews.push(review.clone());
        review
    }

    pub async fn latest_code_review(&self, request_id: i64) -> Option<CodeReview> {
        self.inner
            .read()
            .await
            .code_reviews
            .iter()
            .filter(|r| r.request_id == request_id)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /// Whether a review already exists for this request + PR pair.
    pub async fn code_review_for_pr(&self, request_id: i64, pr_number: u64) -> Option<CodeReview> {
        self.inner
            .read()
            .await
            .code_reviews
            .iter()
            .filter(|r| r.request_id == request_id && r.pr_number == pr_number)
            .max_by_key(|r| (r.created_at, r.id))
            .cloned()
    }

    /* ----------------------- system prompts --------------------- */

    pub async fn system_prompt(&self, key: &str) -> Option<SystemPrompt> {
        self.inner.read().await.system_prompts.get(key).cloned()
    }

    pub async fn upsert_system_prompt(&self, key: &str, content: &str) -> SystemPrompt {
        let mut g = self.inner.write().await;
        let prompt = SystemPrompt {
            key: key.to_string(),
            content: content.to_string(),
            updated_at: Utc::now(),
        };
        g.system_prompts.insert(key.to_string(), prompt.clone());
        prompt
    }

    /* --------------------------- health ------------------------- */

    pub async fn health_counters(&self) -> HealthCounters {
        use PipelineState::*;
        let g = self.inner.read().await;
        let mut counters = HealthCounters::default();
        for r in g.requests.values() {
            if r.stall_notified_at.is_some() {
                counters.stalled += 1;
            }
            match r.state {
                New | NeedsClarification | Triaged | ArchitectReview | Approved => {
                    counters.pending += 1
                }
                InProgress => counters.in_progress += 1,
                _ => {}
            }
            if r.deployment_status == DeploymentStatus::Succeeded {
                counters.succeeded += 1;
            }
            if r.implementation_status == Some(ImplementationStatus::Failed)
                || r.deployment_status == DeploymentStatus::Failed
            {
                counters.failed += 1;
            }
        }
        counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature_request(project_id: i64) -> NewRequest {
        NewRequest {
            project_id,
            title: "Add search".into(),
            description: "Full-text search across widgets".into(),
            submitter_name: "Dana".into(),
            submitter_email: "dana@example.com".into(),
            request_type: RequestType::Feature,
            priority: Priority::Medium,
            bug: BugDetails::default(),
            issue_number: Some(41),
        }
    }

    #[tokio::test]
    async fn updated_at_is_monotonic_and_bumped() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        let before = r.updated_at;
        let after = store
            .update_request(r.id, None, |row| row.triage_count += 1)
            .await
            .unwrap();
        assert!(after.updated_at > before);
    }

    #[tokio::test]
    async fn stale_version_token_conflicts() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        let stale = r.updated_at;
        store
            .update_request(r.id, Some(stale), |row| row.triage_count += 1)
            .await
            .unwrap();
        let err = store
            .update_request(r.id, Some(stale), |row| row.triage_count += 1)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        // The second write changed nothing.
        assert_eq!(store.get_request(r.id).await.unwrap().triage_count, 1);
    }

    #[tokio::test]
    async fn illegal_transition_leaves_row_untouched() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        let err = store
            .update_request(r.id, None, |row| {
                row.state = PipelineState::Done;
                row.triage_count = 99;
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        let row = store.get_request(r.id).await.unwrap();
        assert_eq!(row.state, PipelineState::New);
        assert_eq!(row.triage_count, 0);
    }

    #[tokio::test]
    async fn state_change_clears_stall_flag() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        store
            .update_request(r.id, None, |row| row.stall_notified_at = Some(Utc::now()))
            .await
            .unwrap();
        let row = store
            .update_request(r.id, None, |row| row.state = PipelineState::Triaged)
            .await
            .unwrap();
        assert!(row.stall_notified_at.is_none());
    }

    #[tokio::test]
    async fn scores_are_clamped_on_write() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        let review = store
            .add_triage_review(NewTriageReview {
                request_id: r.id,
                decision: TriageDecision::Approve,
                reasoning: "ok".into(),
                alignment_score: 250,
                completeness_score: -3,
                sales_alignment_score: 80,
                suggested_priority: None,
                tags: vec![],
                prompt_tokens: 10,
                completion_tokens: 5,
                model: "test".into(),
                duration_ms: 1,
            })
            .await;
        assert_eq!(review.alignment_score, 100);
        assert_eq!(review.completeness_score, 0);
        assert_eq!(review.sales_alignment_score, 80);
    }

    #[tokio::test]
    async fn latest_review_wins_by_created_at() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        for i in 0..3 {
            store
                .add_triage_review(NewTriageReview {
                    request_id: r.id,
                    decision: TriageDecision::Clarify,
                    reasoning: format!("round {i}"),
                    alignment_score: 0,
                    completeness_score: 0,
                    sales_alignment_score: 0,
                    suggested_priority: None,
                    tags: vec![],
                    prompt_tokens: 1,
                    completion_tokens: 1,
                    model: "test".into(),
                    duration_ms: 1,
                })
                .await;
        }
        let latest = store.latest_triage_review(r.id).await.unwrap();
        assert_eq!(latest.reasoning, "round 2");
        assert_eq!(store.triage_tokens_since(r.created_at).await, 6);
    }

    #[tokio::test]
    async fn human_comment_bumps_request_activity() {
        let store = RequestStore::new();
        let r = store.insert_request(feature_request(1)).await;
        let before = store.get_request(r.id).await.unwrap().updated_at;
        store
            .add_comment(NewComment::human(r.id, "Dana", "any update?"))
            .await
            .unwrap();
        let after = store.get_request(r.id).await.unwrap().updated_at;
        assert!(after > before);
        assert!(store.latest_human_comment_at(r.id).await.is_some());
    }
}
