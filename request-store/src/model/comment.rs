//! Conversation and attachment rows hanging off a request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which review table a comment back-reference points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReviewKind {
    Triage,
    Architect,
    CodeReview,
}

/// A comment on a request. Agent-generated comments carry `is_agent = true`
/// and usually a back-reference to the review that produced them.
///
/// Request <-> Comment <-> Review form a cycle of references; the comment
/// side holds plain ids (weak direction), ownership runs from the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub request_id: i64,
    pub author: String,
    pub content: String,
    pub is_agent: bool,
    pub review_kind: Option<ReviewKind>,
    pub review_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`Comment`].
#[derive(Debug, Clone)]
pub struct NewComment {
    pub request_id: i64,
    pub author: String,
    pub content: String,
    pub is_agent: bool,
    pub review_kind: Option<ReviewKind>,
    pub review_id: Option<i64>,
}

impl NewComment {
    /// A human (submitter/admin) comment with no review back-reference.
    pub fn human(request_id: i64, author: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            request_id,
            author: author.into(),
            content: content.into(),
            is_agent: false,
            review_kind: None,
            review_id: None,
        }
    }

    /// A system-generated comment attributed to the pipeline agent.
    pub fn agent(request_id: i64, content: impl Into<String>) -> Self {
        Self {
            request_id,
            author: "pipeline-agent".into(),
            content: content.into(),
            is_agent: true,
            review_kind: None,
            review_id: None,
        }
    }

    pub fn for_review(mut self, kind: ReviewKind, review_id: i64) -> Self {
        self.review_kind = Some(kind);
        self.review_id = Some(review_id);
        self
    }
}

/// Binary blob attached to a request (screenshots, logs).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: i64,
    pub request_id: i64,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// Insert payload for [`Attachment`].
#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub request_id: i64,
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}
