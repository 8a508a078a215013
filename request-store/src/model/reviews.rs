//! Immutable review artifacts, one table per pipeline stage.
//!
//! Reviews are append-only; "the" review of a request is the latest row by
//! `created_at` descending. Token counts and durations are recorded on every
//! row so budget gates can be computed from the tables alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of a product-owner triage pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriageDecision {
    Approve,
    Reject,
    Clarify,
}

impl TriageDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            TriageDecision::Approve => "Approve",
            TriageDecision::Reject => "Reject",
            TriageDecision::Clarify => "Clarify",
        }
    }
}

/// Structured artifact of one triage LLM pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageReview {
    pub id: i64,
    pub request_id: i64,
    pub decision: TriageDecision,
    pub reasoning: String,
    /// 0-100, clamped on write.
    pub alignment_score: u8,
    pub completeness_score: u8,
    pub sales_alignment_score: u8,
    pub suggested_priority: Option<String>,
    pub tags: Vec<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`TriageReview`]. Scores are clamped by the store.
#[derive(Debug, Clone)]
pub struct NewTriageReview {
    pub request_id: i64,
    pub decision: TriageDecision,
    pub reasoning: String,
    pub alignment_score: i64,
    pub completeness_score: i64,
    pub sales_alignment_score: i64,
    pub suggested_priority: Option<String>,
    pub tags: Vec<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
    pub duration_ms: u64,
}

/// Human decision recorded on an architect review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchitectDecision {
    Pending,
    Approved,
    Rejected,
    Revised,
}

impl ArchitectDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            ArchitectDecision::Pending => "Pending",
            ArchitectDecision::Approved => "Approved",
            ArchitectDecision::Rejected => "Rejected",
            ArchitectDecision::Revised => "Revised",
        }
    }
}

/// Structured artifact of one two-phase architect pass.
///
/// `solution_json` is the full solution document as returned by the design
/// phase (see the prompt layer for the schema); `solution_summary` and
/// `approach` are denormalized out of it for list views and follow-up
/// prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectReview {
    pub id: i64,
    pub request_id: i64,
    pub solution_summary: String,
    pub approach: String,
    pub solution_json: String,
    pub estimated_complexity: String,
    pub estimated_effort: String,
    pub files_analyzed: u32,
    pub paths_read: Vec<String>,
    /// Phase A (file selection) token counts.
    pub step1_prompt_tokens: u32,
    pub step1_completion_tokens: u32,
    /// Phase B (solution proposal) token counts.
    pub step2_prompt_tokens: u32,
    pub step2_completion_tokens: u32,
    pub model: String,
    pub duration_ms: u64,
    pub decision: ArchitectDecision,
    pub human_feedback: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ArchitectReview {
    /// Total tokens across both phases, for budget arithmetic.
    pub fn total_tokens(&self) -> u64 {
        u64::from(self.step1_prompt_tokens)
            + u64::from(self.step1_completion_tokens)
            + u64::from(self.step2_prompt_tokens)
            + u64::from(self.step2_completion_tokens)
    }
}

/// Insert payload for [`ArchitectReview`]; decision starts `Pending`.
#[derive(Debug, Clone)]
pub struct NewArchitectReview {
    pub request_id: i64,
    pub solution_summary: String,
    pub approach: String,
    pub solution_json: String,
    pub estimated_complexity: String,
    pub estimated_effort: String,
    pub files_analyzed: u32,
    pub paths_read: Vec<String>,
    pub step1_prompt_tokens: u32,
    pub step1_completion_tokens: u32,
    pub step2_prompt_tokens: u32,
    pub step2_completion_tokens: u32,
    pub model: String,
    pub duration_ms: u64,
}

/// Outcome of an automated PR review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeReviewDecision {
    Approved,
    ChangesRequested,
    Failed,
}

impl CodeReviewDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            CodeReviewDecision::Approved => "Approved",
            CodeReviewDecision::ChangesRequested => "ChangesRequested",
            CodeReviewDecision::Failed => "Failed",
        }
    }
}

/// Structured artifact of one code-review LLM pass over a PR diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReview {
    pub id: i64,
    pub request_id: i64,
    pub pr_number: u64,
    pub decision: CodeReviewDecision,
    pub summary: String,
    pub design_compliance: bool,
    pub design_compliance_notes: String,
    pub security_pass: bool,
    pub security_notes: String,
    pub coding_standards_pass: bool,
    pub coding_standards_notes: String,
    /// 1-10, clamped on write.
    pub quality_score: u8,
    pub files_changed: u32,
    pub lines_added: u32,
    pub lines_removed: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for [`CodeReview`]. Quality score is clamped by the store.
#[derive(Debug, Clone)]
pub struct NewCodeReview {
    pub request_id: i64,
    pub pr_number: u64,
    pub decision: CodeReviewDecision,
    pub summary: String,
    pub design_compliance: bool,
    pub design_compliance_notes: String,
    pub security_pass: bool,
    pub security_notes: String,
    pub coding_standards_pass: bool,
    pub coding_standards_notes: String,
    pub quality_score: i64,
    pub files_changed: u32,
    pub lines_added: u32,
    pub lines_removed: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub model: String,
    pub duration_ms: u64,
}

/// Clamp an LLM-provided score into an inclusive range.
pub(crate) fn clamp_score(value: i64, min: i64, max: i64) -> u8 {
    value.clamp(min, max) as u8
}
