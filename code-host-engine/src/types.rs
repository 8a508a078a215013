//! Provider-agnostic data model for issues, pull requests, branches and
//! workflow runs.
//!
//! These types are the normalized output of the host layer; the pipeline
//! never sees provider response shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository reference: `owner/repo`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

/// A colored label. `color` is a hex string without `#`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub color: String,
}

impl Label {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }

    /// Namespace prefix up to the first `:` (e.g. "agent" for
    /// "agent:approved"); labels with no colon have an empty namespace.
    pub fn namespace(name: &str) -> &str {
        name.split_once(':').map(|(ns, _)| ns).unwrap_or("")
    }
}

/// One commit on a branch or PR.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub message: String,
}

/// A file to include in a single commit.
#[derive(Debug, Clone)]
pub struct CommitFile {
    /// Repo-relative path.
    pub path: String,
    pub content: Vec<u8>,
}

/// Open/closed state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrState {
    Open,
    Closed,
}

/// Normalized pull-request metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestInfo {
    pub number: u64,
    pub url: String,
    pub state: PrState,
    pub merged: bool,
    pub author: String,
    pub title: String,
    pub body: String,
    pub head_branch: String,
    pub base_branch: String,
    pub files_changed: u32,
    pub additions: u32,
    pub deletions: u32,
}

/// Review verdict posted on a PR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrReviewVerdict {
    Approve,
    RequestChanges,
}

/// Status of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowRunStatus {
    Queued,
    InProgress,
    Completed,
}

/// Conclusion of a completed workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowConclusion {
    Success,
    Failure,
    Cancelled,
    Other,
}

/// Normalized workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: u64,
    /// Workflow name or file (e.g. "deploy-api").
    pub name: String,
    pub head_branch: String,
    pub status: WorkflowRunStatus,
    pub conclusion: Option<WorkflowConclusion>,
    pub created_at: DateTime<Utc>,
}

/// Entry of a recursive repository tree listing (blobs only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    pub size: u64,
}

/// Payload for handing an issue to the coding-agent principal.
#[derive(Debug, Clone)]
pub struct AgentAssignment {
    /// Login of the coding-agent principal.
    pub agent_login: String,
    /// Markdown instruction document.
    pub instructions: String,
    /// Branch the agent should base its work on.
    pub base_branch: String,
}

#[cfg(test)]
mod tests {
    use super::Label;

    #[test]
    fn label_namespace_splits_on_first_colon() {
        assert_eq!(Label::namespace("agent:approved"), "agent");
        assert_eq!(Label::namespace("review:changes-requested"), "review");
        assert_eq!(Label::namespace("plain"), "");
    }
}
