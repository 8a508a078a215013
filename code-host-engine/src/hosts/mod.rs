//! Provider facade w/o async-trait or dynamic trait objects.
//!
//! `CodeHostClient` is an enum over concrete providers:
//! - `GitHub`: the real REST client,
//! - `InMemory`: records effects and replays scripted PR/workflow state
//!   (tests, dry-run mode),
//! - `Null`: logs and no-ops (degraded mode when no token is configured).

pub mod github;
pub mod memory;
pub mod null;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::errors::HostResult;
use crate::types::*;

/// Runtime configuration for the GitHub provider.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// API base, e.g. "https://api.github.com".
    pub base_api: String,
    /// Access token (PAT or app token).
    pub token: String,
}

/// Concrete host client (enum-dispatch).
#[derive(Debug, Clone)]
pub enum CodeHostClient {
    GitHub(github::GitHubClient),
    InMemory(Arc<memory::InMemoryHost>),
    Null(null::NullHost),
}

impl CodeHostClient {
    /// Constructs the GitHub client from config.
    pub fn from_config(cfg: HostConfig) -> HostResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent("devflow-backend/0.1")
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self::GitHub(github::GitHubClient::new(
            client,
            cfg.base_api,
            cfg.token,
        )))
    }

    /// Degraded-mode client: every effect is a logged no-op.
    pub fn null() -> Self {
        Self::Null(null::NullHost)
    }

    /// In-memory client sharing state with `host` (tests, dry-run).
    pub fn in_memory(host: Arc<memory::InMemoryHost>) -> Self {
        Self::InMemory(host)
    }

    /* ------------------------------ issues ------------------------------ */

    pub async fn create_issue(&self, repo: &RepoRef, title: &str, body: &str) -> HostResult<u64> {
        match self {
            Self::GitHub(c) => c.create_issue(repo, title, body).await,
            Self::InMemory(c) => c.create_issue(repo, title, body).await,
            Self::Null(c) => c.create_issue(repo, title, body).await,
        }
    }

    pub async fn update_issue(
        &self,
        repo: &RepoRef,
        issue: u64,
        title: &str,
        body: &str,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.update_issue(repo, issue, title, body).await,
            Self::InMemory(c) => c.update_issue(repo, issue, title, body).await,
            Self::Null(c) => c.update_issue(repo, issue, title, body).await,
        }
    }

    pub async fn close_issue(&self, repo: &RepoRef, issue: u64) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.close_issue(repo, issue).await,
            Self::InMemory(c) => c.close_issue(repo, issue).await,
            Self::Null(c) => c.close_issue(repo, issue).await,
        }
    }

    /// Applies `label`, first removing every other label of the same
    /// namespace from the issue (idempotent label discipline).
    pub async fn apply_namespaced_label(
        &self,
        repo: &RepoRef,
        issue: u64,
        label: &Label,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.apply_namespaced_label(repo, issue, label).await,
            Self::InMemory(c) => c.apply_namespaced_label(repo, issue, label).await,
            Self::Null(c) => c.apply_namespaced_label(repo, issue, label).await,
        }
    }

    pub async fn remove_label(&self, repo: &RepoRef, issue: u64, name: &str) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.remove_label(repo, issue, name).await,
            Self::InMemory(c) => c.remove_label(repo, issue, name).await,
            Self::Null(c) => c.remove_label(repo, issue, name).await,
        }
    }

    /// Posts a comment. Fire-and-forget semantics: duplicate comments are
    /// tolerated by the pipeline.
    pub async fn post_issue_comment(
        &self,
        repo: &RepoRef,
        issue: u64,
        body: &str,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.post_issue_comment(repo, issue, body).await,
            Self::InMemory(c) => c.post_issue_comment(repo, issue, body).await,
            Self::Null(c) => c.post_issue_comment(repo, issue, body).await,
        }
    }

    /// Hands the issue to the coding-agent principal with an instruction
    /// payload and base-branch selector.
    pub async fn assign_issue_to_agent(
        &self,
        repo: &RepoRef,
        issue: u64,
        assignment: &AgentAssignment,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.assign_issue_to_agent(repo, issue, assignment).await,
            Self::InMemory(c) => c.assign_issue_to_agent(repo, issue, assignment).await,
            Self::Null(c) => c.assign_issue_to_agent(repo, issue, assignment).await,
        }
    }

    /* ----------------------------- branches ----------------------------- */

    pub async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> HostResult<bool> {
        match self {
            Self::GitHub(c) => c.branch_exists(repo, branch).await,
            Self::InMemory(c) => c.branch_exists(repo, branch).await,
            Self::Null(c) => c.branch_exists(repo, branch).await,
        }
    }

    /// Creates `branch` off `from_branch`; no-op when it already exists.
    pub async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        from_branch: &str,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.create_branch(repo, branch, from_branch).await,
            Self::InMemory(c) => c.create_branch(repo, branch, from_branch).await,
            Self::Null(c) => c.create_branch(repo, branch, from_branch).await,
        }
    }

    pub async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.delete_branch(repo, branch).await,
            Self::InMemory(c) => c.delete_branch(repo, branch).await,
            Self::Null(c) => c.delete_branch(repo, branch).await,
        }
    }

    /// Commits `files` to `branch` as a single commit.
    pub async fn commit_files(
        &self,
        repo: &RepoRef,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.commit_files(repo, branch, message, files).await,
            Self::InMemory(c) => c.commit_files(repo, branch, message, files).await,
            Self::Null(c) => c.commit_files(repo, branch, message, files).await,
        }
    }

    pub async fn list_commits(&self, repo: &RepoRef, branch: &str) -> HostResult<Vec<CommitInfo>> {
        match self {
            Self::GitHub(c) => c.list_commits(repo, branch).await,
            Self::InMemory(c) => c.list_commits(repo, branch).await,
            Self::Null(c) => c.list_commits(repo, branch).await,
        }
    }

    /// Commits a deletion of every path under `prefix` on `branch`. Returns
    /// true when something was deleted.
    pub async fn delete_prefix(
        &self,
        repo: &RepoRef,
        branch: &str,
        prefix: &str,
        message: &str,
    ) -> HostResult<bool> {
        match self {
            Self::GitHub(c) => c.delete_prefix(repo, branch, prefix, message).await,
            Self::InMemory(c) => c.delete_prefix(repo, branch, prefix, message).await,
            Self::Null(c) => c.delete_prefix(repo, branch, prefix, message).await,
        }
    }

    /* --------------------------- pull requests --------------------------- */

    /// Finds an open PR authored by `author` that references `#issue`.
    pub async fn find_pr_for_issue(
        &self,
        repo: &RepoRef,
        issue: u64,
        author: &str,
    ) -> HostResult<Option<PullRequestInfo>> {
        match self {
            Self::GitHub(c) => c.find_pr_for_issue(repo, issue, author).await,
            Self::InMemory(c) => c.find_pr_for_issue(repo, issue, author).await,
            Self::Null(c) => c.find_pr_for_issue(repo, issue, author).await,
        }
    }

    pub async fn pull_request(&self, repo: &RepoRef, number: u64) -> HostResult<PullRequestInfo> {
        match self {
            Self::GitHub(c) => c.pull_request(repo, number).await,
            Self::InMemory(c) => c.pull_request(repo, number).await,
            Self::Null(c) => c.pull_request(repo, number).await,
        }
    }

    /// Unified diff of the PR.
    pub async fn pull_request_diff(&self, repo: &RepoRef, number: u64) -> HostResult<String> {
        match self {
            Self::GitHub(c) => c.pull_request_diff(repo, number).await,
            Self::InMemory(c) => c.pull_request_diff(repo, number).await,
            Self::Null(c) => c.pull_request_diff(repo, number).await,
        }
    }

    pub async fn post_pr_review(
        &self,
        repo: &RepoRef,
        number: u64,
        verdict: PrReviewVerdict,
        body: &str,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.post_pr_review(repo, number, verdict, body).await,
            Self::InMemory(c) => c.post_pr_review(repo, number, verdict, body).await,
            Self::Null(c) => c.post_pr_review(repo, number, verdict, body).await,
        }
    }

    /// Merges the PR with a constructed commit title. Returns true when the
    /// provider confirms the merge.
    pub async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        commit_title: &str,
    ) -> HostResult<bool> {
        match self {
            Self::GitHub(c) => c.merge_pull_request(repo, number, commit_title).await,
            Self::InMemory(c) => c.merge_pull_request(repo, number, commit_title).await,
            Self::Null(c) => c.merge_pull_request(repo, number, commit_title).await,
        }
    }

    /// Refreshes a non-fast-forwardable PR branch from its base.
    pub async fn update_pr_branch(&self, repo: &RepoRef, number: u64) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.update_pr_branch(repo, number).await,
            Self::InMemory(c) => c.update_pr_branch(repo, number).await,
            Self::Null(c) => c.update_pr_branch(repo, number).await,
        }
    }

    /* --------------------------- workflow runs --------------------------- */

    /// Recent runs of the named workflow, newest first.
    pub async fn list_workflow_runs(
        &self,
        repo: &RepoRef,
        workflow: &str,
        since: Option<DateTime<Utc>>,
    ) -> HostResult<Vec<WorkflowRun>> {
        match self {
            Self::GitHub(c) => c.list_workflow_runs(repo, workflow, since).await,
            Self::InMemory(c) => c.list_workflow_runs(repo, workflow, since).await,
            Self::Null(c) => c.list_workflow_runs(repo, workflow, since).await,
        }
    }

    pub async fn rerun_failed_jobs(&self, repo: &RepoRef, run_id: u64) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.rerun_failed_jobs(repo, run_id).await,
            Self::InMemory(c) => c.rerun_failed_jobs(repo, run_id).await,
            Self::Null(c) => c.rerun_failed_jobs(repo, run_id).await,
        }
    }

    pub async fn dispatch_workflow(
        &self,
        repo: &RepoRef,
        workflow: &str,
        git_ref: &str,
    ) -> HostResult<()> {
        match self {
            Self::GitHub(c) => c.dispatch_workflow(repo, workflow, git_ref).await,
            Self::InMemory(c) => c.dispatch_workflow(repo, workflow, git_ref).await,
            Self::Null(c) => c.dispatch_workflow(repo, workflow, git_ref).await,
        }
    }

    /* -------------------------- repository reads ------------------------- */

    /// Recursive blob listing of `branch`.
    pub async fn list_tree(&self, repo: &RepoRef, branch: &str) -> HostResult<Vec<TreeEntry>> {
        match self {
            Self::GitHub(c) => c.list_tree(repo, branch).await,
            Self::InMemory(c) => c.list_tree(repo, branch).await,
            Self::Null(c) => c.list_tree(repo, branch).await,
        }
    }

    /// File text at `git_ref`; `Ok(None)` when the path does not exist.
    pub async fn file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Option<String>> {
        match self {
            Self::GitHub(c) => c.file_content(repo, path, git_ref).await,
            Self::InMemory(c) => c.file_content(repo, path, git_ref).await,
            Self::Null(c) => c.file_content(repo, path, git_ref).await,
        }
    }
}
