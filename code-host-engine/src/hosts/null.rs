//! Null provider: degraded mode when no host token is configured.
//!
//! Every effect is a logged no-op; every read returns "nothing there". The
//! pipeline keeps running against the store alone and reconciles host state
//! once a real provider is configured.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::HostResult;
use crate::types::*;

#[derive(Debug, Clone, Copy, Default)]
pub struct NullHost;

impl NullHost {
    pub async fn create_issue(&self, repo: &RepoRef, title: &str, _body: &str) -> HostResult<u64> {
        debug!(%repo, %title, "null host: create_issue dropped");
        Ok(0)
    }

    pub async fn update_issue(
        &self,
        repo: &RepoRef,
        issue: u64,
        _title: &str,
        _body: &str,
    ) -> HostResult<()> {
        debug!(%repo, issue, "null host: update_issue dropped");
        Ok(())
    }

    pub async fn close_issue(&self, repo: &RepoRef, issue: u64) -> HostResult<()> {
        debug!(%repo, issue, "null host: close_issue dropped");
        Ok(())
    }

    pub async fn apply_namespaced_label(
        &self,
        repo: &RepoRef,
        issue: u64,
        label: &Label,
    ) -> HostResult<()> {
        debug!(%repo, issue, label = %label.name, "null host: label dropped");
        Ok(())
    }

    pub async fn remove_label(&self, _repo: &RepoRef, _issue: u64, _name: &str) -> HostResult<()> {
        Ok(())
    }

    pub async fn post_issue_comment(
        &self,
        repo: &RepoRef,
        issue: u64,
        _body: &str,
    ) -> HostResult<()> {
        debug!(%repo, issue, "null host: comment dropped");
        Ok(())
    }

    pub async fn assign_issue_to_agent(
        &self,
        repo: &RepoRef,
        issue: u64,
        assignment: &AgentAssignment,
    ) -> HostResult<()> {
        debug!(%repo, issue, agent = %assignment.agent_login, "null host: assignment dropped");
        Ok(())
    }

    pub async fn branch_exists(&self, _repo: &RepoRef, _branch: &str) -> HostResult<bool> {
        Ok(false)
    }

    pub async fn create_branch(
        &self,
        _repo: &RepoRef,
        _branch: &str,
        _from_branch: &str,
    ) -> HostResult<()> {
        Ok(())
    }

    pub async fn delete_branch(&self, _repo: &RepoRef, _branch: &str) -> HostResult<()> {
        Ok(())
    }

    pub async fn commit_files(
        &self,
        _repo: &RepoRef,
        _branch: &str,
        _message: &str,
        _files: &[CommitFile],
    ) -> HostResult<()> {
        Ok(())
    }

    pub async fn list_commits(&self, _repo: &RepoRef, _branch: &str) -> HostResult<Vec<CommitInfo>> {
        Ok(Vec::new())
    }

    pub async fn delete_prefix(
        &self,
        _repo: &RepoRef,
        _branch: &str,
        _prefix: &str,
        _message: &str,
    ) -> HostResult<bool> {
        Ok(false)
    }

    pub async fn find_pr_for_issue(
        &self,
        _repo: &RepoRef,
        _issue: u64,
        _author: &str,
    ) -> HostResult<Option<PullRequestInfo>> {
        Ok(None)
    }

    pub async fn pull_request(&self, repo: &RepoRef, number: u64) -> HostResult<PullRequestInfo> {
        debug!(%repo, number, "null host: synthetic closed PR served");
        Ok(PullRequestInfo {
            number,
            url: String::new(),
            state: PrState::Closed,
            merged: false,
            author: String::new(),
            title: String::new(),
            body: String::new(),
            head_branch: String::new(),
            base_branch: String::new(),
            files_changed: 0,
            additions: 0,
            deletions: 0,
        })
    }

    pub async fn pull_request_diff(&self, _repo: &RepoRef, _number: u64) -> HostResult<String> {
        Ok(String::new())
    }

    pub async fn post_pr_review(
        &self,
        _repo: &RepoRef,
        _number: u64,
        _verdict: PrReviewVerdict,
        _body: &str,
    ) -> HostResult<()> {
        Ok(())
    }

    pub async fn merge_pull_request(
        &self,
        _repo: &RepoRef,
        _number: u64,
        _commit_title: &str,
    ) -> HostResult<bool> {
        Ok(false)
    }

    pub async fn update_pr_branch(&self, _repo: &RepoRef, _number: u64) -> HostResult<()> {
        Ok(())
    }

    pub async fn list_workflow_runs(
        &self,
        _repo: &RepoRef,
        _workflow: &str,
        _since: Option<DateTime<Utc>>,
    ) -> HostResult<Vec<WorkflowRun>> {
        Ok(Vec::new())
    }

    pub async fn rerun_failed_jobs(&self, _repo: &RepoRef, _run_id: u64) -> HostResult<()> {
        Ok(())
    }

    pub async fn dispatch_workflow(
        &self,
        _repo: &RepoRef,
        _workflow: &str,
        _git_ref: &str,
    ) -> HostResult<()> {
        Ok(())
    }

    pub async fn list_tree(&self, _repo: &RepoRef, _branch: &str) -> HostResult<Vec<TreeEntry>> {
        Ok(Vec::new())
    }

    pub async fn file_content(
        &self,
        _repo: &RepoRef,
        _path: &str,
        _git_ref: &str,
    ) -> HostResult<Option<String>> {
        Ok(None)
    }
}
