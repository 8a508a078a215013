//! In-memory provider.
//!
//! Records every effect and serves scripted repository/PR/workflow state.
//! Backs the binary's dry-run mode and the integration tests: a scenario
//! scripts the tree, files, PRs and workflow runs it needs, then asserts on
//! the recorded labels/comments/assignments afterwards.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::{HostError, HostResult};
use crate::types::*;

#[derive(Debug, Default)]
struct IssueRecord {
    title: String,
    body: String,
    labels: Vec<Label>,
    comments: Vec<String>,
    assignees: Vec<String>,
    closed: bool,
}

#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub message: String,
    pub paths: Vec<String>,
}

#[derive(Debug, Default)]
struct HostState {
    next_issue: u64,
    next_run_id: u64,
    issues: HashMap<u64, IssueRecord>,
    assignments: Vec<(u64, AgentAssignment)>,
    branches: HashMap<String, Vec<CommitRecord>>,
    prs: HashMap<u64, PullRequestInfo>,
    diffs: HashMap<u64, String>,
    pr_reviews: Vec<(u64, PrReviewVerdict, String)>,
    runs: Vec<WorkflowRun>,
    tree: Vec<TreeEntry>,
    files: HashMap<String, String>,
    update_branch_calls: Vec<u64>,
    rerun_calls: Vec<u64>,
    dispatches: Vec<(String, String)>,
}

/// Scripted, effect-recording host. Share via `Arc`.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /* --------------------------- script surface -------------------------- */

    /// Registers a branch with no commits (the "base branch").
    pub fn script_branch(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .branches
            .entry(name.to_string())
            .or_default();
    }

    /// Scripts the recursive tree listing served by `list_tree`.
    pub fn script_tree(&self, entries: Vec<TreeEntry>) {
        self.state.lock().unwrap().tree = entries;
    }

    /// Scripts one file body served by `file_content`.
    pub fn script_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(path.to_string(), content.to_string());
    }

    /// Opens a scripted PR (what the coding agent would push).
    pub fn script_pr(&self, pr: PullRequestInfo, diff: &str) {
        let mut g = self.state.lock().unwrap();
        g.diffs.insert(pr.number, diff.to_string());
        g.branches.entry(pr.head_branch.clone()).or_default();
        g.prs.insert(pr.number, pr);
    }

    /// Closes a scripted PR without merging it.
    pub fn script_close_pr(&self, number: u64) {
        if let Some(pr) = self.state.lock().unwrap().prs.get_mut(&number) {
            pr.state = PrState::Closed;
            pr.merged = false;
        }
    }

    /// Appends a workflow run and returns its id.
    pub fn script_run(
        &self,
        name: &str,
        branch: &str,
        status: WorkflowRunStatus,
        conclusion: Option<WorkflowConclusion>,
    ) -> u64 {
        let mut g = self.state.lock().unwrap();
        g.next_run_id += 1;
        let id = g.next_run_id;
        g.runs.push(WorkflowRun {
            id,
            name: name.to_string(),
            head_branch: branch.to_string(),
            status,
            conclusion,
            created_at: Utc::now(),
        });
        id
    }

    /// Flips an existing run's status/conclusion in place.
    pub fn script_run_result(
        &self,
        run_id: u64,
        status: WorkflowRunStatus,
        conclusion: Option<WorkflowConclusion>,
    ) {
        let mut g = self.state.lock().unwrap();
        if let Some(run) = g.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = status;
            run.conclusion = conclusion;
        }
    }

    /* ------------------------- inspection surface ------------------------ */

    pub fn labels_on(&self, issue: u64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&issue)
            .map(|i| i.labels.iter().map(|l| l.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn comments_on(&self, issue: u64) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .issues
            .get(&issue)
            .map(|i| i.comments.clone())
            .unwrap_or_default()
    }

    pub fn assignments(&self) -> Vec<(u64, AgentAssignment)> {
        self.state.lock().unwrap().assignments.clone()
    }

    pub fn pr_reviews(&self) -> Vec<(u64, PrReviewVerdict, String)> {
        self.state.lock().unwrap().pr_reviews.clone()
    }

    pub fn branch_names(&self) -> Vec<String> {
        self.state.lock().unwrap().branches.keys().cloned().collect()
    }

    pub fn commits_on(&self, branch: &str) -> Vec<CommitRecord> {
        self.state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .cloned()
            .unwrap_or_default()
    }

    pub fn dispatched_workflows(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().dispatches.clone()
    }

    pub fn rerun_calls(&self) -> Vec<u64> {
        self.state.lock().unwrap().rerun_calls.clone()
    }

    /* ---------------------------- host surface --------------------------- */

    pub async fn create_issue(&self, _repo: &RepoRef, title: &str, body: &str) -> HostResult<u64> {
        let mut g = self.state.lock().unwrap();
        g.next_issue += 1;
        let n = g.next_issue;
        g.issues.insert(n, IssueRecord {
            title: title.to_string(),
            body: body.to_string(),
            ..IssueRecord::default()
        });
        Ok(n)
    }

    pub async fn update_issue(
        &self,
        _repo: &RepoRef,
        issue: u64,
        title: &str,
        body: &str,
    ) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        let rec = g.issues.entry(issue).or_default();
        rec.title = title.to_string();
        rec.body = body.to_string();
        Ok(())
    }

    pub async fn close_issue(&self, _repo: &RepoRef, issue: u64) -> HostResult<()> {
        self.state
            .lock()
            .unwrap()
            .issues
            .entry(issue)
            .or_default()
            .closed = true;
        Ok(())
    }

    pub async fn apply_namespaced_label(
        &self,
        _repo: &RepoRef,
        issue: u64,
        label: &Label,
    ) -> HostResult<()> {
        let ns = Label::namespace(&label.name).to_string();
        let mut g = self.state.lock().unwrap();
        let rec = g.issues.entry(issue).or_default();
        rec.labels.retain(|l| Label::namespace(&l.name) != ns);
        rec.labels.push(label.clone());
        debug!(issue, label = %label.name, "in-memory label applied");
        Ok(())
    }

    pub async fn remove_label(&self, _repo: &RepoRef, issue: u64, name: &str) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        if let Some(rec) = g.issues.get_mut(&issue) {
            rec.labels.retain(|l| l.name != name);
        }
        Ok(())
    }

    pub async fn post_issue_comment(
        &self,
        _repo: &RepoRef,
        issue: u64,
        body: &str,
    ) -> HostResult<()> {
        self.state
            .lock()
            .unwrap()
            .issues
            .entry(issue)
            .or_default()
            .comments
            .push(body.to_string());
        Ok(())
    }

    pub async fn assign_issue_to_agent(
        &self,
        _repo: &RepoRef,
        issue: u64,
        assignment: &AgentAssignment,
    ) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        g.issues
            .entry(issue)
            .or_default()
            .assignees
            .push(assignment.agent_login.clone());
        g.assignments.push((issue, assignment.clone()));
        Ok(())
    }

    pub async fn branch_exists(&self, _repo: &RepoRef, branch: &str) -> HostResult<bool> {
        Ok(self.state.lock().unwrap().branches.contains_key(branch))
    }

    pub async fn create_branch(
        &self,
        _repo: &RepoRef,
        branch: &str,
        from_branch: &str,
    ) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        if !g.branches.contains_key(from_branch) {
            return Err(HostError::Validation(format!(
                "base branch {from_branch} does not exist"
            )));
        }
        g.branches.entry(branch.to_string()).or_default();
        Ok(())
    }

    pub async fn delete_branch(&self, _repo: &RepoRef, branch: &str) -> HostResult<()> {
        self.state.lock().unwrap().branches.remove(branch);
        Ok(())
    }

    pub async fn commit_files(
        &self,
        _repo: &RepoRef,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        let Some(commits) = g.branches.get_mut(branch) else {
            return Err(HostError::Validation(format!(
                "branch {branch} does not exist"
            )));
        };
        commits.push(CommitRecord {
            message: message.to_string(),
            paths: files.iter().map(|f| f.path.clone()).collect(),
        });
        Ok(())
    }

    pub async fn delete_prefix(
        &self,
        _repo: &RepoRef,
        branch: &str,
        prefix: &str,
        message: &str,
    ) -> HostResult<bool> {
        let mut g = self.state.lock().unwrap();
        let removed: Vec<String> = g
            .tree
            .iter()
            .map(|e| e.path.clone())
            .filter(|p| p.starts_with(prefix))
            .collect();
        g.tree.retain(|e| !e.path.starts_with(prefix));
        if let Some(commits) = g.branches.get_mut(branch) {
            commits.push(CommitRecord {
                message: message.to_string(),
                paths: removed.clone(),
            });
        }
        Ok(!removed.is_empty())
    }

    pub async fn list_commits(&self, _repo: &RepoRef, branch: &str) -> HostResult<Vec<CommitInfo>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .branches
            .get(branch)
            .map(|commits| {
                commits
                    .iter()
                    .enumerate()
                    .map(|(i, c)| CommitInfo {
                        sha: format!("{branch}-{i}"),
                        message: c.message.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn find_pr_for_issue(
        &self,
        _repo: &RepoRef,
        issue: u64,
        author: &str,
    ) -> HostResult<Option<PullRequestInfo>> {
        let needle = format!("#{issue}");
        Ok(self
            .state
            .lock()
            .unwrap()
            .prs
            .values()
            .find(|p| {
                p.state == PrState::Open
                    && p.author == author
                    && (p.body.contains(&needle) || p.title.contains(&needle))
            })
            .cloned())
    }

    pub async fn pull_request(&self, _repo: &RepoRef, number: u64) -> HostResult<PullRequestInfo> {
        self.state
            .lock()
            .unwrap()
            .prs
            .get(&number)
            .cloned()
            .ok_or_else(|| HostError::Validation(format!("unknown pr {number}")))
    }

    pub async fn pull_request_diff(&self, _repo: &RepoRef, number: u64) -> HostResult<String> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .diffs
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    pub async fn post_pr_review(
        &self,
        _repo: &RepoRef,
        number: u64,
        verdict: PrReviewVerdict,
        body: &str,
    ) -> HostResult<()> {
        self.state
            .lock()
            .unwrap()
            .pr_reviews
            .push((number, verdict, body.to_string()));
        Ok(())
    }

    pub async fn merge_pull_request(
        &self,
        _repo: &RepoRef,
        number: u64,
        _commit_title: &str,
    ) -> HostResult<bool> {
        let mut g = self.state.lock().unwrap();
        match g.prs.get_mut(&number) {
            Some(pr) if pr.state == PrState::Open => {
                pr.merged = true;
                pr.state = PrState::Closed;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(HostError::Validation(format!("unknown pr {number}"))),
        }
    }

    pub async fn update_pr_branch(&self, _repo: &RepoRef, number: u64) -> HostResult<()> {
        self.state.lock().unwrap().update_branch_calls.push(number);
        Ok(())
    }

    pub async fn list_workflow_runs(
        &self,
        _repo: &RepoRef,
        workflow: &str,
        since: Option<DateTime<Utc>>,
    ) -> HostResult<Vec<WorkflowRun>> {
        let stem = workflow.trim_end_matches(".yml").trim_end_matches(".yaml");
        let mut runs: Vec<WorkflowRun> = self
            .state
            .lock()
            .unwrap()
            .runs
            .iter()
            .filter(|r| r.name == workflow || r.name == stem)
            .filter(|r| since.is_none_or(|s| r.created_at >= s))
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        Ok(runs)
    }

    pub async fn rerun_failed_jobs(&self, _repo: &RepoRef, run_id: u64) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        g.rerun_calls.push(run_id);
        if let Some(run) = g.runs.iter_mut().find(|r| r.id == run_id) {
            run.status = WorkflowRunStatus::InProgress;
            run.conclusion = None;
        }
        Ok(())
    }

    pub async fn dispatch_workflow(
        &self,
        _repo: &RepoRef,
        workflow: &str,
        git_ref: &str,
    ) -> HostResult<()> {
        let mut g = self.state.lock().unwrap();
        g.dispatches
            .push((workflow.to_string(), git_ref.to_string()));
        g.next_run_id += 1;
        let id = g.next_run_id;
        g.runs.push(WorkflowRun {
            id,
            name: workflow.trim_end_matches(".yml").to_string(),
            head_branch: git_ref.to_string(),
            status: WorkflowRunStatus::InProgress,
            conclusion: None,
            created_at: Utc::now(),
        });
        Ok(())
    }

    pub async fn list_tree(&self, _repo: &RepoRef, _branch: &str) -> HostResult<Vec<TreeEntry>> {
        Ok(self.state.lock().unwrap().tree.clone())
    }

    pub async fn file_content(
        &self,
        _repo: &RepoRef,
        path: &str,
        _git_ref: &str,
    ) -> HostResult<Option<String>> {
        Ok(self.state.lock().unwrap().files.get(path).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> RepoRef {
        RepoRef::new("acme", "widgets")
    }

    #[tokio::test]
    async fn namespaced_label_replaces_same_namespace_only() {
        let host = InMemoryHost::new();
        host.apply_namespaced_label(&repo(), 7, &Label::new("agent:needs-info", "bf8700"))
            .await
            .unwrap();
        host.apply_namespaced_label(&repo(), 7, &Label::new("review:approved", "2da44e"))
            .await
            .unwrap();
        host.apply_namespaced_label(&repo(), 7, &Label::new("agent:approved", "2da44e"))
            .await
            .unwrap();

        let labels = host.labels_on(7);
        assert!(labels.contains(&"agent:approved".to_string()));
        assert!(labels.contains(&"review:approved".to_string()));
        assert!(!labels.contains(&"agent:needs-info".to_string()));
    }

    #[tokio::test]
    async fn branch_create_is_idempotent_and_checked() {
        let host = InMemoryHost::new();
        host.script_branch("main");
        host.create_branch(&repo(), "feature/x", "main").await.unwrap();
        host.create_branch(&repo(), "feature/x", "main").await.unwrap();
        assert!(host.branch_exists(&repo(), "feature/x").await.unwrap());
        assert!(
            host.create_branch(&repo(), "feature/y", "missing")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn merge_flips_pr_to_merged_once() {
        let host = InMemoryHost::new();
        host.script_branch("main");
        host.script_pr(
            PullRequestInfo {
                number: 27,
                url: "http://example/pr/27".into(),
                state: PrState::Open,
                merged: false,
                author: "copilot".into(),
                title: "Fix #1".into(),
                body: "Closes #1".into(),
                head_branch: "copilot/fix-1".into(),
                base_branch: "main".into(),
                files_changed: 2,
                additions: 10,
                deletions: 3,
            },
            "diff --git a/x b/x",
        );
        assert!(host.merge_pull_request(&repo(), 27, "merge").await.unwrap());
        assert!(!host.merge_pull_request(&repo(), 27, "merge").await.unwrap());
        let pr = host.pull_request(&repo(), 27).await.unwrap();
        assert!(pr.merged);
        assert_eq!(pr.state, PrState::Closed);
    }
}
