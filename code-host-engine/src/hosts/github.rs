//! GitHub provider (REST v3) for issues, branches, PRs and workflow runs.
//!
//! Endpoints used (as of 2025):
//! - issues:    POST/PATCH /repos/:o/:r/issues, labels + comments subroutes
//! - git data:  /repos/:o/:r/git/{refs,blobs,trees,commits} (single-commit pushes)
//! - pulls:     /repos/:o/:r/pulls/:n (+ .diff media type, reviews, merge,
//!              update-branch)
//! - actions:   /repos/:o/:r/actions/workflows/:wf/runs, rerun-failed-jobs,
//!              dispatches
//! - contents:  /repos/:o/:r/contents/:path and recursive tree listing

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::errors::{HostResult, ProviderError};
use crate::types::*;

#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    base_api: String, // e.g. "https://api.github.com"
    token: String,
}

impl GitHubClient {
    /// Constructs a GitHub client with a shared reqwest instance and token.
    pub fn new(http: Client, base_api: String, token: String) -> Self {
        Self {
            http,
            base_api: base_api.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, repo: &RepoRef, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.base_api, repo.owner, repo.repo, tail
        )
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .get(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.http
            .post(url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
    }

    /* ------------------------------ issues ------------------------------ */

    pub async fn create_issue(&self, repo: &RepoRef, title: &str, body: &str) -> HostResult<u64> {
        let url = self.url(repo, "issues");
        let resp: GhIssue = self
            .post(&url)
            .json(&json!({ "title": title, "body": body }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(resp.number)
    }

    pub async fn update_issue(
        &self,
        repo: &RepoRef,
        issue: u64,
        title: &str,
        body: &str,
    ) -> HostResult<()> {
        let url = self.url(repo, &format!("issues/{issue}"));
        self.http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "title": title, "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn close_issue(&self, repo: &RepoRef, issue: u64) -> HostResult<()> {
        let url = self.url(repo, &format!("issues/{issue}"));
        self.http
            .patch(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "state": "closed" }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Replaces the namespace: removes every `ns:*` label currently on the
    /// issue, makes sure the label exists repo-side with the requested
    /// color, then adds it.
    pub async fn apply_namespaced_label(
        &self,
        repo: &RepoRef,
        issue: u64,
        label: &Label,
    ) -> HostResult<()> {
        let ns = Label::namespace(&label.name);
        let url = self.url(repo, &format!("issues/{issue}/labels"));
        let current: Vec<GhLabel> = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        for existing in current
            .iter()
            .filter(|l| Label::namespace(&l.name) == ns && l.name != label.name)
        {
            if let Err(e) = self.remove_label(repo, issue, &existing.name).await {
                // Losing a stale label is tolerable; it gets replaced on the
                // next write anyway.
                warn!(label = %existing.name, error = %e, "failed to remove stale label");
            }
        }

        self.ensure_label(repo, label).await?;

        self.post(&url)
            .json(&json!({ "labels": [label.name] }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn remove_label(&self, repo: &RepoRef, issue: u64, name: &str) -> HostResult<()> {
        let url = self.url(
            repo,
            &format!("issues/{issue}/labels/{}", urlencoding::encode(name)),
        );
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        // 404 means the label was already gone.
        if resp.status() != StatusCode::NOT_FOUND {
            resp.error_for_status()?;
        }
        Ok(())
    }

    /// Creates the repo-level label definition, tolerating "already exists".
    async fn ensure_label(&self, repo: &RepoRef, label: &Label) -> HostResult<()> {
        let url = self.url(repo, "labels");
        let resp = self
            .post(&url)
            .json(&json!({ "name": label.name, "color": label.color }))
            .send()
            .await?;
        if resp.status() != StatusCode::UNPROCESSABLE_ENTITY {
            resp.error_for_status()?;
        }
        Ok(())
    }

    pub async fn post_issue_comment(
        &self,
        repo: &RepoRef,
        issue: u64,
        body: &str,
    ) -> HostResult<()> {
        let url = self.url(repo, &format!("issues/{issue}/comments"));
        self.post(&url)
            .json(&json!({ "body": body }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Assignment is modeled as assignee + instruction comment carrying the
    /// base-branch directive; the comment body is the payload the agent
    /// reads.
    pub async fn assign_issue_to_agent(
        &self,
        repo: &RepoRef,
        issue: u64,
        assignment: &AgentAssignment,
    ) -> HostResult<()> {
        let url = self.url(repo, &format!("issues/{issue}/assignees"));
        self.post(&url)
            .json(&json!({ "assignees": [assignment.agent_login] }))
            .send()
            .await?
            .error_for_status()?;

        let body = format!(
            "@{} base-branch: `{}`\n\n{}",
            assignment.agent_login, assignment.base_branch, assignment.instructions
        );
        self.post_issue_comment(repo, issue, &body).await
    }

    /* ----------------------------- branches ----------------------------- */

    pub async fn branch_exists(&self, repo: &RepoRef, branch: &str) -> HostResult<bool> {
        let url = self.url(repo, &format!("git/ref/heads/{branch}"));
        let resp = self.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        resp.error_for_status()?;
        Ok(true)
    }

    pub async fn create_branch(
        &self,
        repo: &RepoRef,
        branch: &str,
        from_branch: &str,
    ) -> HostResult<()> {
        if self.branch_exists(repo, branch).await? {
            debug!(%branch, "branch already exists, skipping create");
            return Ok(());
        }
        let base_sha = self.ref_sha(repo, from_branch).await?;
        let url = self.url(repo, "git/refs");
        self.post(&url)
            .json(&json!({ "ref": format!("refs/heads/{branch}"), "sha": base_sha }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn delete_branch(&self, repo: &RepoRef, branch: &str) -> HostResult<()> {
        let url = self.url(repo, &format!("git/refs/heads/{branch}"));
        let resp = self
            .http
            .delete(&url)
            .bearer_auth(&self.token)
            .send()
            .await?;
        // Already deleted is fine.
        if resp.status() != StatusCode::NOT_FOUND && resp.status() != StatusCode::UNPROCESSABLE_ENTITY
        {
            resp.error_for_status()?;
        }
        Ok(())
    }

    /// Single commit of `files` on `branch` via the git data API:
    /// blobs → tree (on top of the branch head) → commit → ref update.
    pub async fn commit_files(
        &self,
        repo: &RepoRef,
        branch: &str,
        message: &str,
        files: &[CommitFile],
    ) -> HostResult<()> {
        let head_sha = self.ref_sha(repo, branch).await?;

        let commit_url = self.url(repo, &format!("git/commits/{head_sha}"));
        let head_commit: GhCommitObject = self
            .get(&commit_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut tree_entries = Vec::with_capacity(files.len());
        for file in files {
            let blob_url = self.url(repo, "git/blobs");
            let blob: GhSha = self
                .post(&blob_url)
                .json(&json!({
                    "content": BASE64.encode(&file.content),
                    "encoding": "base64",
                }))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            tree_entries.push(json!({
                "path": file.path,
                "mode": "100644",
                "type": "blob",
                "sha": blob.sha,
            }));
        }

        let tree_url = self.url(repo, "git/trees");
        let tree: GhSha = self
            .post(&tree_url)
            .json(&json!({ "base_tree": head_commit.tree.sha, "tree": tree_entries }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let commit_url = self.url(repo, "git/commits");
        let commit: GhSha = self
            .post(&commit_url)
            .json(&json!({ "message": message, "tree": tree.sha, "parents": [head_sha] }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let ref_url = self.url(repo, &format!("git/refs/heads/{branch}"));
        self.http
            .patch(&ref_url)
            .bearer_auth(&self.token)
            .json(&json!({ "sha": commit.sha }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Deletes every blob under `prefix` on `branch` in one commit (tree
    /// entries with a null sha). No-op returning false when nothing
    /// matches.
    pub async fn delete_prefix(
        &self,
        repo: &RepoRef,
        branch: &str,
        prefix: &str,
        message: &str,
    ) -> HostResult<bool> {
        let doomed: Vec<String> = self
            .list_tree(repo, branch)
            .await?
            .into_iter()
            .map(|e| e.path)
            .filter(|p| p.starts_with(prefix))
            .collect();
        if doomed.is_empty() {
            return Ok(false);
        }

        let head_sha = self.ref_sha(repo, branch).await?;
        let commit_url = self.url(repo, &format!("git/commits/{head_sha}"));
        let head_commit: GhCommitObject = self
            .get(&commit_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let tree_entries: Vec<serde_json::Value> = doomed
            .iter()
            .map(|path| {
                json!({ "path": path, "mode": "100644", "type": "blob", "sha": serde_json::Value::Null })
            })
            .collect();

        let tree: GhSha = self
            .post(&self.url(repo, "git/trees"))
            .json(&json!({ "base_tree": head_commit.tree.sha, "tree": tree_entries }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let commit: GhSha = self
            .post(&self.url(repo, "git/commits"))
            .json(&json!({ "message": message, "tree": tree.sha, "parents": [head_sha] }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        self.http
            .patch(&self.url(repo, &format!("git/refs/heads/{branch}")))
            .bearer_auth(&self.token)
            .json(&json!({ "sha": commit.sha }))
            .send()
            .await?
            .error_for_status()?;
        Ok(true)
    }

    pub async fn list_commits(&self, repo: &RepoRef, branch: &str) -> HostResult<Vec<CommitInfo>> {
        let url = self.url(repo, &format!("commits?sha={}&per_page=50", branch));
        let raw: Vec<GhListedCommit> = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(raw
            .into_iter()
            .map(|c| CommitInfo {
                sha: c.sha,
                message: c.commit.message,
            })
            .collect())
    }

    async fn ref_sha(&self, repo: &RepoRef, branch: &str) -> HostResult<String> {
        let url = self.url(repo, &format!("git/ref/heads/{branch}"));
        let r: GhRef = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(r.object.sha)
    }

    /* --------------------------- pull requests --------------------------- */

    pub async fn find_pr_for_issue(
        &self,
        repo: &RepoRef,
        issue: u64,
        author: &str,
    ) -> HostResult<Option<PullRequestInfo>> {
        let url = self.url(repo, "pulls?state=open&per_page=50");
        let raw: Vec<GhPull> = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let needle = format!("#{issue}");
        let hit = raw.into_iter().find(|p| {
            p.user.login == author
                && (p.body.as_deref().unwrap_or("").contains(&needle)
                    || p.title.contains(&needle))
        });

        match hit {
            // The list endpoint omits diff stats; refetch for full metadata.
            Some(p) => Ok(Some(self.pull_request(repo, p.number).await?)),
            None => Ok(None),
        }
    }

    pub async fn pull_request(&self, repo: &RepoRef, number: u64) -> HostResult<PullRequestInfo> {
        let url = self.url(repo, &format!("pulls/{number}"));
        let raw: GhPull = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(normalize_pull(raw))
    }

    pub async fn pull_request_diff(&self, repo: &RepoRef, number: u64) -> HostResult<String> {
        let url = self.url(repo, &format!("pulls/{number}"));
        let text = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github.v3.diff")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }

    pub async fn post_pr_review(
        &self,
        repo: &RepoRef,
        number: u64,
        verdict: PrReviewVerdict,
        body: &str,
    ) -> HostResult<()> {
        let event = match verdict {
            PrReviewVerdict::Approve => "APPROVE",
            PrReviewVerdict::RequestChanges => "REQUEST_CHANGES",
        };
        let url = self.url(repo, &format!("pulls/{number}/reviews"));
        self.post(&url)
            .json(&json!({ "body": body, "event": event }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn merge_pull_request(
        &self,
        repo: &RepoRef,
        number: u64,
        commit_title: &str,
    ) -> HostResult<bool> {
        let url = self.url(repo, &format!("pulls/{number}/merge"));
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "commit_title": commit_title, "merge_method": "squash" }))
            .send()
            .await?;
        // 405/409: not mergeable right now (behind base, checks pending).
        if resp.status() == StatusCode::METHOD_NOT_ALLOWED
            || resp.status() == StatusCode::CONFLICT
        {
            return Ok(false);
        }
        let out: GhMergeResult = resp.error_for_status()?.json().await?;
        Ok(out.merged)
    }

    pub async fn update_pr_branch(&self, repo: &RepoRef, number: u64) -> HostResult<()> {
        let url = self.url(repo, &format!("pulls/{number}/update-branch"));
        let resp = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;
        // 422: already up to date.
        if resp.status() != StatusCode::UNPROCESSABLE_ENTITY {
            resp.error_for_status()?;
        }
        Ok(())
    }

    /* --------------------------- workflow runs --------------------------- */

    pub async fn list_workflow_runs(
        &self,
        repo: &RepoRef,
        workflow: &str,
        since: Option<DateTime<Utc>>,
    ) -> HostResult<Vec<WorkflowRun>> {
        let url = self.url(
            repo,
            &format!(
                "actions/workflows/{}/runs?per_page=20",
                urlencoding::encode(workflow)
            ),
        );
        let raw: GhRunsResponse = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut runs: Vec<WorkflowRun> = raw
            .workflow_runs
            .into_iter()
            .map(normalize_run)
            .filter(|r| since.is_none_or(|s| r.created_at >= s))
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.created_at));
        Ok(runs)
    }

    pub async fn rerun_failed_jobs(&self, repo: &RepoRef, run_id: u64) -> HostResult<()> {
        let url = self.url(repo, &format!("actions/runs/{run_id}/rerun-failed-jobs"));
        self.post(&url).send().await?.error_for_status()?;
        Ok(())
    }

    pub async fn dispatch_workflow(
        &self,
        repo: &RepoRef,
        workflow: &str,
        git_ref: &str,
    ) -> HostResult<()> {
        let url = self.url(
            repo,
            &format!(
                "actions/workflows/{}/dispatches",
                urlencoding::encode(workflow)
            ),
        );
        self.post(&url)
            .json(&json!({ "ref": git_ref }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /* -------------------------- repository reads ------------------------- */

    pub async fn list_tree(&self, repo: &RepoRef, branch: &str) -> HostResult<Vec<TreeEntry>> {
        let url = self.url(repo, &format!("git/trees/{branch}?recursive=1"));
        let raw: GhTree = self
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if raw.truncated {
            warn!(repo = %repo, "tree listing truncated by provider");
        }
        Ok(raw
            .tree
            .into_iter()
            .filter(|e| e.kind == "blob")
            .map(|e| TreeEntry {
                path: e.path,
                size: e.size.unwrap_or(0),
            })
            .collect())
    }

    pub async fn file_content(
        &self,
        repo: &RepoRef,
        path: &str,
        git_ref: &str,
    ) -> HostResult<Option<String>> {
        let encoded: String = path
            .split('/')
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = self.url(repo, &format!("contents/{encoded}?ref={git_ref}"));
        let resp = self.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let raw: GhContent = resp.error_for_status()?.json().await?;

        let bytes = BASE64
            .decode(raw.content.replace(['\n', '\r'], ""))
            .map_err(|e| ProviderError::InvalidResponse(format!("bad base64 content: {e}")))?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }
}

fn normalize_pull(raw: GhPull) -> PullRequestInfo {
    PullRequestInfo {
        number: raw.number,
        url: raw.html_url,
        state: if raw.state == "open" {
            PrState::Open
        } else {
            PrState::Closed
        },
        merged: raw.merged.unwrap_or(raw.merged_at.is_some()),
        author: raw.user.login,
        title: raw.title,
        body: raw.body.unwrap_or_default(),
        head_branch: raw.head.r#ref,
        base_branch: raw.base.r#ref,
        files_changed: raw.changed_files.unwrap_or(0),
        additions: raw.additions.unwrap_or(0),
        deletions: raw.deletions.unwrap_or(0),
    }
}

fn normalize_run(raw: GhRun) -> WorkflowRun {
    let status = match raw.status.as_str() {
        "queued" | "waiting" | "pending" | "requested" => WorkflowRunStatus::Queued,
        "in_progress" => WorkflowRunStatus::InProgress,
        _ => WorkflowRunStatus::Completed,
    };
    let conclusion = raw.conclusion.as_deref().map(|c| match c {
        "success" => WorkflowConclusion::Success,
        "failure" | "timed_out" | "startup_failure" => WorkflowConclusion::Failure,
        "cancelled" => WorkflowConclusion::Cancelled,
        _ => WorkflowConclusion::Other,
    });
    WorkflowRun {
        id: raw.id,
        name: raw.name,
        head_branch: raw.head_branch,
        status,
        conclusion,
        created_at: raw.created_at,
    }
}

/// --- GitHub response shapes (subset of fields we actually use) ---

#[derive(Debug, Deserialize)]
struct GhIssue {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct GhLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct GhUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct GhBranchRef {
    r#ref: String,
}

#[derive(Debug, Deserialize)]
struct GhPull {
    number: u64,
    html_url: String,
    state: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: GhUser,
    head: GhBranchRef,
    base: GhBranchRef,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    changed_files: Option<u32>,
    #[serde(default)]
    additions: Option<u32>,
    #[serde(default)]
    deletions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GhMergeResult {
    #[serde(default)]
    merged: bool,
}

#[derive(Debug, Deserialize)]
struct GhRunsResponse {
    workflow_runs: Vec<GhRun>,
}

#[derive(Debug, Deserialize)]
struct GhRun {
    id: u64,
    name: String,
    head_branch: String,
    status: String,
    #[serde(default)]
    conclusion: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct GhTree {
    #[serde(default)]
    truncated: bool,
    tree: Vec<GhTreeEntry>,
}

#[derive(Debug, Deserialize)]
struct GhTreeEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct GhContent {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GhRef {
    object: GhRefObject,
}

#[derive(Debug, Deserialize)]
struct GhRefObject {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhCommitObject {
    tree: GhShaOnly,
}

#[derive(Debug, Deserialize)]
struct GhShaOnly {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhSha {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct GhListedCommit {
    sha: String,
    commit: GhCommitMessage,
}

#[derive(Debug, Deserialize)]
struct GhCommitMessage {
    message: String,
}
