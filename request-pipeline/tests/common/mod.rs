//! Shared harness: in-memory store, scripted LLM, in-memory code host.

use std::sync::Arc;

use tokio::sync::watch;

use ai_llm_service::{ChatClient, ScriptedService};
use code_host_engine::{CodeHostClient, InMemoryHost, PrState, PullRequestInfo, TreeEntry};
use request_pipeline::PipelineContext;
use request_pipeline::codebase::CodebaseCache;
use request_pipeline::config::{PipelineConfig, SharedConfig};
use request_pipeline::refdocs::RefDocStore;
use request_store::{
    BugDetails, NewProject, NewRequest, Priority, Project, Request, RequestStore, RequestType,
};

pub struct Harness {
    pub store: RequestStore,
    pub host: Arc<InMemoryHost>,
    pub llm: Arc<ScriptedService>,
    pub ctx: PipelineContext,
    // Kept alive so the shutdown channel stays open for the whole test.
    pub shutdown: watch::Sender<bool>,
}

pub fn harness(cfg: PipelineConfig) -> Harness {
    let store = RequestStore::new();
    let host_state = Arc::new(InMemoryHost::new());
    host_state.script_branch("main");
    let host = Arc::new(CodeHostClient::in_memory(host_state.clone()));
    let llm = Arc::new(ScriptedService::new());
    let chat = Arc::new(ChatClient::scripted(llm.clone()));
    let (shutdown, ctx) = PipelineContext::new(
        store.clone(),
        host,
        Some(chat),
        SharedConfig::new(cfg),
        Arc::new(RefDocStore::new(None, None)),
        Arc::new(CodebaseCache::new()),
    );
    Harness {
        store,
        host: host_state,
        llm,
        ctx,
        shutdown,
    }
}

pub async fn seed_project(h: &Harness) -> Project {
    h.store
        .insert_project(NewProject {
            owner: "acme".into(),
            repo: "widgets".into(),
            display_name: "Widgets".into(),
        })
        .await
}

pub async fn seed_feature(h: &Harness, project_id: i64, issue: u64) -> Request {
    h.store
        .insert_request(NewRequest {
            project_id,
            title: "Add search".into(),
            description: "Full-text search across widgets".into(),
            submitter_name: "Dana".into(),
            submitter_email: "dana@example.com".into(),
            request_type: RequestType::Feature,
            priority: Priority::Medium,
            bug: BugDetails::default(),
            issue_number: Some(issue),
        })
        .await
}

/// Scripts a small repo: two source files on `main`.
pub fn seed_repo(h: &Harness) {
    h.host.script_tree(vec![
        TreeEntry {
            path: "src/api.rs".into(),
            size: 4_000,
        },
        TreeEntry {
            path: "src/store.rs".into(),
            size: 2_000,
        },
    ]);
    h.host
        .script_file("src/api.rs", "pub async fn routes() {}\n");
    h.host
        .script_file("src/store.rs", "pub struct Store;\n");
}

pub fn open_agent_pr(h: &Harness, number: u64, issue: u64, author: &str) {
    h.host.script_pr(
        PullRequestInfo {
            number,
            url: format!("http://example/pr/{number}"),
            state: PrState::Open,
            merged: false,
            author: author.into(),
            title: format!("Add search (closes #{issue})"),
            body: format!("Implements #{issue}"),
            head_branch: format!("copilot/search-{issue}"),
            base_branch: "main".into(),
            files_changed: 3,
            additions: 120,
            deletions: 8,
        },
        "diff --git a/src/api.rs b/src/api.rs\n+pub async fn search() {}\n",
    );
}

pub fn triage_approve_json() -> &'static str {
    r#"{"decision":"approve","reasoning":"fits the roadmap","alignmentScore":85,
        "completenessScore":70,"salesAlignmentScore":80,"clarificationQuestions":[],
        "tags":["search"],"isDuplicate":false,"duplicateOfRequestId":null}"#
}

pub fn triage_clarify_json() -> &'static str {
    r#"{"decision":"clarify","reasoning":"which entities should be searchable?",
        "alignmentScore":50,"completenessScore":20,"salesAlignmentScore":55,
        "clarificationQuestions":["Which entities should be searchable?"],
        "tags":[],"isDuplicate":false}"#
}

pub fn selection_json() -> &'static str {
    r#"["src/api.rs","src/store.rs"]"#
}

pub fn solution_json() -> &'static str {
    r#"{"solutionSummary":"Add a search endpoint",
        "approach":"Extend the API layer with a search route backed by the store",
        "impactedFiles":[{"path":"src/api.rs","action":"modify","description":"add search route","estimatedLinesChanged":40}],
        "newFiles":[{"path":"src/search.rs","description":"search module","estimatedLines":120}],
        "dataMigration":{"required":false,"description":"","steps":[]},
        "breakingChanges":[],"dependencyChanges":[],
        "risks":[{"description":"slow scans on large datasets","severity":"medium","mitigation":"add an index"}],
        "estimatedComplexity":"medium","estimatedEffort":"2 days",
        "implementationOrder":["src/search.rs","src/api.rs"],
        "testingNotes":"unit tests for the query builder","architecturalNotes":""}"#
}

pub fn code_review_approved_json() -> &'static str {
    r#"{"decision":"Approved","summary":"matches the approved design",
        "designCompliance":true,"designComplianceNotes":"route added as designed",
        "securityPass":true,"securityNotes":"no injection paths",
        "codingStandardsPass":true,"codingStandardsNotes":"consistent style",
        "qualityScore":8}"#
}
