//! Core of the multi-agent development pipeline.
//!
//! A request inserted in state `New` flows through product-owner triage,
//! architecture design, implementation dispatch, PR monitoring, code review,
//! merge and deployment. Each stage is a polling worker over the shared
//! store; coordination happens only through request-state transitions.
//!
//! Crate layout:
//! - `config`: runtime-swappable pipeline configuration
//! - `refdocs`: cached product/sales reference documents
//! - `codebase`: repository map + file-content caches (TTL, throttled)
//! - `budget`: daily/monthly token gates per review table
//! - `prompts`: per-stage prompt assembly + JSON contracts + fallbacks
//! - `workers`: the five pipeline workers and the orchestrator
//! - `ops`: operations exposed to the intake boundary
//!
//! The pipeline uses `tracing` for logging and avoids `async-trait` and
//! heap trait objects. External collaborators (store backend, code host,
//! LLM vendor) are reached through the narrow surfaces of the sibling
//! crates.

pub mod budget;
pub mod codebase;
pub mod config;
pub mod errors;
pub mod labels;
pub mod ops;
pub mod prompts;
pub mod refdocs;
pub mod telemetry;
pub mod workers;

use std::sync::Arc;

use tokio::sync::watch;

use ai_llm_service::ChatClient;
use code_host_engine::{CodeHostClient, RepoRef};
use request_store::{Project, Request, RequestStore};

use crate::codebase::CodebaseCache;
use crate::config::SharedConfig;
use crate::errors::PipelineResult;
use crate::refdocs::RefDocStore;

pub use errors::PipelineError;

/// Everything a worker or operation needs, cheap to clone.
///
/// `llm` is `None` when no credential is configured: LLM-driven workers do
/// not register and the core runs in degraded mode.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: RequestStore,
    pub host: Arc<CodeHostClient>,
    pub llm: Option<Arc<ChatClient>>,
    pub config: SharedConfig,
    pub refdocs: Arc<RefDocStore>,
    pub codebase: Arc<CodebaseCache>,
    shutdown: watch::Receiver<bool>,
}

impl PipelineContext {
    /// Builds a context plus the shutdown handle the composition holds on
    /// to. Sending `true` (or dropping the sender) stops worker loops; the
    /// in-flight request finishes its commit first.
    pub fn new(
        store: RequestStore,
        host: Arc<CodeHostClient>,
        llm: Option<Arc<ChatClient>>,
        config: SharedConfig,
        refdocs: Arc<RefDocStore>,
        codebase: Arc<CodebaseCache>,
    ) -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (
            tx,
            Self {
                store,
                host,
                llm,
                config,
                refdocs,
                codebase,
                shutdown: rx,
            },
        )
    }

    /// True once shutdown was signalled; checked between external calls and
    /// between requests within a batch.
    pub fn cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    pub(crate) fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown.clone()
    }

    /// Resolves the code-host repository of a request's project.
    pub async fn repo_for(&self, request: &Request) -> PipelineResult<(RepoRef, Project)> {
        let project = self.store.get_project(request.project_id).await?;
        Ok((RepoRef::new(project.owner.clone(), project.repo.clone()), project))
    }

    /// Stage system prompt: the store's editable row, or the compiled
    /// default.
    pub async fn system_prompt_or(&self, key: &str, default: &str) -> String {
        match self.store.system_prompt(key).await {
            Some(row) => row.content,
            None => default.to_string(),
        }
    }
}
