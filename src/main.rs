//! Composition root: wires the store, LLM client, code host and workers,
//! then serves the intake-facing API until shutdown.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ai_llm_service::{ChatClient, LlmModelConfig};
use code_host_engine::{CodeHostClient, HostConfig};
use request_pipeline::PipelineContext;
use request_pipeline::codebase::CodebaseCache;
use request_pipeline::config::{PipelineConfig, SharedConfig};
use request_pipeline::ops::PipelineOps;
use request_pipeline::refdocs::RefDocStore;
use request_pipeline::workers::{
    self, architect::ArchitectWorker, code_review::CodeReviewWorker,
    implementation::ImplementationTriggerWorker, orchestrator::OrchestratorWorker,
    pr_monitor::PullRequestMonitorWorker, triage::TriageWorker,
};
use request_store::RequestStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env when present.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SharedConfig::new(PipelineConfig::from_env());
    let store = RequestStore::new();

    // No LLM credential: LLM-driven workers do not register; the pipeline
    // still monitors PRs, deploys, and serves operations.
    let llm = match LlmModelConfig::from_env().context("LLM config")? {
        Some(cfg) => Some(Arc::new(
            ChatClient::from_config(cfg).context("LLM client")?,
        )),
        None => {
            warn!("no LLM configured (LLM_KIND unset); triage/architect/code-review disabled");
            None
        }
    };

    // No host token: run against the null host (degraded mode).
    let host = match std::env::var("GITHUB_TOKEN") {
        Ok(token) if !token.trim().is_empty() => {
            let base_api = std::env::var("GITHUB_API")
                .unwrap_or_else(|_| "https://api.github.com".to_string());
            Arc::new(CodeHostClient::from_config(HostConfig { base_api, token }).context("code host")?)
        }
        _ => {
            warn!("no GITHUB_TOKEN configured; code-host effects are dropped");
            Arc::new(CodeHostClient::null())
        }
    };

    let refdocs = Arc::new(RefDocStore::from_env());
    let codebase = Arc::new(CodebaseCache::new());

    let (shutdown, ctx) = PipelineContext::new(
        store,
        host,
        llm.clone(),
        config,
        refdocs,
        codebase,
    );

    let mut handles = Vec::new();
    if llm.is_some() {
        handles.push(workers::spawn(TriageWorker::new(ctx.clone()), &ctx));
        handles.push(workers::spawn(ArchitectWorker::new(ctx.clone()), &ctx));
        handles.push(workers::spawn(CodeReviewWorker::new(ctx.clone()), &ctx));
    }
    handles.push(workers::spawn(
        ImplementationTriggerWorker::new(ctx.clone()),
        &ctx,
    ));
    handles.push(workers::spawn(
        PullRequestMonitorWorker::new(ctx.clone()),
        &ctx,
    ));
    handles.push(workers::spawn(OrchestratorWorker::new(ctx.clone()), &ctx));
    info!(workers = handles.len(), "pipeline workers spawned");

    let ops = Arc::new(PipelineOps::new(ctx));
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    tokio::select! {
        res = api::start(ops, port) => res.context("api server")?,
        _ = tokio::signal::ctrl_c() => info!("shutdown signal received"),
    }

    // Stop accepting new requests; let in-flight commits finish.
    let _ = shutdown.send(true);
    for handle in handles {
        let _ = handle.await;
    }
    info!("pipeline stopped");
    Ok(())
}
