//! HTTP surface for the intake-facing operations.
//!
//! The request-intake API proper (create/update requests, attachments)
//! belongs to an external collaborator; this crate exposes only what the
//! core offers that layer: override/re-review operations, staged
//! deployment, runtime config, and health counters. JSON envelopes follow
//! one shape for success and error.

pub mod error_handler;
pub mod response_envelope;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use tracing::info;

use request_pipeline::ops::PipelineOps;

use crate::error_handler::AppError;

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub ops: Arc<PipelineOps>,
}

/// Builds the router over one operations handle.
pub fn router(ops: Arc<PipelineOps>) -> Router {
    let state = AppState { ops };
    Router::new()
        .route("/health", get(routes::health))
        .route("/config", get(routes::get_config))
        .route("/config", put(routes::update_config))
        .route("/requests/{id}/queue-triage", post(routes::queue_triage))
        .route(
            "/requests/{id}/queue-architect",
            post(routes::queue_architect),
        )
        .route(
            "/requests/{id}/trigger-implementation",
            post(routes::trigger_implementation),
        )
        .route(
            "/requests/{id}/reject-implementation",
            post(routes::reject_implementation),
        )
        .route(
            "/requests/{id}/retry-deployment",
            post(routes::retry_deployment),
        )
        .route(
            "/reviews/architect/{id}/approve",
            post(routes::approve_architect),
        )
        .route(
            "/reviews/architect/{id}/reject",
            post(routes::reject_architect),
        )
        .route(
            "/reviews/architect/{id}/feedback",
            post(routes::feedback_architect),
        )
        .route(
            "/reviews/triage/{id}/override",
            post(routes::override_triage),
        )
        .route("/deploy/staged", post(routes::deploy_staged))
        .with_state(state)
}

/// Binds and serves until the process shuts down.
pub async fn start(ops: Arc<PipelineOps>, port: u16) -> Result<(), AppError> {
    let app = router(ops);
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(AppError::Bind)?;
    info!(%addr, "api listening");
    axum::serve(listener, app).await.map_err(AppError::Server)?;
    Ok(())
}
