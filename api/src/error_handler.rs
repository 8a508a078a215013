use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use request_pipeline::PipelineError;
use request_store::StoreError;

use crate::response_envelope::ApiResponse;

/// Public application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // --- IO / network / server ---
    #[error("failed to bind listener")]
    Bind(#[source] std::io::Error),

    #[error("server error")]
    Server(#[source] std::io::Error),

    // --- Request / routing ---
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Lower-layer pipeline failure, mapped to a status per kind.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Pipeline(PipelineError::Store(StoreError::NotFound { .. })) => {
                StatusCode::NOT_FOUND
            }
            AppError::Pipeline(PipelineError::Store(StoreError::Conflict { .. })) => {
                StatusCode::CONFLICT
            }
            AppError::Pipeline(PipelineError::Precondition(_)) => StatusCode::CONFLICT,
            AppError::Pipeline(_) => StatusCode::BAD_GATEWAY,
            AppError::Bind(_) | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "BAD_REQUEST",
            AppError::Pipeline(PipelineError::Store(StoreError::NotFound { .. })) => "NOT_FOUND",
            AppError::Pipeline(PipelineError::Store(StoreError::Conflict { .. })) => "CONFLICT",
            AppError::Pipeline(PipelineError::Precondition(_)) => "PRECONDITION",
            AppError::Pipeline(_) => "UPSTREAM_ERROR",
            AppError::Bind(_) | AppError::Server(_) => "SERVER_ERROR",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiResponse::<()>::error(self.code(), self.to_string())
            .into_response_with_status(self.status_code())
    }
}
