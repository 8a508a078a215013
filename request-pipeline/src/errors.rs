//! Crate-wide error hierarchy for the pipeline core.
//!
//! Workers never let one of these cross a cycle boundary: a request's
//! failure is logged and the loop continues. `is_transient` tells the cycle
//! whether the same request is worth another attempt next poll.

use thiserror::Error;

use ai_llm_service::AiLlmError;
use code_host_engine::HostError;
use request_store::StoreError;

/// Convenient alias for pipeline results.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Root error type for the pipeline core.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Store access or invariant failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Code-host call failure.
    #[error(transparent)]
    Host(#[from] HostError),

    /// LLM call failure (parse failures never surface here; stages fall
    /// back instead).
    #[error(transparent)]
    Llm(#[from] AiLlmError),

    /// Reference document / telemetry file I/O.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Solution document (de)serialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Request skipped: precondition not met (missing review, missing
    /// issue number). Logged at warn level, not retried eagerly.
    #[error("precondition: {0}")]
    Precondition(String),
}

impl PipelineError {
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Host(e) => e.is_transient(),
            PipelineError::Llm(e) => e.is_transient(),
            PipelineError::Io(_) => true,
            PipelineError::Store(StoreError::Conflict { .. }) => true,
            _ => false,
        }
    }
}
