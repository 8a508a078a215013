//! Store error hierarchy.
//!
//! - `NotFound` / `Conflict` map 1:1 onto what a relational backend reports.
//! - `IllegalTransition` is a programming error: the offending write is
//!   rejected and the row is left untouched.

use thiserror::Error;

use crate::state::PipelineState;

/// Convenient alias for store results.
pub type StoreResult<T> = Result<T, StoreError>;

/// Root error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity lookup failed.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Optimistic concurrency check failed: the row changed under the writer.
    #[error("request {id} was modified concurrently")]
    Conflict { id: i64 },

    /// A write attempted a transition outside the pipeline state graph.
    #[error("illegal state transition for request {id}: {from:?} -> {to:?}")]
    IllegalTransition {
        id: i64,
        from: PipelineState,
        to: PipelineState,
    },

    /// Serialization of a persisted payload failed.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}
