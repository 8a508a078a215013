//! Domain model and narrow store surface for the development pipeline.
//!
//! The pipeline treats the relational store as an external collaborator; this
//! crate is the contract the core consumes:
//! - entities (`Project`, `Request`, `Comment`, `Attachment`, the three review
//!   kinds, `SystemPrompt`) with enums persisted by textual name,
//! - the pipeline state machine (`state`),
//! - `RequestStore`: indexed access by state / `updated_at`, per-request
//!   atomic read-modify-write with an optimistic `updated_at` version check,
//!   child collections, and token-usage sums for budget gates.
//!
//! The shipped backend is in-memory (tokio `RwLock` over maps). A SQL-backed
//! variant plugs in behind the same surface.

pub mod errors;
pub mod memory;
pub mod model;
pub mod state;

pub use errors::{StoreError, StoreResult};
pub use memory::{HealthCounters, OrderBy, RequestStore};
pub use model::*;
pub use state::PipelineState;
