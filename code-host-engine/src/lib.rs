//! Code-host facade for the development pipeline.
//!
//! We expose an enum `CodeHostClient` with concrete implementations per
//! provider, no async-trait and no heap trait objects. The pipeline talks to
//! exactly this surface:
//! - issues: create/close, colored labels (namespace-replacing), comments,
//!   coding-agent assignment with an instruction payload,
//! - branches: existence checks, create/delete, single-commit file pushes,
//! - pull requests: search by issue + author, metadata, unified diff,
//!   reviews, merge, branch refresh,
//! - workflow runs: list, re-run failed jobs, dispatch,
//! - repository reads: recursive tree listing and file contents.
//!
//! Effects are best-effort and idempotent: label application replaces the
//! namespace, branch creation no-ops on pre-existing state, duplicate
//! comments are tolerated.

pub mod errors;
pub mod hosts;
pub mod types;

pub use errors::{HostError, HostResult, ProviderError};
pub use hosts::{CodeHostClient, HostConfig, memory::InMemoryHost};
pub use types::*;
