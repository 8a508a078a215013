//! Persisted entities.
//!
//! All rows carry chrono UTC timestamps and serde-serializable enums; the
//! textual enum names are what a relational backend stores.

pub mod comment;
pub mod request;
pub mod reviews;

pub use comment::*;
pub use request::*;
pub use reviews::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A code-host project the pipeline operates on. Each request belongs to
/// exactly one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    /// Code-host owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    pub display_name: String,
    pub active: bool,
}

/// Insert payload for [`Project`].
#[derive(Debug, Clone)]
pub struct NewProject {
    pub owner: String,
    pub repo: String,
    pub display_name: String,
}

/// Editable prompt blob for one pipeline stage.
///
/// Prompt builders consult the store first and fall back to their compiled
/// defaults, so admins can swap stage prompts without a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemPrompt {
    /// Stage key, e.g. "triage", "architect", "code-review".
    pub key: String,
    pub content: String,
    pub updated_at: DateTime<Utc>,
}
