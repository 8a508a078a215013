//! The central aggregate: a development request and its tracking fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::PipelineState;

/// Classification of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Bug,
    Feature,
    Enhancement,
    Question,
}

impl RequestType {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Bug => "Bug",
            RequestType::Feature => "Feature",
            RequestType::Enhancement => "Enhancement",
            RequestType::Question => "Question",
        }
    }
}

/// Submitter-assigned (or triage-suggested) priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Medium => "Medium",
            Priority::High => "High",
            Priority::Critical => "Critical",
        }
    }

    /// Lenient parse for LLM-suggested priorities ("high", "HIGH", "High").
    pub fn parse_lenient(s: &str) -> Option<Priority> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            "critical" => Some(Priority::Critical),
            _ => None,
        }
    }
}

/// Coding-agent side progress of an `InProgress` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImplementationStatus {
    Pending,
    Working,
    PrOpened,
    ReviewApproved,
    PrMerged,
    Failed,
}

impl ImplementationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ImplementationStatus::Pending => "Pending",
            ImplementationStatus::Working => "Working",
            ImplementationStatus::PrOpened => "PrOpened",
            ImplementationStatus::ReviewApproved => "ReviewApproved",
            ImplementationStatus::PrMerged => "PrMerged",
            ImplementationStatus::Failed => "Failed",
        }
    }

    /// True while the coding agent holds one of the bounded session slots.
    pub fn holds_session_slot(self) -> bool {
        matches!(
            self,
            ImplementationStatus::Pending | ImplementationStatus::Working
        )
    }
}

/// Deployment progress after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentStatus {
    None,
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl DeploymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeploymentStatus::None => "None",
            DeploymentStatus::Pending => "Pending",
            DeploymentStatus::InProgress => "InProgress",
            DeploymentStatus::Succeeded => "Succeeded",
            DeploymentStatus::Failed => "Failed",
        }
    }
}

/// Reproduction details carried by bug reports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BugDetails {
    pub steps_to_reproduce: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

/// The central aggregate. One row per development request; every mutation
/// bumps `updated_at` (monotonically non-decreasing).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: i64,
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub request_type: RequestType,
    pub priority: Priority,
    #[serde(default)]
    pub bug: BugDetails,

    pub state: PipelineState,

    // Triage counters.
    pub last_triage_at: Option<DateTime<Utc>>,
    pub triage_count: u32,

    // Architect counters.
    pub last_architect_at: Option<DateTime<Utc>>,
    pub architect_count: u32,

    // Implementation tracking.
    /// Code-host issue mirroring this request (created by the intake layer).
    pub issue_number: Option<u64>,
    pub session_id: Option<String>,
    pub pr_number: Option<u64>,
    pub pr_url: Option<String>,
    pub branch_name: Option<String>,
    pub triggered_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub implementation_status: Option<ImplementationStatus>,

    // Deployment tracking.
    pub deployment_status: DeploymentStatus,
    pub deployment_run_id: Option<u64>,
    pub deployed_at: Option<DateTime<Utc>>,
    pub deployment_retry_count: u32,
    pub branch_deleted: bool,

    /// Set once when the orchestrator flags the request as stalled; cleared
    /// when the request advances.
    pub stall_notified_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Clears all agent-side implementation fields (used when a human rejects
    /// an implementation attempt and the request returns to `Approved`).
    pub fn clear_implementation(&mut self) {
        self.session_id = None;
        self.pr_number = None;
        self.pr_url = None;
        self.branch_name = None;
        self.triggered_at = None;
        self.completed_at = None;
        self.implementation_status = None;
    }
}

/// Insert payload for [`Request`]. The store assigns id, state `New`,
/// zeroed counters and timestamps.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub project_id: i64,
    pub title: String,
    pub description: String,
    pub submitter_name: String,
    pub submitter_email: String,
    pub request_type: RequestType,
    pub priority: Priority,
    pub bug: BugDetails,
    pub issue_number: Option<u64>,
}
