//! Runtime-editable pipeline configuration.
//!
//! One immutable snapshot (`Arc<PipelineConfig>`) behind a process-wide
//! swap: every worker cycle reads the current snapshot, admin updates
//! replace the pointer, nothing restarts. Defaults match the recognized
//! options; the environment can override any of them at startup.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

/// Deployment behavior after a code-review approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Merge and deploy immediately on approval.
    Auto,
    /// Accumulate approved PRs; deploy on admin signal.
    Staged,
}

/// Triage worker options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    pub enabled: bool,
    pub poll_sec: u64,
    /// Max triage passes per request (clarification loop cap).
    pub max_reviews: u32,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Daily token budget; 0 = unlimited.
    pub daily_budget: u64,
    /// Monthly token budget; 0 = unlimited.
    pub monthly_budget: u64,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_sec: 30,
            max_reviews: 3,
            temperature: 0.3,
            max_tokens: 2000,
            daily_budget: 0,
            monthly_budget: 0,
        }
    }
}

/// Architect worker options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchitectConfig {
    pub enabled: bool,
    pub poll_sec: u64,
    pub max_reviews: u32,
    /// Max file paths requested from the selection phase.
    pub max_files: usize,
    /// Char budget for fetched file contents in the solution phase.
    pub max_content_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    pub daily_budget: u64,
    pub monthly_budget: u64,
}

impl Default for ArchitectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_sec: 60,
            max_reviews: 3,
            max_files: 20,
            max_content_chars: 50_000,
            temperature: 0.2,
            max_tokens: 4000,
            daily_budget: 0,
            monthly_budget: 0,
        }
    }
}

/// Implementation dispatch options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImplementationConfig {
    pub enabled: bool,
    /// When false, requests are dispatched only via the explicit operation.
    pub auto_trigger: bool,
    pub poll_sec: u64,
    /// PR monitor poll interval.
    pub pr_poll_sec: u64,
    /// Cross-request cap on simultaneously active coding sessions.
    pub max_concurrent: usize,
    pub base_branch: String,
    /// Model hint passed through to the coding agent ("" = agent default).
    pub model: String,
    pub max_retries: u32,
    /// Login of the coding-agent principal issues are assigned to.
    pub agent_login: String,
}

impl Default for ImplementationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_trigger: true,
            poll_sec: 60,
            pr_poll_sec: 120,
            max_concurrent: 3,
            base_branch: "main".into(),
            model: String::new(),
            max_retries: 2,
            agent_login: "copilot-swe-agent".into(),
        }
    }
}

/// Code-review worker options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeReviewConfig {
    pub enabled: bool,
    /// Merge immediately on approval (otherwise the orchestrator merges per
    /// deployment mode).
    pub auto_merge: bool,
    pub temperature: f32,
    /// Input budget; the diff is truncated beyond `max_input_tokens * 4`
    /// chars.
    pub max_input_tokens: usize,
    pub max_tokens: u32,
}

impl Default for CodeReviewConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_merge: false,
            temperature: 0.2,
            max_input_tokens: 6000,
            max_tokens: 2000,
        }
    }
}

/// Orchestrator options (stall thresholds + deployment).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    pub enabled: bool,
    pub poll_sec: u64,
    pub needs_clarification_stale_days: i64,
    pub architect_review_stale_days: i64,
    pub approved_stale_days: i64,
    pub failed_stale_hours: i64,
    pub deployment_mode: DeploymentMode,
    pub max_deploy_retries: u32,
    /// Workflow files observed for deployment progress.
    pub deploy_workflows: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_sec: 60,
            needs_clarification_stale_days: 7,
            architect_review_stale_days: 3,
            approved_stale_days: 1,
            failed_stale_hours: 24,
            deployment_mode: DeploymentMode::Auto,
            max_deploy_retries: 3,
            deploy_workflows: vec!["deploy-api.yml".into(), "deploy-web.yml".into()],
        }
    }
}

/// Full pipeline configuration snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub triage: TriageConfig,
    pub architect: ArchitectConfig,
    pub implementation: ImplementationConfig,
    pub code_review: CodeReviewConfig,
    pub orchestrator: OrchestratorConfig,
}

impl PipelineConfig {
    /// Defaults with environment overrides applied.
    ///
    /// Only the knobs that operators actually turn are exposed as env vars;
    /// the rest stays editable through the admin config operation.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_bool("PIPELINE_TRIAGE_ENABLED") {
            cfg.triage.enabled = v;
        }
        if let Some(v) = env_u64("PIPELINE_TRIAGE_POLL_SEC") {
            cfg.triage.poll_sec = v;
        }
        if let Some(v) = env_u64("PIPELINE_TRIAGE_DAILY_BUDGET") {
            cfg.triage.daily_budget = v;
        }
        if let Some(v) = env_u64("PIPELINE_TRIAGE_MONTHLY_BUDGET") {
            cfg.triage.monthly_budget = v;
        }
        if let Some(v) = env_bool("PIPELINE_ARCHITECT_ENABLED") {
            cfg.architect.enabled = v;
        }
        if let Some(v) = env_u64("PIPELINE_ARCHITECT_POLL_SEC") {
            cfg.architect.poll_sec = v;
        }
        if let Some(v) = env_u64("PIPELINE_ARCHITECT_DAILY_BUDGET") {
            cfg.architect.daily_budget = v;
        }
        if let Some(v) = env_u64("PIPELINE_ARCHITECT_MONTHLY_BUDGET") {
            cfg.architect.monthly_budget = v;
        }
        if let Some(v) = env_bool("PIPELINE_IMPLEMENTATION_ENABLED") {
            cfg.implementation.enabled = v;
        }
        if let Some(v) = env_bool("PIPELINE_AUTO_TRIGGER") {
            cfg.implementation.auto_trigger = v;
        }
        if let Some(v) = env_u64("PIPELINE_MAX_CONCURRENT_SESSIONS") {
            cfg.implementation.max_concurrent = v as usize;
        }
        if let Some(v) = env_str("PIPELINE_BASE_BRANCH") {
            cfg.implementation.base_branch = v;
        }
        if let Some(v) = env_str("PIPELINE_AGENT_LOGIN") {
            cfg.implementation.agent_login = v;
        }
        if let Some(v) = env_bool("PIPELINE_CODE_REVIEW_ENABLED") {
            cfg.code_review.enabled = v;
        }
        if let Some(v) = env_str("PIPELINE_DEPLOYMENT_MODE") {
            cfg.orchestrator.deployment_mode = match v.to_ascii_lowercase().as_str() {
                "staged" => DeploymentMode::Staged,
                _ => DeploymentMode::Auto,
            };
        }
        if let Some(v) = env_u64("PIPELINE_MAX_DEPLOY_RETRIES") {
            cfg.orchestrator.max_deploy_retries = v as u32;
        }
        cfg
    }
}

fn env_str(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

fn env_bool(name: &str) -> Option<bool> {
    env_str(name).map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

fn env_u64(name: &str) -> Option<u64> {
    env_str(name).and_then(|v| v.parse().ok())
}

/// Process-wide config handle: read-mostly, swapped atomically on update.
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    current: Arc<RwLock<Arc<PipelineConfig>>>,
}

impl SharedConfig {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(cfg))),
        }
    }

    /// Current snapshot; cheap, taken once per cycle.
    pub fn snapshot(&self) -> Arc<PipelineConfig> {
        self.current.read().expect("config lock poisoned").clone()
    }

    /// Replaces the whole config; visible to the next cycle of every worker.
    pub fn replace(&self, cfg: PipelineConfig) {
        *self.current.write().expect("config lock poisoned") = Arc::new(cfg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recognized_options() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.triage.poll_sec, 30);
        assert_eq!(cfg.triage.max_reviews, 3);
        assert_eq!(cfg.architect.max_files, 20);
        assert_eq!(cfg.architect.max_content_chars, 50_000);
        assert_eq!(cfg.implementation.max_concurrent, 3);
        assert_eq!(cfg.code_review.max_input_tokens, 6000);
        assert_eq!(cfg.orchestrator.max_deploy_retries, 3);
        assert_eq!(cfg.orchestrator.deployment_mode, DeploymentMode::Auto);
    }

    #[test]
    fn replace_is_visible_to_later_snapshots() {
        let shared = SharedConfig::new(PipelineConfig::default());
        let mut next = PipelineConfig::default();
        next.triage.max_reviews = 5;
        shared.replace(next);
        assert_eq!(shared.snapshot().triage.max_reviews, 5);
    }
}
