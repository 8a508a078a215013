//! Model/endpoint configuration for the shared chat client.

use crate::config::llm_provider::LlmProvider;
use crate::error_handler::{AiLlmError, ConfigError, env_opt, env_opt_u64, must_env};

/// Configuration for the chat-completion backend.
///
/// Per-call parameters (temperature, max output tokens) are intentionally
/// NOT here: each pipeline stage supplies its own, so the config carries
/// only what identifies the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmModelConfig {
    /// The LLM provider/backend.
    pub provider: LlmProvider,

    /// Model identifier string (e.g., `"gpt-4o"`, `"qwen2.5-coder:7b"`).
    pub model: String,

    /// Inference endpoint (local URL or remote API URL).
    pub endpoint: String,

    /// Optional API key for authentication (OpenAI-compatible providers).
    pub api_key: Option<String>,

    /// Optional request timeout (in seconds).
    pub timeout_secs: Option<u64>,
}

impl LlmModelConfig {
    /// Loads the chat backend config strictly from environment variables.
    ///
    /// - `LLM_KIND`  = provider kind (`ollama` | `openai` | `scripted`);
    ///   unset means "no LLM configured" and yields `Ok(None)` so the caller
    ///   can run in degraded mode without LLM-driven workers.
    /// - `LLM_MODEL` = model identifier (required unless scripted).
    /// - `LLM_ENDPOINT` = endpoint URL (required unless scripted).
    /// - `LLM_API_KEY` = optional credential.
    /// - `LLM_TIMEOUT_SECS` = optional per-request timeout.
    ///
    /// # Errors
    /// [`ConfigError`] variants for an unknown kind, missing model/endpoint,
    /// or a malformed timeout.
    pub fn from_env() -> std::result::Result<Option<Self>, AiLlmError> {
        let Some(kind) = env_opt("LLM_KIND") else {
            return Ok(None);
        };
        let provider =
            LlmProvider::parse(&kind).ok_or(ConfigError::UnsupportedProvider(kind.clone()))?;

        if provider == LlmProvider::Scripted {
            return Ok(Some(Self {
                provider,
                model: env_opt("LLM_MODEL").unwrap_or_else(|| "scripted".into()),
                endpoint: String::new(),
                api_key: None,
                timeout_secs: None,
            }));
        }

        let model = must_env("LLM_MODEL")?;
        if model.trim().is_empty() {
            return Err(ConfigError::EmptyModel.into());
        }
        let endpoint = must_env("LLM_ENDPOINT")?;
        let api_key = env_opt("LLM_API_KEY");
        let timeout_secs = env_opt_u64("LLM_TIMEOUT_SECS")?;

        Ok(Some(Self {
            provider,
            model,
            endpoint,
            api_key,
            timeout_secs,
        }))
    }
}
