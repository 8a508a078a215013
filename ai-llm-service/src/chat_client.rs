//! Shared chat client (enum-dispatch) without async-trait or heap objects.
//!
//! Construct once from [`LlmModelConfig`], wrap in `Arc`, clone freely.
//! Every stage of the pipeline composes its own system/user messages and
//! per-call sampling parameters; the client only knows how to reach the
//! backend and report token usage.

use std::sync::Arc;

use crate::config::llm_model_config::LlmModelConfig;
use crate::config::llm_provider::LlmProvider;
use crate::error_handler::AiLlmError;
use crate::services::{
    ollama_service::OllamaService, open_ai_service::OpenAiService,
    scripted_service::ScriptedService,
};

/// One chat call: a system/user message pair plus sampling parameters.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    /// Max output tokens for this call.
    pub max_tokens: u32,
}

/// Token counts reported by (or estimated for) one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

/// Result of one chat call.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub text: String,
    pub usage: TokenUsage,
    /// Model identifier the backend reports itself as.
    pub model: String,
    pub latency_ms: u64,
}

/// Concrete chat client (enum-dispatch).
#[derive(Debug)]
pub enum ChatClient {
    OpenAi(OpenAiService),
    Ollama(OllamaService),
    Scripted(Arc<ScriptedService>),
}

impl ChatClient {
    /// Constructs a concrete client from generic config.
    ///
    /// # Errors
    /// Propagates provider construction errors (bad endpoint, missing key).
    pub fn from_config(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        Ok(match cfg.provider {
            LlmProvider::OpenAi => Self::OpenAi(OpenAiService::new(cfg)?),
            LlmProvider::Ollama => Self::Ollama(OllamaService::new(cfg)?),
            LlmProvider::Scripted => Self::Scripted(Arc::new(ScriptedService::new())),
        })
    }

    /// Wraps an existing scripted service (tests queue responses on the
    /// shared handle).
    pub fn scripted(svc: Arc<ScriptedService>) -> Self {
        Self::Scripted(svc)
    }

    /// Sends one chat completion request.
    ///
    /// # Errors
    /// [`AiLlmError`] from the underlying provider; use
    /// [`AiLlmError::is_transient`] to decide whether a retry next cycle
    /// makes sense.
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatOutcome, AiLlmError> {
        match self {
            Self::OpenAi(svc) => svc.chat(req).await,
            Self::Ollama(svc) => svc.chat(req).await,
            Self::Scripted(svc) => svc.chat(req).await,
        }
    }

    /// Model identifier for review rows.
    pub fn model_name(&self) -> &str {
        match self {
            Self::OpenAi(svc) => svc.model(),
            Self::Ollama(svc) => svc.model(),
            Self::Scripted(_) => "scripted",
        }
    }
}
