//! Lightweight Ollama service for chat completion.
//!
//! This module implements a thin client for the local Ollama API:
//! - `POST {endpoint}/api/chat` — synchronous chat (`stream=false`)
//!
//! It uses the universal configuration [`LlmModelConfig`] and ensures that
//! the selected provider is [`LlmProvider::Ollama`]. Token counts map from
//! Ollama's `prompt_eval_count` / `eval_count` response fields.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::chat_client::{ChatOutcome, ChatRequest, TokenUsage};
use crate::config::{llm_model_config::LlmModelConfig, llm_provider::LlmProvider};
use crate::error_handler::{
    AiLlmError, HttpError, Provider, ProviderError, ProviderErrorKind, make_snippet,
};

/// Thin client for Ollama.
///
/// Initialized with a full [`LlmModelConfig`]. Reuses an HTTP client with a
/// configurable timeout.
#[derive(Debug)]
pub struct OllamaService {
    client: reqwest::Client,
    cfg: LlmModelConfig,
    url_chat: String,
}

impl OllamaService {
    /// Creates a new [`OllamaService`] from the given config.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `InvalidProvider` if `cfg.provider` is not Ollama
    /// - [`AiLlmError::Provider`] with `InvalidEndpoint` if `cfg.endpoint` is invalid
    /// - [`AiLlmError::HttpTransport`] if the HTTP client cannot be built
    pub fn new(cfg: LlmModelConfig) -> Result<Self, AiLlmError> {
        if cfg.provider != LlmProvider::Ollama {
            return Err(
                ProviderError::new(Provider::Ollama, ProviderErrorKind::InvalidProvider).into(),
            );
        }

        let endpoint = cfg.endpoint.trim();
        if endpoint.is_empty()
            || !(endpoint.starts_with("http://") || endpoint.starts_with("https://"))
        {
            return Err(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::InvalidEndpoint(cfg.endpoint.clone()),
            )
            .into());
        }

        let timeout = cfg
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(120));

        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let url_chat = format!("{}/api/chat", endpoint.trim_end_matches('/'));

        info!(
            provider = %cfg.provider,
            model = %cfg.model,
            endpoint = %cfg.endpoint,
            "OllamaService initialized"
        );

        Ok(Self {
            client,
            cfg,
            url_chat,
        })
    }

    /// Configured model identifier.
    pub fn model(&self) -> &str {
        &self.cfg.model
    }

    /// Performs a non-streaming `/api/chat` call.
    ///
    /// # Errors
    /// - [`AiLlmError::Provider`] with `HttpStatus` for non-2xx responses
    /// - [`AiLlmError::HttpTransport`] for client/network failures
    /// - [`AiLlmError::Provider`] with `Decode` if the JSON cannot be parsed
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatOutcome, AiLlmError> {
        let started = Instant::now();
        let body = OllamaChatRequest {
            model: &self.cfg.model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: &req.system,
                },
                OllamaMessage {
                    role: "user",
                    content: &req.user,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: req.temperature,
                num_predict: req.max_tokens,
            },
        };

        debug!(
            model = %self.cfg.model,
            system_len = req.system.len(),
            user_len = req.user.len(),
            "POST {}", self.url_chat
        );

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let url = self.url_chat.clone();
            let text = resp.text().await.unwrap_or_default();
            let snippet = make_snippet(&text);

            error!(
                %status,
                %url,
                %snippet,
                model = %self.cfg.model,
                latency_ms = started.elapsed().as_millis(),
                "ollama /api/chat returned non-success status"
            );

            return Err(ProviderError::new(
                Provider::Ollama,
                ProviderErrorKind::HttpStatus(HttpError {
                    status,
                    url,
                    snippet,
                }),
            )
            .into());
        }

        let out: OllamaChatResponse = match resp.json().await {
            Ok(v) => v,
            Err(e) => {
                error!(
                    error = %e,
                    model = %self.cfg.model,
                    "failed to decode /api/chat response"
                );
                return Err(ProviderError::new(
                    Provider::Ollama,
                    ProviderErrorKind::Decode(format!(
                        "serde error: {e}; expected `message.content`"
                    )),
                )
                .into());
            }
        };

        let usage = TokenUsage {
            prompt_tokens: out.prompt_eval_count.unwrap_or(0),
            completion_tokens: out.eval_count.unwrap_or(0),
        };

        let latency_ms = started.elapsed().as_millis() as u64;
        info!(
            model = %self.cfg.model,
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            latency_ms,
            "ollama chat completed"
        );

        Ok(ChatOutcome {
            text: out.message.content,
            usage,
            model: self.cfg.model.clone(),
            latency_ms,
        })
    }
}

/* ===========================================================================
HTTP payloads
======================================================================== */

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaMessageOut,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OllamaMessageOut {
    content: String,
}
