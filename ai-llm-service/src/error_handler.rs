//! Error types and validation helpers for `ai-llm-service`.
//!
//! This module defines the unified runtime error [`AiLlmError`], the
//! provider-level detail types, and small reusable helpers for
//! reading/validating environment variables.
//!
//! All error messages include the suffix `[AI LLM Service]` so that logs
//! and bubbled-up errors can be easily attributed to this library.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Error enum for environment/config-driven setup.
///
/// Keep this focused: only errors that realistically happen at config
/// load/validation time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable is missing or empty.
    #[error("[AI LLM Service] missing required environment variable: {0}")]
    MissingVar(&'static str),

    /// A number failed to parse (like ports, limits, timeouts).
    #[error("[AI LLM Service] invalid number in {var}: {reason}")]
    InvalidNumber {
        var: &'static str,
        reason: &'static str,
    },

    /// Unsupported provider in `LLM_KIND`.
    #[error("[AI LLM Service] unsupported provider: {0}")]
    UnsupportedProvider(String),

    /// Value had the wrong format (e.g., invalid URL).
    #[error("[AI LLM Service] invalid format in {var}: {reason}")]
    InvalidFormat {
        var: &'static str,
        reason: &'static str,
    },

    /// Model name was empty or invalid.
    #[error("[AI LLM Service] model name must not be empty")]
    EmptyModel,
}

/// Unified runtime error for all chat operations.
#[derive(Debug, Error)]
pub enum AiLlmError {
    /// Provider-level failure with status/decode detail.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Transport failure from the HTTP client (DNS, connect, timeout).
    #[error("[AI LLM Service] transport error: {0}")]
    HttpTransport(#[from] reqwest::Error),

    /// Configuration problem detected at call time.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl AiLlmError {
    /// True for failures worth retrying on a later cycle (timeouts,
    /// rate-limits, 5xx, transport-level trouble).
    pub fn is_transient(&self) -> bool {
        match self {
            AiLlmError::HttpTransport(_) => true,
            AiLlmError::Provider(p) => match &p.kind {
                ProviderErrorKind::HttpStatus(h) => {
                    h.status.is_server_error() || h.status == StatusCode::TOO_MANY_REQUESTS
                }
                _ => false,
            },
            AiLlmError::Config(_) => false,
        }
    }
}

/// Which backend produced a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Ollama,
    OpenAi,
    Scripted,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Ollama => f.write_str("ollama"),
            Provider::OpenAi => f.write_str("openai"),
            Provider::Scripted => f.write_str("scripted"),
        }
    }
}

/// Detailed provider error (backend + failure kind).
#[derive(Debug, Error)]
#[error("[AI LLM Service] {provider} provider error: {kind}")]
pub struct ProviderError {
    pub provider: Provider,
    pub kind: ProviderErrorKind,
}

impl ProviderError {
    pub fn new(provider: Provider, kind: ProviderErrorKind) -> Self {
        Self { provider, kind }
    }
}

/// Failure kinds shared by all providers.
#[derive(Debug, Error)]
pub enum ProviderErrorKind {
    /// Config named a different provider than the service being built.
    #[error("invalid provider for this service")]
    InvalidProvider,

    /// API key required but absent.
    #[error("missing API key")]
    MissingApiKey,

    /// Endpoint empty or not http(s).
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Non-2xx HTTP response with a body snippet for logs.
    #[error("unexpected HTTP status {} from {}: {}", .0.status, .0.url, .0.snippet)]
    HttpStatus(HttpError),

    /// Response body could not be decoded into the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// Completion arrived without any choices/content.
    #[error("empty completion choices")]
    EmptyChoices,

    /// The scripted provider ran out of canned responses.
    #[error("no scripted response queued")]
    ScriptExhausted,
}

/// Captured detail of a non-success HTTP response.
#[derive(Debug)]
pub struct HttpError {
    pub status: StatusCode,
    pub url: String,
    pub snippet: String,
}

/// Short, single-line snippet of a response body for error messages.
pub fn make_snippet(body: &str) -> String {
    let compact: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() <= 240 {
        compact
    } else {
        compact.chars().take(240).collect::<String>() + "…"
    }
}

/* ------------------------ Env helpers ------------------------ */

/// Fetches a required, non-empty environment variable.
///
/// # Errors
/// Returns [`ConfigError::MissingVar`] if the variable is absent or empty.
pub fn must_env(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

/// Reads an optional env var (`None` if unset/empty).
pub fn env_opt(name: &'static str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Parses an optional `u64` from env (`Ok(None)` if unset/empty).
///
/// # Errors
/// Returns [`ConfigError::InvalidNumber`] if the variable is set but not a valid `u64`.
pub fn env_opt_u64(name: &'static str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => {
            v.parse::<u64>()
                .map(Some)
                .map_err(|_| ConfigError::InvalidNumber {
                    var: name,
                    reason: "expected u64",
                })
        }
        _ => Ok(None),
    }
}

/// Validates that an HTTP endpoint starts with `http://` or `https://`.
pub fn validate_http_endpoint(var: &'static str, value: &str) -> Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidFormat {
            var,
            reason: "must start with http:// or https://",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_is_single_line_and_bounded() {
        let body = "line one\n   line   two\n".repeat(50);
        let s = make_snippet(&body);
        assert!(!s.contains('\n'));
        assert!(s.chars().count() <= 241);
    }

    #[test]
    fn transient_classification() {
        let rate_limited = AiLlmError::Provider(ProviderError::new(
            Provider::OpenAi,
            ProviderErrorKind::HttpStatus(HttpError {
                status: StatusCode::TOO_MANY_REQUESTS,
                url: "http://x".into(),
                snippet: String::new(),
            }),
        ));
        assert!(rate_limited.is_transient());

        let decode = AiLlmError::Provider(ProviderError::new(
            Provider::OpenAi,
            ProviderErrorKind::Decode("bad json".into()),
        ));
        assert!(!decode.is_transient());
    }
}
