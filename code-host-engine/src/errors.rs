//! Crate-wide error hierarchy for code-host-engine.
//!
//! Goals:
//! - Single root `HostError` for all public functions.
//! - Provider-aware mapping (401→Unauthorized, 429→RateLimited, 5xx→Server).
//! - No dynamic dispatch, ergonomic `?` via `From` impls.

use thiserror::Error;

/// Convenient alias for crate-wide results.
pub type HostResult<T> = Result<T, HostError>;

/// Root error type for the code-host-engine crate.
#[derive(Debug, Error)]
pub enum HostError {
    /// Provider (HTTP API) related failure.
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Configuration problems (bad/missing tokens, base URL).
    #[error("host config error: {0}")]
    Config(String),

    /// Input validation errors (bad refs, empty paths).
    #[error("validation error: {0}")]
    Validation(String),
}

impl HostError {
    /// True for failures worth retrying on a later cycle.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HostError::Provider(
                ProviderError::RateLimited { .. }
                    | ProviderError::Server(_)
                    | ProviderError::Timeout
                    | ProviderError::Network(_)
            )
        )
    }
}

/// Detailed provider-specific error used inside the provider layer.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Unauthorized (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden (HTTP 403).
    #[error("forbidden")]
    Forbidden,

    /// Not found (HTTP 404).
    #[error("not found")]
    NotFound,

    /// Rate limited (HTTP 429).
    #[error("rate limited")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Gateway/Server error (HTTP 5xx).
    #[error("server error: status {0}")]
    Server(u16),

    /// Other HTTP status (4xx/3xx) not covered above.
    #[error("http status error: {0}")]
    HttpStatus(u16),

    /// Timeout at transport level.
    #[error("timeout")]
    Timeout,

    /// Network/transport failure without status (DNS/connect/reset).
    #[error("network error: {0}")]
    Network(String),

    /// JSON deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Unexpected/invalid shape of provider response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

// ===== Conversions for `?` ergonomics =====

impl From<reqwest::Error> for HostError {
    fn from(e: reqwest::Error) -> Self {
        HostError::Provider(ProviderError::from(e))
    }
}

impl From<serde_json::Error> for HostError {
    fn from(e: serde_json::Error) -> Self {
        HostError::Provider(ProviderError::Serde(e))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return ProviderError::Timeout;
        }
        if let Some(status) = e.status() {
            let code = status.as_u16();
            return match code {
                401 => ProviderError::Unauthorized,
                403 => ProviderError::Forbidden,
                404 => ProviderError::NotFound,
                429 => ProviderError::RateLimited {
                    retry_after_secs: None,
                },
                500..=599 => ProviderError::Server(code),
                _ => ProviderError::HttpStatus(code),
            };
        }
        ProviderError::Network(e.to_string())
    }
}
