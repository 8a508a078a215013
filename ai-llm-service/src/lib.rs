//! Shared LLM chat-completion service.
//!
//! - Construct one [`ChatClient`] at startup, wrap it in `Arc`, and pass
//!   clones to dependents; concurrent calls are allowed.
//! - Every call takes a system + user message pair, temperature, and a max
//!   output token budget, and returns text plus `(prompt_tokens,
//!   completion_tokens)` with latency.
//! - Providers: OpenAI-compatible `/v1/chat/completions`, local Ollama
//!   `/api/chat`, and a scripted provider replaying canned responses for
//!   offline and test runs.
//! - Errors are normalized via unified types in `error_handler`.

pub mod chat_client;
pub mod config;
pub mod error_handler;
pub mod services;

pub use chat_client::{ChatClient, ChatOutcome, ChatRequest, TokenUsage};
pub use config::llm_model_config::LlmModelConfig;
pub use config::llm_provider::LlmProvider;
pub use error_handler::AiLlmError;
pub use services::scripted_service::ScriptedService;
