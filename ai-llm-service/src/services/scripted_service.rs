//! Scripted chat provider.
//!
//! Replays queued responses in FIFO order without touching the network.
//! Used by the binary's offline/dry-run mode and by tests that need exact
//! control over what "the model" answers. Token counts are estimated at
//! roughly four characters per token.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use tracing::debug;

use crate::chat_client::{ChatOutcome, ChatRequest, TokenUsage};
use crate::error_handler::{AiLlmError, Provider, ProviderError, ProviderErrorKind};

/// Rough chars-per-token factor used for estimated accounting.
const CHARS_PER_TOKEN: usize = 4;

/// Chat provider that answers from a queue of canned responses.
#[derive(Debug, Default)]
pub struct ScriptedService {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one response; calls consume the queue front-to-back.
    pub fn push_response(&self, text: impl Into<String>) {
        self.responses.lock().unwrap().push_back(text.into());
    }

    /// Requests observed so far (system/user text included), oldest first.
    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Pops the next canned response.
    ///
    /// # Errors
    /// [`ProviderErrorKind::ScriptExhausted`] when the queue is empty.
    pub async fn chat(&self, req: &ChatRequest) -> Result<ChatOutcome, AiLlmError> {
        let started = Instant::now();
        self.calls.lock().unwrap().push(req.clone());

        let text = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| {
                ProviderError::new(Provider::Scripted, ProviderErrorKind::ScriptExhausted)
            })?;

        let usage = TokenUsage {
            prompt_tokens: ((req.system.len() + req.user.len()) / CHARS_PER_TOKEN) as u32,
            completion_tokens: (text.len() / CHARS_PER_TOKEN).max(1) as u32,
        };

        debug!(
            completion_tokens = usage.completion_tokens,
            "scripted chat served"
        );

        Ok(ChatOutcome {
            text,
            usage,
            model: "scripted".into(),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(user: &str) -> ChatRequest {
        ChatRequest {
            system: "You are a test.".into(),
            user: user.into(),
            temperature: 0.0,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn replays_in_fifo_order() {
        let svc = ScriptedService::new();
        svc.push_response("first");
        svc.push_response("second");
        assert_eq!(svc.chat(&request("a")).await.unwrap().text, "first");
        assert_eq!(svc.chat(&request("b")).await.unwrap().text, "second");
        assert_eq!(svc.call_count(), 2);
    }

    #[tokio::test]
    async fn exhausted_queue_is_an_error() {
        let svc = ScriptedService::new();
        let err = svc.chat(&request("a")).await.unwrap_err();
        assert!(matches!(
            err,
            AiLlmError::Provider(ProviderError {
                kind: ProviderErrorKind::ScriptExhausted,
                ..
            })
        ));
    }
}
