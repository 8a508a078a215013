/// Represents the provider (backend) used for chat completion.
///
/// Adding more providers in the future (e.g., Anthropic, Mistral API)
/// is done by extending this enum and the matching service module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LlmProvider {
    /// Local Ollama runtime for on-device inference.
    Ollama,
    /// Any OpenAI-compatible chat-completions API.
    OpenAi,
    /// Canned responses replayed in order (offline, dev, tests).
    Scripted,
}

impl std::fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProvider::Ollama => f.write_str("ollama"),
            LlmProvider::OpenAi => f.write_str("openai"),
            LlmProvider::Scripted => f.write_str("scripted"),
        }
    }
}

impl LlmProvider {
    /// Lenient parse for `LLM_KIND`-style env values.
    pub fn parse(s: &str) -> Option<LlmProvider> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ollama" => Some(LlmProvider::Ollama),
            "openai" | "chatgpt" | "azure" => Some(LlmProvider::OpenAi),
            "scripted" | "offline" => Some(LlmProvider::Scripted),
            _ => None,
        }
    }
}
