//! Request and response types.

use affinity_core::{ChatMessage, PromptEngine, PromptId};
use serde::Deserialize;

use crate::error::LlmError;

/// A chat completion request.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// System prompt.
    pub system: String,
    /// Conversation turns after the system prompt.
    pub messages: Vec<ChatMessage>,
    /// Maximum tokens to generate, provider default if `None`.
    pub max_tokens: Option<u32>,
    /// Sampling temperature override.
    pub temperature: Option<f32>,
    /// Ask the provider to constrain output to JSON.
    pub json_mode: bool,
}

impl LlmRequest {
    /// A request with a system prompt and message list.
    #[must_use]
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system: system.into(),
            messages,
            max_tokens: None,
            temperature: None,
            json_mode: false,
        }
    }

    /// Render `id` from `prompts` into a single-turn request carrying the
    /// template's token cap and temperature.
    ///
    /// # Errors
    /// Returns [`LlmError::ConfigError`] if the template is missing.
    pub fn from_prompt(prompts: &PromptEngine, id: PromptId, vars: &[(&str, &str)]) -> Result<Self, LlmError> {
        let (system, user) = prompts
            .render(id, vars)
            .map_err(|e| LlmError::ConfigError(e.to_string()))?;
        let template = prompts.get(id);
        Ok(Self {
            system,
            messages: vec![ChatMessage::user(user)],
            max_tokens: template.map(|t| t.max_tokens),
            temperature: template.and_then(|t| t.temperature),
            json_mode: false,
        })
    }

    /// Request JSON output.
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Set the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// A chat completion result.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text.
    pub text: String,
    /// Tokens generated, if the provider reported it.
    pub tokens_generated: u32,
    /// Wall time of the successful attempt.
    pub latency_ms: u64,
    /// Model that answered.
    pub model: String,
}

/// Structured classifier output.
#[derive(Debug, Clone, Deserialize)]
pub struct SentimentResponse {
    /// One of the behavior labels.
    pub sentiment: String,
}
