//! Capability interfaces for the external services the core depends on.
//!
//! Each trait is deliberately narrow so implementations can be swapped:
//! the LLM crate provides HTTP-backed ones, tests provide scripted fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::behavior::Behavior;
use crate::error::Result;
use crate::types::UserId;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions framing the request.
    System,
    /// The human side of the conversation.
    User,
    /// The agent.
    Assistant,
}

/// One message in a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who said it.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// A user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Maps free text to a behavioral label.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Classify `text`. Low-confidence results should be `Behavior::Neutral`.
    ///
    /// # Errors
    /// Returns `AffinityError::Classification` when the backend fails.
    async fn classify(&self, text: &str) -> Result<Behavior>;
}

/// Produces text from a system context and a message list.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Generate a completion.
    ///
    /// # Errors
    /// Returns `AffinityError::Generation` when the backend fails.
    async fn generate(&self, system: &str, messages: &[ChatMessage]) -> Result<String>;
}

/// Turns text into an embedding vector.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed `text`.
    ///
    /// # Errors
    /// Returns `AffinityError::Embedding` when the backend fails.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Delivers outbound direct messages.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `text` to `user` privately.
    ///
    /// # Errors
    /// Returns `AffinityError::Transport` when delivery fails.
    async fn send_direct_message(&self, user: &UserId, text: &str) -> Result<()>;
}
