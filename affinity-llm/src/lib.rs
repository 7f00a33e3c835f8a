//! # affinity-llm
//!
//! HTTP-backed implementations of the core collaborator traits:
//!   - **Ollama** (`/api/chat`, `/api/embeddings`), the default
//!   - **OpenAI-compatible** APIs (`/v1/chat/completions`, `/v1/embeddings`)
//!
//! [`LlmClient`] implements [`affinity_core::Generator`] and
//! [`affinity_core::Embedder`]; [`LlmClassifier`] implements
//! [`affinity_core::Classifier`] on top of it. Every call has a timeout and
//! bounded retries. With the `none` provider every call fails fast, which
//! sends callers down their template fallbacks.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod error;
pub mod types;

pub use client::{LlmClassifier, LlmClient, LlmProvider, parse_sentiment};
pub use error::LlmError;
pub use types::{LlmRequest, LlmResponse};
