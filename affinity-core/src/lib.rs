//! # Affinity Core Library
//!
//! Long-lived relationship state between a conversational agent and its
//! users.
//!
//! - **Ledger**: a bounded affection score per user, split into ten tiers,
//!   moved by interactions, inactivity decay, daily streaks and jealousy.
//! - **Facts**: what the agent remembers about each user. Old facts age
//!   out into similarity-searchable vector memory and crowded fact lists
//!   are consolidated by a generator.
//! - **Storage**: a [`ProfileStore`] with atomic per-user updates, backed
//!   by SQLite or by in-process maps.
//!
//! Network-facing collaborators (classifier, generator, embedder, message
//! transport) are traits in [`collaborators`]; `affinity-llm` provides
//! HTTP implementations.

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod behavior;
pub mod catalog;
pub mod collaborators;
pub mod config;
pub mod decay;
pub mod embedding;
pub mod error;
pub mod extraction;
pub mod facts;
pub mod ledger;
pub mod metrics;
pub mod mood;
pub mod prompt;
pub mod store;
pub mod tier;
pub mod types;
pub mod vector;

pub use behavior::Behavior;
pub use collaborators::{ChatMessage, Classifier, Embedder, Generator, Role, Transport};
pub use config::AffinityConfig;
pub use error::{AffinityError, Result};
pub use facts::{FactLifecycleManager, MaintenanceReport};
pub use ledger::{InteractionOutcome, RelationshipLedger};
pub use metrics::AffinityCounters;
pub use mood::{Mood, MoodTracker};
pub use prompt::{PromptEngine, PromptId};
pub use store::{KeyedLocks, MemoryProfileStore, ProfileStore, SqliteProfileStore};
pub use tier::Tier;
pub use types::*;
pub use vector::{InMemoryVectorMemory, ScoredMemory, VectorMemory};
