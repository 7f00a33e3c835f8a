//! # affinity-engine: Engagement Scheduling
//!
//! Drives the relationship ledger and fact lifecycle from `affinity-core`
//! against a live chat: scores inbound messages, remembers conversations,
//! and decides when the agent should message someone first.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               chat transport                 │
//! └───────▲──────────────────────────┬───────────┘
//!         │ send_direct_message      │ handle_inbound / record_reply
//! ┌───────┴──────────────────────────▼───────────┐
//! │  Engine                                      │
//! │  ┌─────────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ EngineState │ │  loops   │ │ WorkerPool│  │
//! │  └─────────────┘ └────┬─────┘ └───────────┘  │
//! │                       ▼                      │
//! │   RelationshipLedger · FactLifecycleManager  │
//! │              ProfileStore · VectorMemory     │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `engine`: inbound orchestration and every periodic tick
//! - `loops`: cancellable timers driving the ticks
//! - `outreach`: who may be messaged, backoff schedule
//! - `state`: process-local state container
//! - `pool`: bounded per-user concurrency

#![deny(clippy::unwrap_used)]
#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod engine;
pub mod loops;
pub mod outreach;
pub mod pool;
pub mod state;

pub use engine::{Collaborators, Engine, InboundMessage, InboundOutcome};
pub use pool::WorkerPool;
pub use state::{EngineState, Exchange, Speaker};

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber filtered at `level` (overridable
/// through `RUST_LOG`). Emits JSON lines when `json` is set.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing(level: &str, json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.is_ok()
}
