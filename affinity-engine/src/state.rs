//! Engine state container.
//!
//! Everything the scheduler tracks in process lives here, owned by one
//! [`EngineState`] per engine instance: interaction clocks, the set of users
//! who have written since startup, rolling conversation windows and
//! the mood tracker. Nothing in this crate keeps state in globals.

use std::collections::VecDeque;
use std::sync::Arc;

use affinity_core::metrics::AffinityCounters;
use affinity_core::{MoodTracker, UserId};
use chrono::{DateTime, Duration, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Conversation windows
// ---------------------------------------------------------------------------

/// Who wrote a window entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    /// The human.
    User,
    /// The agent.
    Agent,
}

/// One line of a rolling conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowEntry {
    /// Author.
    pub speaker: Speaker,
    /// Text as sent.
    pub text: String,
    /// When it was sent.
    pub at: DateTime<Utc>,
}

/// The tail of a finished conversation, used to seed a continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    /// Most recent user line.
    pub user_text: String,
    /// Most recent agent line.
    pub reply_text: String,
}

/// Last exchange of `window` if the agent spoke last and the user spoke at
/// all.
#[must_use]
pub fn closing_exchange(window: &VecDeque<WindowEntry>) -> Option<Exchange> {
    let last = window.back()?;
    if last.speaker != Speaker::Agent {
        return None;
    }
    let user = window.iter().rev().find(|e| e.speaker == Speaker::User)?;
    Some(Exchange {
        user_text: user.text.clone(),
        reply_text: last.text.clone(),
    })
}

// ---------------------------------------------------------------------------
// EngineState
// ---------------------------------------------------------------------------

/// Process-local scheduler state.
#[derive(Debug)]
pub struct EngineState {
    last_global_interaction: RwLock<Option<DateTime<Utc>>>,
    last_message: DashMap<UserId, DateTime<Utc>>,
    active: DashSet<UserId>,
    windows: DashMap<UserId, VecDeque<WindowEntry>>,
    display_names: DashMap<UserId, String>,
    window_limit: usize,
    window_keep: usize,
    /// Inbound message rate and current mood.
    pub mood: MoodTracker,
    /// Shared counters.
    pub counters: Arc<AffinityCounters>,
    /// Parent token for every loop.
    pub cancel: CancellationToken,
}

impl EngineState {
    /// Empty state. Windows longer than `window_limit` are trimmed to the
    /// newest `window_keep` entries.
    #[must_use]
    pub fn new(window_limit: usize, window_keep: usize, counters: Arc<AffinityCounters>) -> Self {
        Self {
            last_global_interaction: RwLock::new(None),
            last_message: DashMap::new(),
            active: DashSet::new(),
            windows: DashMap::new(),
            display_names: DashMap::new(),
            window_limit: window_limit.max(1),
            window_keep: window_keep.clamp(1, window_limit.max(1)),
            mood: MoodTracker::default(),
            counters,
            cancel: CancellationToken::new(),
        }
    }

    /// Record an inbound user message.
    pub fn note_inbound(&self, user: &UserId, display_name: &str, text: &str, at: DateTime<Utc>) {
        self.mood.record_message();
        self.last_message.insert(user.clone(), at);
        {
            let mut global = self.last_global_interaction.write();
            if global.is_none_or(|g| g < at) {
                *global = Some(at);
            }
        }
        self.active.insert(user.clone());
        if !display_name.is_empty() {
            self.display_names.insert(user.clone(), display_name.to_string());
        }
        self.push(user, Speaker::User, text, at);
    }

    /// Record the agent's reply to `user`.
    pub fn note_reply(&self, user: &UserId, text: &str, at: DateTime<Utc>) {
        self.push(user, Speaker::Agent, text, at);
    }

    fn push(&self, user: &UserId, speaker: Speaker, text: &str, at: DateTime<Utc>) {
        let mut window = self.windows.entry(user.clone()).or_default();
        window.push_back(WindowEntry {
            speaker,
            text: text.to_string(),
            at,
        });
        if window.len() > self.window_limit {
            let excess = window.len() - self.window_keep;
            window.drain(..excess);
        }
    }

    /// When anyone last talked to the agent.
    #[must_use]
    pub fn last_global_interaction(&self) -> Option<DateTime<Utc>> {
        *self.last_global_interaction.read()
    }

    /// Whether anyone talked to the agent within `window` of `now`.
    #[must_use]
    pub fn anyone_active_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.last_global_interaction().is_some_and(|t| now - t < window)
    }

    /// Users whose last message is older than `threshold`, with that time.
    #[must_use]
    pub fn idle_users(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<(UserId, DateTime<Utc>)> {
        self.last_message
            .iter()
            .filter(|e| now - *e.value() > threshold)
            .map(|e| (e.key().clone(), *e.value()))
            .collect()
    }

    /// Closing exchange of `user`'s current window.
    #[must_use]
    pub fn closing_exchange(&self, user: &UserId) -> Option<Exchange> {
        self.windows.get(user).and_then(|w| closing_exchange(&w))
    }

    /// Drop `user`'s window and last-message time, unless they wrote again
    /// after `seen_at`. Returns whether the conversation was closed.
    pub fn close_conversation(&self, user: &UserId, seen_at: DateTime<Utc>) -> bool {
        let closed = self.last_message.remove_if(user, |_, t| *t == seen_at).is_some();
        if closed {
            self.windows.remove(user);
        }
        closed
    }

    /// Current window for `user`, oldest first.
    #[must_use]
    pub fn window(&self, user: &UserId) -> Vec<WindowEntry> {
        self.windows
            .get(user)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Every user who has written since startup.
    #[must_use]
    pub fn active_users(&self) -> Vec<UserId> {
        self.active.iter().map(|u| u.key().clone()).collect()
    }

    /// Best known name for `user`, falling back to the id.
    #[must_use]
    pub fn display_name(&self, user: &UserId) -> String {
        self.display_names
            .get(user)
            .map_or_else(|| user.to_string(), |n| n.value().clone())
    }
}
