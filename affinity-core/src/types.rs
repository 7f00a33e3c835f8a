//! Core type definitions for the affinity system.
//!
//! Every persisted record is `serde`-serializable; the stores keep them as
//! JSON so the schema can grow without migrations.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Upper bound of the affection score. The lower bound is zero.
pub const MAX_AFFECTION: u32 = 100_000;

// ---------------------------------------------------------------------------
// Identity Types
// ---------------------------------------------------------------------------

/// Opaque identifier of a user, as assigned by the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    /// Wrap a transport-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier for queue records (reminders, delayed thoughts).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    /// Create a new random record ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Profile
// ---------------------------------------------------------------------------

/// A single remembered fact about a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    /// The fact itself. Uniqueness within a profile is by exact text.
    pub text: String,
    /// When the fact was learned (or last re-timestamped by consolidation).
    pub created_at: DateTime<Utc>,
}

impl Fact {
    /// Create a fact stamped at `now`.
    #[must_use]
    pub fn new(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            created_at: now,
        }
    }
}

/// The durable per-user relationship record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Owner of this profile.
    pub user_id: UserId,
    /// Known facts, in insertion order.
    #[serde(default)]
    pub facts: Vec<Fact>,
    /// Affection score in `[0, MAX_AFFECTION]`.
    #[serde(default)]
    pub affection: u32,
    /// Consecutive days with at least one interaction.
    #[serde(default)]
    pub streak_count: u32,
    /// Persona-local calendar day the streak was last advanced.
    #[serde(default)]
    pub last_streak_date: Option<NaiveDate>,
    /// First interaction ever recorded.
    #[serde(default)]
    pub first_interaction_at: Option<DateTime<Utc>>,
    /// Most recent direct interaction with the agent.
    #[serde(default)]
    pub last_interaction_at: Option<DateTime<Utc>>,
    /// Last time the fact list changed.
    pub last_updated: DateTime<Utc>,
}

impl UserProfile {
    /// A blank profile for a user seen for the first time.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            facts: Vec::new(),
            affection: 0,
            streak_count: 0,
            last_streak_date: None,
            first_interaction_at: None,
            last_interaction_at: None,
            last_updated: now,
        }
    }

    /// Apply a signed affection change, clamping to `[0, MAX_AFFECTION]`.
    ///
    /// Returns the change that was actually applied after clamping.
    pub fn adjust_affection(&mut self, delta: i64) -> i64 {
        let before = i64::from(self.affection);
        let after = (before + delta).clamp(0, i64::from(MAX_AFFECTION));
        self.affection = u32::try_from(after).unwrap_or(MAX_AFFECTION);
        after - before
    }

    /// Record a direct interaction at `now`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if self.first_interaction_at.is_none() {
            self.first_interaction_at = Some(now);
        }
        self.last_interaction_at = Some(now);
    }

    /// Fractional days since the last direct interaction, if there was one.
    #[must_use]
    pub fn days_since_interaction(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_interaction_at.map(|at| elapsed_days(at, now))
    }

    /// Texts of all live facts.
    #[must_use]
    pub fn fact_texts(&self) -> Vec<String> {
        self.facts.iter().map(|f| f.text.clone()).collect()
    }
}

/// Fractional days between two instants (negative spans count as zero).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn elapsed_days(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let secs = (to - from).num_seconds().max(0);
    secs as f64 / 86_400.0
}

// ---------------------------------------------------------------------------
// Engagement records
// ---------------------------------------------------------------------------

/// An unanswered proactive direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDm {
    /// Recipient.
    pub user_id: UserId,
    /// When the latest unanswered message was sent.
    pub sent_at: DateTime<Utc>,
    /// How many unanswered messages have been sent in a row.
    pub attempt_count: u32,
}

/// A follow-up thought scheduled after a conversation went idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedThought {
    /// Record identity.
    pub id: RecordId,
    /// Recipient.
    pub user_id: UserId,
    /// Short summary of the conversation it follows up on.
    pub summary: String,
    /// Last thing the user said (truncated).
    pub last_user_text: String,
    /// Last thing the agent replied (truncated).
    pub last_reply_text: String,
    /// When the thought becomes due.
    pub scheduled_at: DateTime<Utc>,
    /// When the thought was queued.
    pub created_at: DateTime<Utc>,
}

/// A one-shot reminder extracted from conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    /// Record identity.
    pub id: RecordId,
    /// Recipient.
    pub user_id: UserId,
    /// What to remind the user about.
    pub text: String,
    /// When the reminder should fire.
    pub due_at: DateTime<Utc>,
    /// When the reminder was created.
    pub created_at: DateTime<Utc>,
}

impl Reminder {
    /// Create a reminder due at `due_at`.
    #[must_use]
    pub fn new(
        user_id: UserId,
        text: impl Into<String>,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::new(),
            user_id,
            text: text.into(),
            due_at,
            created_at: now,
        }
    }
}

/// An archived or extracted fact in similarity-searchable memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMemoryItem {
    /// Owner.
    pub user_id: UserId,
    /// Original text.
    pub text: String,
    /// Embedding vector.
    pub embedding: Vec<f32>,
    /// When the item was archived.
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Interaction signals
// ---------------------------------------------------------------------------

/// Where an inbound message was addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionKind {
    /// A plain message in a shared channel.
    Message,
    /// A message in a shared channel that mentions the agent.
    Mention,
    /// A direct (private) message.
    DirectMessage,
}

impl InteractionKind {
    /// Whether this interaction happened in a direct context.
    #[must_use]
    pub fn is_direct(self) -> bool {
        matches!(self, Self::DirectMessage)
    }
}

/// Everything the ledger needs to score one inbound message.
#[derive(Debug, Clone)]
pub struct InteractionSignal {
    /// Addressing of the message.
    pub kind: InteractionKind,
    /// Raw message text.
    pub text: String,
    /// Whether the message shared personal information.
    pub shared_personal: bool,
    /// Agent mood at the time of the message.
    pub mood: crate::mood::Mood,
    /// When the message arrived.
    pub at: DateTime<Utc>,
}
