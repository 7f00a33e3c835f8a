//! Behavioral signals and the affection gain table.
//!
//! An external classifier labels each inbound message with one
//! [`Behavior`]. Positive behaviors raise affection, negative ones lower it,
//! and anything unrecognised is [`Behavior::Neutral`] and contributes zero.

use serde::{Deserialize, Serialize};

use crate::types::InteractionKind;

/// Messages shorter than this many characters are never classified.
pub const MIN_CLASSIFY_CHARS: usize = 10;

/// Messages longer than this earn the long-message bonus.
pub const LONG_MESSAGE_CHARS: usize = 50;

/// Bonus for a message longer than [`LONG_MESSAGE_CHARS`].
pub const LONG_MESSAGE_BONUS: i64 = 100;
/// Bonus for sharing personal information.
pub const SHARE_PERSONAL_BONUS: i64 = 300;
/// Bonus for mentioning a shared interest.
pub const SHARED_INTEREST_BONUS: i64 = 500;
/// Bonus for chatting late at night.
pub const LATE_NIGHT_BONUS: i64 = 150;

/// Interests the persona lights up about.
pub const SHARED_INTERESTS: &[&str] = &[
    "cosplay",
    "anime",
    "manga",
    "fashion",
    "photography",
    "sewing",
    "makeup",
    "gaming",
    "vtuber",
    "figures",
    "conventions",
    "crafting",
    "modeling",
    "design",
];

/// Base gain for an interaction, before bonuses.
#[must_use]
pub fn base_gain(kind: InteractionKind) -> i64 {
    match kind {
        InteractionKind::Message => 50,
        InteractionKind::Mention => 150,
        InteractionKind::DirectMessage => 200,
    }
}

/// Whether `text` mentions any shared interest (case-insensitive).
#[must_use]
pub fn has_shared_interest(text: &str) -> bool {
    let lower = text.to_lowercase();
    SHARED_INTERESTS.iter().any(|i| lower.contains(i))
}

/// Emotional tone of a message directed at the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    /// Praising or admiring.
    Compliment,
    /// Romantic interest.
    Flirty,
    /// Excited, positive energy.
    Enthusiastic,
    /// Caring or encouraging.
    Supportive,
    /// Follow-up questions, genuine interest.
    Curious,
    /// Teasing back, joking around.
    Playful,
    /// Expressing thanks.
    Grateful,
    /// Pet names, saying they miss the agent.
    Affectionate,
    /// Opening up about feelings or struggles.
    Vulnerable,
    /// Cold, short responses.
    Dismissive,
    /// One-word low-effort replies.
    DryResponse,
    /// Rushing the agent.
    Impatient,
    /// Sarcastic or backhanded.
    PassiveAggressive,
    /// Clearly not caring.
    Disinterested,
    /// Hostile or mean.
    Rude,
    /// Inappropriate, ignoring boundaries.
    Creepy,
    /// Ordinary chitchat, or anything the classifier couldn't place.
    Neutral,
}

impl Behavior {
    /// Parse a classifier label. Unknown labels map to `Neutral`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "compliment" => Self::Compliment,
            "flirty" => Self::Flirty,
            "enthusiastic" | "enthusiasm" => Self::Enthusiastic,
            "supportive" => Self::Supportive,
            "curious" => Self::Curious,
            "playful" => Self::Playful,
            "grateful" => Self::Grateful,
            "affectionate" => Self::Affectionate,
            "vulnerable" => Self::Vulnerable,
            "dismissive" => Self::Dismissive,
            "dry_response" | "dry-response" => Self::DryResponse,
            "impatient" => Self::Impatient,
            "passive_aggressive" | "passive-aggressive" => Self::PassiveAggressive,
            "disinterested" => Self::Disinterested,
            "rude" => Self::Rude,
            "creepy" => Self::Creepy,
            _ => Self::Neutral,
        }
    }

    /// Signed affection adjustment for this behavior.
    #[must_use]
    pub fn adjustment(self) -> i64 {
        match self {
            Self::Compliment => 300,
            Self::Flirty => 250,
            Self::Enthusiastic => 100,
            Self::Supportive => 300,
            Self::Curious => 150,
            Self::Playful => 150,
            Self::Grateful => 250,
            Self::Affectionate => 350,
            Self::Vulnerable => 400,
            Self::Dismissive => -200,
            Self::DryResponse => -75,
            Self::Impatient => -150,
            Self::PassiveAggressive => -350,
            Self::Disinterested => -250,
            Self::Rude => -600,
            Self::Creepy => -500,
            Self::Neutral => 0,
        }
    }

    /// Whether this behavior raises affection.
    #[must_use]
    pub fn is_positive(self) -> bool {
        self.adjustment() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_serde_names() {
        for label in ["compliment", "dry_response", "passive_aggressive", "creepy"] {
            let b = Behavior::from_label(label);
            let json = serde_json::to_string(&b).expect("serialize");
            assert_eq!(json, format!("\"{label}\""));
        }
    }

    #[test]
    fn unknown_labels_are_neutral() {
        assert_eq!(Behavior::from_label("ecstatic"), Behavior::Neutral);
        assert_eq!(Behavior::from_label(""), Behavior::Neutral);
        assert_eq!(Behavior::from_label("  Rude "), Behavior::Rude);
    }

    #[test]
    fn base_gains_are_ordered() {
        assert!(base_gain(InteractionKind::Message) < base_gain(InteractionKind::Mention));
        assert!(base_gain(InteractionKind::Mention) < base_gain(InteractionKind::DirectMessage));
    }

    #[test]
    fn shared_interest_is_case_insensitive() {
        assert!(has_shared_interest("Just finished my COSPLAY wig"));
        assert!(!has_shared_interest("went for a run"));
    }
}
