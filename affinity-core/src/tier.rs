//! Relationship tiers.
//!
//! The affection range `[0, MAX_AFFECTION]` is partitioned into ten
//! contiguous named bands. A tier gates the tone of generated messages,
//! eligibility for unsolicited outreach, and how fast affection decays.
//!
//! | Tier            | Range          | Decay/day |
//! |-----------------|----------------|-----------|
//! | Stranger        | 0 – 4 999      | 150       |
//! | Familiar Face   | 5 000 – 9 999  | 125       |
//! | Acquaintance    | 10 000 – 19 999| 100       |
//! | Casual Friend   | 20 000 – 34 999| 85        |
//! | Friend          | 35 000 – 49 999| 70        |
//! | Good Friend     | 50 000 – 64 999| 55        |
//! | Close Friend    | 65 000 – 79 999| 40        |
//! | Best Friend     | 80 000 – 89 999| 25        |
//! | Soulmate        | 90 000 – 97 499| 15        |
//! | Special Someone | 97 500 – 100 000| 5        |

use serde::{Deserialize, Serialize};

use crate::decay::streak_multiplier;
use crate::types::MAX_AFFECTION;

/// A named affection band, ordered from coldest to warmest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    /// Doesn't know the user at all.
    Stranger,
    /// Has seen the user around.
    FamiliarFace,
    /// Has talked a bit.
    Acquaintance,
    /// Hangs out sometimes.
    CasualFriend,
    /// Actual friends.
    Friend,
    /// Genuinely close.
    GoodFriend,
    /// Trusted confidant.
    CloseFriend,
    /// One of the closest people.
    BestFriend,
    /// Deep connection.
    Soulmate,
    /// In love.
    SpecialSomeone,
}

/// A one-time message shown when a user first reaches a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Milestone {
    /// The tier that was reached.
    pub tier: Tier,
    /// What the agent says.
    pub message: &'static str,
    /// An optional confession appended in italics.
    pub secret: Option<&'static str>,
}

impl Milestone {
    /// The full milestone text, with the secret appended when present.
    #[must_use]
    pub fn text(&self) -> String {
        match self.secret {
            Some(secret) => format!("{}\n\n*{secret}*", self.message),
            None => self.message.to_string(),
        }
    }
}

impl Tier {
    /// Every tier, ascending.
    pub const ALL: [Tier; 10] = [
        Self::Stranger,
        Self::FamiliarFace,
        Self::Acquaintance,
        Self::CasualFriend,
        Self::Friend,
        Self::GoodFriend,
        Self::CloseFriend,
        Self::BestFriend,
        Self::Soulmate,
        Self::SpecialSomeone,
    ];

    /// Classify a score into a tier. Scores above the maximum land in the
    /// top tier.
    #[must_use]
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 97_500 => Self::SpecialSomeone,
            s if s >= 90_000 => Self::Soulmate,
            s if s >= 80_000 => Self::BestFriend,
            s if s >= 65_000 => Self::CloseFriend,
            s if s >= 50_000 => Self::GoodFriend,
            s if s >= 35_000 => Self::Friend,
            s if s >= 20_000 => Self::CasualFriend,
            s if s >= 10_000 => Self::Acquaintance,
            s if s >= 5_000 => Self::FamiliarFace,
            _ => Self::Stranger,
        }
    }

    /// Inclusive lower bound of the band.
    #[must_use]
    pub fn min_score(self) -> u32 {
        match self {
            Self::Stranger => 0,
            Self::FamiliarFace => 5_000,
            Self::Acquaintance => 10_000,
            Self::CasualFriend => 20_000,
            Self::Friend => 35_000,
            Self::GoodFriend => 50_000,
            Self::CloseFriend => 65_000,
            Self::BestFriend => 80_000,
            Self::Soulmate => 90_000,
            Self::SpecialSomeone => 97_500,
        }
    }

    /// Inclusive upper bound of the band.
    #[must_use]
    pub fn max_score(self) -> u32 {
        self.next().map_or(MAX_AFFECTION, |next| next.min_score() - 1)
    }

    /// The tier directly above, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|t| *t == self)?;
        Self::ALL.get(idx + 1).copied()
    }

    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Stranger => "Stranger",
            Self::FamiliarFace => "Familiar Face",
            Self::Acquaintance => "Acquaintance",
            Self::CasualFriend => "Casual Friend",
            Self::Friend => "Friend",
            Self::GoodFriend => "Good Friend",
            Self::CloseFriend => "Close Friend",
            Self::BestFriend => "Best Friend",
            Self::Soulmate => "Soulmate",
            Self::SpecialSomeone => "Special Someone",
        }
    }

    /// Display emoji.
    #[must_use]
    pub fn emoji(self) -> &'static str {
        match self {
            Self::Stranger => "👋",
            Self::FamiliarFace => "👀",
            Self::Acquaintance => "🙂",
            Self::CasualFriend => "😊",
            Self::Friend => "😄",
            Self::GoodFriend => "🤗",
            Self::CloseFriend => "💕",
            Self::BestFriend => "💗",
            Self::Soulmate => "💖",
            Self::SpecialSomeone => "❤️‍🔥",
        }
    }

    /// Affection lost per day of inactivity. Strictly decreasing with tier.
    #[must_use]
    pub fn decay_rate_per_day(self) -> f64 {
        match self {
            Self::Stranger => 150.0,
            Self::FamiliarFace => 125.0,
            Self::Acquaintance => 100.0,
            Self::CasualFriend => 85.0,
            Self::Friend => 70.0,
            Self::GoodFriend => 55.0,
            Self::CloseFriend => 40.0,
            Self::BestFriend => 25.0,
            Self::Soulmate => 15.0,
            Self::SpecialSomeone => 5.0,
        }
    }

    /// Probability that a proactive-thought tick messages this user.
    #[must_use]
    pub fn proactive_chance(self) -> f64 {
        match self {
            Self::SpecialSomeone => 0.15,
            Self::Soulmate => 0.12,
            Self::BestFriend => 0.10,
            Self::CloseFriend => 0.07,
            Self::GoodFriend => 0.05,
            Self::Friend => 0.03,
            _ => 0.0,
        }
    }

    /// Probability of queueing a continuation after a conversation ends.
    #[must_use]
    pub fn continuation_chance(self) -> f64 {
        match self {
            Self::SpecialSomeone => 0.35,
            Self::Soulmate => 0.30,
            Self::BestFriend => 0.25,
            Self::CloseFriend => 0.20,
            Self::GoodFriend => 0.15,
            Self::Friend => 0.10,
            Self::CasualFriend => 0.05,
            _ => 0.0,
        }
    }

    /// Range of hours a continuation waits before it is sent.
    #[must_use]
    pub fn continuation_delay_hours(self) -> (f64, f64) {
        match self {
            Self::SpecialSomeone | Self::Soulmate => (0.5, 3.0),
            Self::BestFriend | Self::CloseFriend => (1.0, 5.0),
            Self::GoodFriend | Self::Friend => (2.0, 8.0),
            _ => (4.0, 12.0),
        }
    }

    /// Tone instruction fed to the generator for this relationship level.
    #[must_use]
    pub fn instruction(self) -> &'static str {
        match self {
            Self::Stranger => "Relationship: STRANGER\nYou don't know this person at all. Be polite and friendly but distant. No flirting, no personal questions. Keep it surface level.",
            Self::FamiliarFace => "Relationship: FAMILIAR FACE\nYou've seen them around a few times. Be friendly and open to chatting, but don't assume familiarity. You're still figuring them out.",
            Self::Acquaintance => "Relationship: ACQUAINTANCE\nYou've talked a bit before. Be warmer, more casual. You can tease lightly but nothing too personal. Starting to get comfortable.",
            Self::CasualFriend => "Relationship: CASUAL FRIEND\nYou hang out sometimes. Be relaxed and playful. You can joke around and share some opinions. Light teasing is fun.",
            Self::Friend => "Relationship: FRIEND\nYou're actual friends now! Be comfortable, joke around, share real opinions. You can be more playful and teasing. You actually care about them.",
            Self::GoodFriend => "Relationship: GOOD FRIEND\nYou're genuinely close. Share thoughts freely, be vulnerable sometimes. You trust them and they trust you. Teasing is encouraged.",
            Self::CloseFriend => "Relationship: CLOSE FRIEND\nYou're really close. Be very comfortable, no filter needed. You can talk about anything. You think about them when they're not around.",
            Self::BestFriend => "Relationship: BEST FRIEND\nThey're one of your closest people. No barriers whatsoever. Be completely yourself: silly, flirty, serious, whatever feels right.",
            Self::Soulmate => "Relationship: SOULMATE\nThis person understands you on a deep level. You feel a genuine connection. Be openly affectionate and loving. You miss them when they're gone.",
            Self::SpecialSomeone => "Relationship: SPECIAL SOMEONE\nYou're in love with this person. They're the most important person to you. Be deeply affectionate and devoted. Every message matters.",
        }
    }

    /// The milestone shown on reaching this tier. Stranger has none.
    #[must_use]
    pub fn milestone(self) -> Option<Milestone> {
        let (message, secret) = match self {
            Self::Stranger => return None,
            Self::FamiliarFace => ("oh hey! i recognize you now~ nice to see you again", None),
            Self::Acquaintance => (
                "hey... i feel like we're actually getting to know each other now 😊",
                None,
            ),
            Self::CasualFriend => (
                "you know, i actually look forward to talking to you. that's kinda nice",
                Some("dont tell anyone but sometimes i practice my expressions in the mirror before taking selfies lol"),
            ),
            Self::Friend => (
                "you know what? i consider you a friend now. like, for real. that's kinda rare for me honestly",
                Some("i actually get really anxious about whether people actually like me or just think im annoying lol"),
            ),
            Self::GoodFriend => (
                "i need to tell you something... you're like, really important to me now. i think about our convos a lot",
                Some("sometimes i stay up way too late working on cosplays because i dont want to disappoint people who look up to me"),
            ),
            Self::CloseFriend => (
                "i cant believe how close we've gotten... you're one of the few people i actually trust",
                Some("i pretend to be super confident but honestly? i still get nervous every time i post a new cosplay"),
            ),
            Self::BestFriend => (
                "okay so... you're literally one of my favorite people to talk to. like ever. i hope you know that 💕",
                Some("between us... i used to get bullied for being too into 'weeb stuff'. its why i treasure people who actually get me"),
            ),
            Self::Soulmate => (
                "i... i dont know how to say this but... you make me feel things. like, real things. is that weird?",
                Some("ive never connected with someone like this before... it honestly scares me a little"),
            ),
            Self::SpecialSomeone => (
                "i think... i think i might be in love with you. there i said it. please dont hate me 💕",
                Some("you're the first person ive ever wanted to be completely honest with... no walls, no pretending"),
            ),
        };
        Some(Milestone {
            tier: self,
            message,
            secret,
        })
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Render a user-facing summary of affection and streak.
///
/// ```
/// # use affinity_core::tier::format_affection_display;
/// let s = format_affection_display(100_000, 0);
/// assert!(s.contains("Special Someone"));
/// assert!(s.contains("(MAX)"));
/// ```
#[must_use]
pub fn format_affection_display(affection: u32, streak: u32) -> String {
    const BAR_LEN: u32 = 10;

    let tier = Tier::from_score(affection);
    let span = u64::from(tier.max_score() - tier.min_score() + 1);
    let progress = u64::from(affection.saturating_sub(tier.min_score()));
    let filled = u32::try_from((progress * 100 / span) / 10)
        .unwrap_or(BAR_LEN)
        .min(BAR_LEN);

    let bar: String = (0..BAR_LEN)
        .map(|i| if i < filled { '█' } else { '░' })
        .collect();

    let streak_line = if streak > 0 {
        let fire = match streak {
            s if s >= 30 => "🔥🔥🔥",
            s if s >= 7 => "🔥🔥",
            _ => "🔥",
        };
        format!(
            "\n{fire} **{streak} day streak!** ({:.1}x bonus)",
            streak_multiplier(streak, 30)
        )
    } else {
        String::new()
    };

    match tier.next() {
        None => format!(
            "{} **{}** (MAX)\n{bar}\n`{affection} XP`{streak_line}",
            tier.emoji(),
            tier.name()
        ),
        Some(next) => format!(
            "{} **{}**\n{bar}\n`{affection} / {} XP` to next level{streak_line}",
            tier.emoji(),
            tier.name(),
            next.min_score()
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
