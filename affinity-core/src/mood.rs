//! Agent mood.
//!
//! Mood is a coarse global state derived from the local hour, weekday and
//! how many messages arrived since the last evaluation. It scales every
//! affection gain through [`Mood::multiplier`].

use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Weekday;
use parking_lot::RwLock;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Global mood of the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    /// Good mood, the default.
    #[default]
    Happy,
    /// Energetic and excitable.
    Hyper,
    /// Barely awake.
    Sleepy,
    /// Passive, hard to impress.
    Bored,
    /// Playful and forward.
    Flirty,
    /// Busy with something.
    Focused,
    /// Sentimental.
    Nostalgic,
    /// Teasing.
    Playful,
    /// Baseline.
    Normal,
}

impl Mood {
    /// Multiplier applied to affection gains in this mood.
    #[must_use]
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Hyper => 1.2,
            Self::Flirty => 1.5,
            Self::Sleepy => 0.8,
            Self::Bored => 0.6,
            Self::Nostalgic => 1.1,
            Self::Focused => 0.9,
            Self::Playful => 1.3,
            Self::Happy | Self::Normal => 1.0,
        }
    }

    /// Stored/display label.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Happy => "HAPPY",
            Self::Hyper => "HYPER",
            Self::Sleepy => "SLEEPY",
            Self::Bored => "BORED",
            Self::Flirty => "FLIRTY",
            Self::Focused => "FOCUSED",
            Self::Nostalgic => "NOSTALGIC",
            Self::Playful => "PLAYFUL",
            Self::Normal => "NORMAL",
        }
    }

    /// Parse a stored label, falling back to `Happy`.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "HYPER" => Self::Hyper,
            "SLEEPY" => Self::Sleepy,
            "BORED" => Self::Bored,
            "FLIRTY" => Self::Flirty,
            "FOCUSED" => Self::Focused,
            "NOSTALGIC" => Self::Nostalgic,
            "PLAYFUL" => Self::Playful,
            "NORMAL" => Self::Normal,
            _ => Self::Happy,
        }
    }
}

/// Pick a mood from recent message rate and the persona's local clock.
///
/// Rules are checked in priority order; the first that fires wins.
pub fn determine_mood<R: Rng + ?Sized>(
    message_rate: u32,
    hour: u32,
    weekday: Weekday,
    rng: &mut R,
) -> Mood {
    if hour < 3 {
        return Mood::Sleepy;
    }
    if message_rate > 20 {
        return Mood::Hyper;
    }
    if matches!(weekday, Weekday::Fri | Weekday::Sat) && (20..23).contains(&hour) && rng.gen_bool(0.4) {
        return Mood::Flirty;
    }
    let weekday_hours = !matches!(weekday, Weekday::Sat | Weekday::Sun);
    if weekday_hours
        && (10..18).contains(&hour)
        && (3..=10).contains(&message_rate)
        && rng.gen_bool(0.3)
    {
        return Mood::Focused;
    }
    if weekday == Weekday::Sun && (14..19).contains(&hour) && rng.gen_bool(0.25) {
        return Mood::Nostalgic;
    }
    if message_rate < 1 && hour > 10 && hour < 20 {
        return Mood::Bored;
    }
    if (20..23).contains(&hour) && message_rate >= 5 && rng.gen_bool(0.3) {
        return Mood::Flirty;
    }
    Mood::Happy
}

/// Current mood plus the inbound message counter that feeds it.
#[derive(Debug, Default)]
pub struct MoodTracker {
    current: RwLock<Mood>,
    counter: AtomicU32,
}

impl MoodTracker {
    /// Start in `mood`.
    #[must_use]
    pub fn new(mood: Mood) -> Self {
        Self {
            current: RwLock::new(mood),
            counter: AtomicU32::new(0),
        }
    }

    /// Count one inbound message.
    pub fn record_message(&self) {
        self.counter.fetch_add(1, Ordering::Relaxed);
    }

    /// The current mood.
    #[must_use]
    pub fn current(&self) -> Mood {
        *self.current.read()
    }

    /// Take and reset the message counter.
    pub fn take_rate(&self) -> u32 {
        self.counter.swap(0, Ordering::Relaxed)
    }

    /// Replace the mood, returning `true` if it changed.
    pub fn set(&self, mood: Mood) -> bool {
        let mut current = self.current.write();
        let changed = *current != mood;
        *current = mood;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn early_hours_are_sleepy_regardless_of_rate() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(determine_mood(100, 1, Weekday::Mon, &mut rng), Mood::Sleepy);
    }

    #[test]
    fn high_rate_is_hyper() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(determine_mood(21, 12, Weekday::Tue, &mut rng), Mood::Hyper);
    }

    #[test]
    fn quiet_daytime_is_bored() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(determine_mood(0, 15, Weekday::Wed, &mut rng), Mood::Bored);
    }

    #[test]
    fn default_is_happy() {
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(determine_mood(2, 8, Weekday::Thu, &mut rng), Mood::Happy);
    }

    #[test]
    fn tracker_counts_and_resets() {
        let tracker = MoodTracker::new(Mood::Happy);
        tracker.record_message();
        tracker.record_message();
        assert_eq!(tracker.take_rate(), 2);
        assert_eq!(tracker.take_rate(), 0);
        assert!(tracker.set(Mood::Bored));
        assert!(!tracker.set(Mood::Bored));
        assert_eq!(tracker.current(), Mood::Bored);
    }

    #[test]
    fn multipliers_stay_in_range() {
        for mood in [
            Mood::Happy,
            Mood::Hyper,
            Mood::Sleepy,
            Mood::Bored,
            Mood::Flirty,
            Mood::Focused,
            Mood::Nostalgic,
            Mood::Playful,
            Mood::Normal,
        ] {
            let m = mood.multiplier();
            assert!((0.6..=1.5).contains(&m));
            assert_eq!(Mood::from_label(mood.label()), mood);
        }
    }
}
