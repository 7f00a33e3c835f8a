//! Affection decay and daily streaks.
//!
//! Inactivity erodes affection linearly at a per-tier rate:
//!   decay = floor(rate(tier) * days)
//!
//! Higher tiers decay slower, so investment in a relationship is sticky.
//! Streaks reward daily contact with a multiplier on every gain:
//!   m(s) = min(1 + s / 30, 2.0)
//! and punish a lapse with `min(s * 50, 2500)` of lost affection.

use chrono::NaiveDate;

use crate::config::AffectionConfig;
use crate::tier::Tier;

/// Affection lost after `days` of inactivity at score `affection`.
///
/// Returns 0 for spans shorter than one day. The result never exceeds the
/// current score.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn decay_amount(affection: u32, days: f64) -> i64 {
    if days.is_nan() || days < 1.0 {
        return 0;
    }
    let rate = Tier::from_score(affection).decay_rate_per_day();
    let raw = (rate * days).floor();
    if raw >= f64::from(affection) {
        i64::from(affection)
    } else {
        raw as i64
    }
}

/// Gain multiplier for a streak of `streak` days, saturating at `max_days`.
#[must_use]
pub fn streak_multiplier(streak: u32, max_days: u32) -> f64 {
    if streak == 0 || max_days == 0 {
        return 1.0;
    }
    if streak >= max_days {
        return 2.0;
    }
    (1.0 + f64::from(streak) / f64::from(max_days)).min(2.0)
}

/// Penalty (as a positive amount) for losing a streak of `previous` days.
#[must_use]
pub fn streak_break_penalty(previous: u32, config: &AffectionConfig) -> i64 {
    (i64::from(previous) * config.streak_break_penalty_per_day)
        .min(config.max_streak_break_penalty)
}

/// Outcome of advancing a streak to a new calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    /// Streak length after the update.
    pub streak: u32,
    /// Streak length before the update.
    pub previous: u32,
    /// Whether a lapse reset the streak.
    pub broken: bool,
}

/// Advance a streak given the last streak day and today.
///
/// Same day leaves it untouched, the next day extends it, and any longer
/// gap resets it to one.
#[must_use]
pub fn advance_streak(current: u32, last: Option<NaiveDate>, today: NaiveDate) -> StreakUpdate {
    let Some(last) = last else {
        return StreakUpdate {
            streak: 1,
            previous: current,
            broken: false,
        };
    };

    let gap = (today - last).num_days();
    match gap {
        g if g <= 0 => StreakUpdate {
            streak: current,
            previous: current,
            broken: false,
        },
        1 => StreakUpdate {
            streak: current.saturating_add(1),
            previous: current,
            broken: false,
        },
        _ => StreakUpdate {
            streak: 1,
            previous: current,
            broken: true,
        },
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
