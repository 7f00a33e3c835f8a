//! Eligibility rules for unsolicited messages.
//!
//! Pure functions over store snapshots. The loops in [`crate::engine`] load
//! the records, these decide who may be messaged, and the loops pick one at
//! random.
//!
//! Pending DM state machine:
//!
//! ```text
//! None ──send──▶ Pending(1) ──backoff elapsed, reselected──▶ Pending(2) ─ … ─▶ Pending(4)
//!   ▲                │                                                          │
//!   └── DM reply ────┴────────────────────── DM reply ──────────────────────────┘
//! ```
//!
//! `Pending(max)` never becomes eligible again on time alone.

use std::collections::HashSet;

use affinity_core::config::{LonelinessConfig, ProactiveConfig};
use affinity_core::{PendingDm, UserId, UserProfile};
use chrono::{DateTime, Duration, Utc};

/// Hours to wait after the n-th unanswered check-in.
#[must_use]
pub fn backoff_hours(attempt: u32) -> i64 {
    match attempt {
        0 | 1 => 24,
        2 => 48,
        3 => 96,
        _ => 168,
    }
}

/// Backoff after the n-th unanswered check-in.
#[must_use]
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    Duration::hours(backoff_hours(attempt))
}

/// Whether an outstanding DM may be followed up at `now`.
#[must_use]
pub fn pending_eligible(pending: &PendingDm, now: DateTime<Utc>, max_attempts: u32) -> bool {
    pending.attempt_count < max_attempts && now - pending.sent_at > backoff_for_attempt(pending.attempt_count)
}

/// Loneliness candidates: outstanding DMs whose backoff elapsed, plus
/// users with nothing outstanding who have been quiet past the
/// inactivity threshold. Users who never interacted are not candidates.
#[must_use]
pub fn loneliness_candidates(
    pending: &[PendingDm],
    profiles: &[UserProfile],
    now: DateTime<Utc>,
    config: &LonelinessConfig,
) -> Vec<UserId> {
    let mut candidates: Vec<UserId> = pending
        .iter()
        .filter(|p| pending_eligible(p, now, config.max_dm_attempts))
        .map(|p| p.user_id.clone())
        .collect();

    let outstanding: HashSet<&UserId> = pending.iter().map(|p| &p.user_id).collect();
    let threshold = hours(config.inactivity_threshold_hours);
    candidates.extend(
        profiles
            .iter()
            .filter(|p| !outstanding.contains(&p.user_id))
            .filter(|p| p.last_interaction_at.is_some_and(|t| now - t >= threshold))
            .map(|p| p.user_id.clone()),
    );
    candidates
}

/// Proactive candidates: close enough, nothing outstanding, and not
/// talked to recently.
#[must_use]
pub fn proactive_candidates(
    pending: &[PendingDm],
    profiles: &[UserProfile],
    now: DateTime<Utc>,
    config: &ProactiveConfig,
) -> Vec<UserId> {
    let outstanding: HashSet<&UserId> = pending.iter().map(|p| &p.user_id).collect();
    let recent = hours(config.recent_activity_hours);
    profiles
        .iter()
        .filter(|p| p.affection >= config.min_affection)
        .filter(|p| !outstanding.contains(&p.user_id))
        .filter(|p| p.last_interaction_at.is_none_or(|t| now - t >= recent))
        .map(|p| p.user_id.clone())
        .collect()
}

/// How long ago a conversation was, in the persona's words.
#[must_use]
pub fn time_context(since: Duration) -> &'static str {
    if since >= Duration::hours(12) {
        "a while ago"
    } else if since >= Duration::hours(6) {
        "earlier today"
    } else {
        "a little bit ago"
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn hours(h: f64) -> Duration {
    Duration::seconds((h * 3600.0).round() as i64)
}
