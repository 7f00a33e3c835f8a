//! The relationship ledger.
//!
//! Turns interaction signals into affection changes and owns every other
//! rule that moves the score: decay, streaks, jealousy. All writes go
//! through [`ProfileStore::update_profile`], so a live gain racing a decay
//! sweep cannot lose either update.
//!
//! Gain pipeline for one message:
//!
//! ```text
//! base(kind) + bonuses + behavior   → × mood → × streak → + random event → clamp
//! ```

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Timelike, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::behavior::{
    self, Behavior, LATE_NIGHT_BONUS, LONG_MESSAGE_BONUS, LONG_MESSAGE_CHARS, MIN_CLASSIFY_CHARS,
    SHARE_PERSONAL_BONUS, SHARED_INTEREST_BONUS,
};
use crate::catalog::{self, RandomEvent};
use crate::collaborators::Classifier;
use crate::config::{AffectionConfig, AffinityConfig};
use crate::decay::{advance_streak, decay_amount, streak_break_penalty, streak_multiplier};
use crate::error::Result;
use crate::mood::Mood;
use crate::store::ProfileStore;
use crate::tier::{Milestone, Tier};
use crate::types::{InteractionKind, InteractionSignal, UserId, UserProfile};

// ---------------------------------------------------------------------------
// Pure gain computation
// ---------------------------------------------------------------------------

/// Everything that feeds the deterministic part of a gain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainInputs {
    /// Addressing of the message.
    pub kind: InteractionKind,
    /// Message length in characters.
    pub text_chars: usize,
    /// Whether the user shared personal information.
    pub shared_personal: bool,
    /// Whether the message mentions a shared interest.
    pub shared_interest: bool,
    /// Whether the persona's local clock is in the late-night window.
    pub late_night: bool,
    /// Classified behavior.
    pub behavior: Behavior,
    /// Current mood.
    pub mood: Mood,
    /// Current streak length in days.
    pub streak: u32,
}

/// Affection change before the random event, truncating after each
/// multiplication.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn compute_gain(inputs: &GainInputs, max_streak_days: u32) -> i64 {
    let mut gain = behavior::base_gain(inputs.kind);
    if inputs.text_chars > LONG_MESSAGE_CHARS {
        gain += LONG_MESSAGE_BONUS;
    }
    if inputs.shared_personal {
        gain += SHARE_PERSONAL_BONUS;
    }
    if inputs.shared_interest {
        gain += SHARED_INTEREST_BONUS;
    }
    if inputs.late_night {
        gain += LATE_NIGHT_BONUS;
    }
    gain += inputs.behavior.adjustment();

    gain = (gain as f64 * inputs.mood.multiplier()) as i64;
    (gain as f64 * streak_multiplier(inputs.streak, max_streak_days)) as i64
}

/// Whether `hour` falls in the wrapping window `[start, end)`.
#[must_use]
pub fn is_late_night(hour: u32, start: u32, end: u32) -> bool {
    if start <= end {
        (start..end).contains(&hour)
    } else {
        hour >= start || hour < end
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of scoring one message.
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionOutcome {
    /// Classified behavior.
    pub behavior: Behavior,
    /// Change actually applied after clamping.
    pub delta: i64,
    /// Score after the change.
    pub affection: u32,
    /// Tier before the change.
    pub previous_tier: Tier,
    /// Tier after the change.
    pub tier: Tier,
    /// Milestone reached by this change, if any.
    pub milestone: Option<Milestone>,
    /// Random event that fired, if any.
    pub event: Option<RandomEvent>,
}

impl InteractionOutcome {
    /// Milestone text including its secret.
    #[must_use]
    pub fn milestone_text(&self) -> Option<String> {
        self.milestone.as_ref().map(Milestone::text)
    }

    /// Random event flavor line.
    #[must_use]
    pub fn event_text(&self) -> Option<&'static str> {
        self.event.map(|e| e.message)
    }
}

/// Result of advancing a daily streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakOutcome {
    /// Streak after the update.
    pub streak: u32,
    /// Whether a lapse reset the streak.
    pub broken: bool,
    /// Affection removed for the lapse (positive amount).
    pub penalty: i64,
    /// Whether this is the first interaction of the persona-local day.
    pub new_day: bool,
}

/// Result of a jealousy check that fired.
#[derive(Debug, Clone, PartialEq)]
pub struct JealousyOutcome {
    /// Line drawn from [`catalog::JEALOUSY_LINES`].
    pub message: &'static str,
    /// Change applied after clamping.
    pub delta: i64,
    /// Days since the last direct interaction.
    pub days_since: f64,
}

// ---------------------------------------------------------------------------
// RelationshipLedger
// ---------------------------------------------------------------------------

/// Scores interactions and applies every affection rule.
pub struct RelationshipLedger {
    store: Arc<dyn ProfileStore>,
    classifier: Arc<dyn Classifier>,
    config: AffectionConfig,
    offset: FixedOffset,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for RelationshipLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelationshipLedger")
            .field("config", &self.config)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl RelationshipLedger {
    /// Create a ledger over `store`, classifying with `classifier`.
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>, classifier: Arc<dyn Classifier>, config: &AffinityConfig) -> Self {
        Self {
            store,
            classifier,
            config: config.affection.clone(),
            offset: config.general.offset(),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Replace the random source with a seeded one.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    /// Current score and tier for `user` (zero for unknown users).
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn affection(&self, user: &UserId) -> Result<(u32, Tier)> {
        let score = self
            .store
            .get_profile(user)
            .await?
            .map_or(0, |p| p.affection);
        Ok((score, Tier::from_score(score)))
    }

    async fn classify(&self, text: &str) -> Behavior {
        if text.trim().chars().count() < MIN_CLASSIFY_CHARS {
            return Behavior::Neutral;
        }
        match self.classifier.classify(text).await {
            Ok(b) => b,
            Err(e) => {
                warn!(error = %e, "Classification failed, treating as neutral");
                Behavior::Neutral
            }
        }
    }

    fn roll_event(&self) -> Option<RandomEvent> {
        let mut rng = self.rng.lock();
        if self.config.random_event_chance > 0.0
            && rng.gen_bool(self.config.random_event_chance.min(1.0))
        {
            catalog::RANDOM_EVENTS.choose(&mut *rng).copied()
        } else {
            None
        }
    }

    fn pick(&self, lines: &'static [&'static str]) -> &'static str {
        lines.choose(&mut *self.rng.lock()).copied().unwrap_or_default()
    }

    /// Score one inbound message and apply it.
    ///
    /// The profile's interaction timestamps are updated in the same write.
    ///
    /// # Errors
    /// Returns a storage error; classifier failures count as neutral.
    pub async fn record_interaction(&self, user: &UserId, signal: &InteractionSignal) -> Result<InteractionOutcome> {
        let behavior = self.classify(&signal.text).await;
        let hour = signal.at.with_timezone(&self.offset).hour();
        let event = self.roll_event();
        let max_streak_days = self.config.max_streak_days;

        let mut inputs = GainInputs {
            kind: signal.kind,
            text_chars: signal.text.chars().count(),
            shared_personal: signal.shared_personal,
            shared_interest: behavior::has_shared_interest(&signal.text),
            late_night: is_late_night(
                hour,
                self.config.late_night_start_hour,
                self.config.late_night_end_hour,
            ),
            behavior,
            mood: signal.mood,
            streak: 0,
        };
        let at = signal.at;

        let mut outcome = None;
        self.store
            .update_profile(
                user,
                Box::new(|p: &mut UserProfile| {
                    inputs.streak = p.streak_count;
                    let total = compute_gain(&inputs, max_streak_days) + event.map_or(0, |e| e.amount);

                    let previous_tier = Tier::from_score(p.affection);
                    let delta = p.adjust_affection(total);
                    p.touch(at);
                    let tier = Tier::from_score(p.affection);

                    let milestone = if tier > previous_tier && delta > 0 {
                        tier.milestone()
                    } else {
                        None
                    };
                    outcome = Some(InteractionOutcome {
                        behavior,
                        delta,
                        affection: p.affection,
                        previous_tier,
                        tier,
                        milestone,
                        event,
                    });
                }),
            )
            .await?;

        // update_profile always runs the mutation on success.
        let outcome = outcome.ok_or_else(|| crate::AffinityError::UserNotFound(user.clone()))?;

        debug!(
            user = %user,
            delta = outcome.delta,
            affection = outcome.affection,
            behavior = ?outcome.behavior,
            mood = signal.mood.label(),
            "Recorded interaction"
        );
        if outcome.tier != outcome.previous_tier {
            info!(
                user = %user,
                from = %outcome.previous_tier,
                to = %outcome.tier,
                "Tier changed"
            );
        }
        Ok(outcome)
    }

    /// Apply inactivity decay for `days` since the last interaction.
    /// Returns the amount removed.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn apply_decay(&self, user: &UserId, days: f64) -> Result<i64> {
        if days.is_nan() || days < 1.0 {
            return Ok(0);
        }
        let mut removed = 0;
        self.store
            .update_profile(
                user,
                Box::new(|p: &mut UserProfile| {
                    let amount = decay_amount(p.affection, days);
                    removed = -p.adjust_affection(-amount);
                }),
            )
            .await?;
        if removed > 0 {
            debug!(user = %user, days, removed, "Applied affection decay");
        }
        Ok(removed)
    }

    /// Penalize a user who has been active elsewhere but silent towards the
    /// agent for at least the jealousy threshold.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn check_jealousy(&self, user: &UserId, now: DateTime<Utc>) -> Result<Option<JealousyOutcome>> {
        let Some(days_since) = self
            .store
            .get_profile(user)
            .await?
            .and_then(|p| p.days_since_interaction(now))
        else {
            return Ok(None);
        };
        if days_since < self.config.jealousy_threshold_days {
            return Ok(None);
        }

        let penalty = self.config.jealousy_penalty;
        let mut delta = 0;
        self.store
            .update_profile(
                user,
                Box::new(|p: &mut UserProfile| {
                    delta = p.adjust_affection(penalty);
                }),
            )
            .await?;

        let message = self.pick(catalog::JEALOUSY_LINES);
        info!(user = %user, days_since, delta, "Jealousy triggered");
        Ok(Some(JealousyOutcome {
            message,
            delta,
            days_since,
        }))
    }

    /// Advance the daily streak for an interaction at `now`.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn update_streak(&self, user: &UserId, now: DateTime<Utc>) -> Result<StreakOutcome> {
        let today = now.with_timezone(&self.offset).date_naive();
        let config = &self.config;
        let mut outcome = StreakOutcome {
            streak: 0,
            broken: false,
            penalty: 0,
            new_day: false,
        };
        self.store
            .update_profile(
                user,
                Box::new(|p: &mut UserProfile| {
                    let update = advance_streak(p.streak_count, p.last_streak_date, today);
                    outcome.new_day = p.last_streak_date != Some(today);
                    p.streak_count = update.streak;
                    p.last_streak_date = Some(today);
                    outcome.streak = update.streak;
                    if update.broken {
                        outcome.broken = true;
                        outcome.penalty = -p.adjust_affection(-streak_break_penalty(update.previous, config));
                    }
                }),
            )
            .await?;

        if outcome.broken {
            info!(user = %user, penalty = outcome.penalty, "Streak broken");
        }
        Ok(outcome)
    }

    /// Anniversary line for today, if any.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn anniversary_message(&self, user: &UserId, now: DateTime<Utc>) -> Result<Option<String>> {
        Ok(self
            .store
            .get_profile(user)
            .await?
            .and_then(|p| p.first_interaction_at)
            .and_then(|first| catalog::anniversary_message(first, now)))
    }

    /// A line acknowledging a large recent drop, if `recent_drop` is below
    /// the recovery threshold.
    #[must_use]
    pub fn recovery_arc(&self, recent_drop: i64) -> Option<&'static str> {
        if recent_drop < self.config.recovery_drop_threshold {
            Some(self.pick(catalog::RECOVERY_LINES))
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    struct Fixed(Behavior);

    #[async_trait]
    impl Classifier for Fixed {
        async fn classify(&self, _text: &str) -> Result<Behavior> {
            Ok(self.0)
        }
    }

    struct Failing;

    #[async_trait]
    impl Classifier for Failing {
        async fn classify(&self, _text: &str) -> Result<Behavior> {
            Err(crate::AffinityError::Classification("backend down".into()))
        }
    }

    fn quiet_config() -> AffinityConfig {
        let mut config = AffinityConfig::default();
        config.affection.random_event_chance = 0.0;
        config
    }

    fn ledger(store: Arc<MemoryProfileStore>, behavior: Behavior) -> RelationshipLedger {
        RelationshipLedger::new(store, Arc::new(Fixed(behavior)), &quiet_config()).with_seed(7)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 12, 0, 0).single().expect("valid date")
    }

    fn signal(text: &str, mood: Mood, at: DateTime<Utc>) -> InteractionSignal {
        InteractionSignal {
            kind: InteractionKind::Message,
            text: text.to_string(),
            shared_personal: false,
            mood,
            at,
        }
    }

    #[test]
    fn gain_pipeline_truncates_each_step() {
        let inputs = GainInputs {
            kind: InteractionKind::Mention,
            text_chars: 60,
            shared_personal: false,
            shared_interest: true,
            late_night: false,
            behavior: Behavior::Compliment,
            mood: Mood::Bored,
            streak: 15,
        };
        // (150 + 100 + 500 + 300) * 0.6 = 630, * 1.5 = 945
        assert_eq!(compute_gain(&inputs, 30), 945);
    }

    #[test]
    fn negative_gain_truncates_toward_zero() {
        let inputs = GainInputs {
            kind: InteractionKind::Message,
            text_chars: 5,
            shared_personal: false,
            shared_interest: false,
            late_night: false,
            behavior: Behavior::Rude,
            mood: Mood::Sleepy,
            streak: 0,
        };
        // (50 - 600) * 0.8 = -440
        assert_eq!(compute_gain(&inputs, 30), -440);
    }

    #[test]
    fn late_night_window_wraps_midnight() {
        assert!(is_late_night(23, 23, 4));
        assert!(is_late_night(0, 23, 4));
        assert!(is_late_night(3, 23, 4));
        assert!(!is_late_night(4, 23, 4));
        assert!(!is_late_night(22, 23, 4));
    }

    #[tokio::test]
    async fn compliment_crosses_into_casual_friend() {
        let store = Arc::new(MemoryProfileStore::new());
        let user = UserId::from("u1");
        let mut p = UserProfile::new(user.clone(), noon());
        p.affection = 19_900;
        store.insert_profile(p);

        let ledger = ledger(Arc::clone(&store), Behavior::Compliment);
        let out = ledger
            .record_interaction(&user, &signal("you're honestly so talented", Mood::Normal, noon()))
            .await
            .expect("record");

        assert_eq!(out.behavior.adjustment(), 300);
        // base message gain 50 + compliment 300
        assert_eq!(out.delta, 350);
        assert_eq!(out.affection, 20_250);
        assert_eq!(out.previous_tier, Tier::Acquaintance);
        assert_eq!(out.tier, Tier::CasualFriend);
        let text = out.milestone_text().expect("milestone");
        assert!(text.contains("look forward to talking to you"));
        assert!(text.contains("\n\n*"));
    }

    #[tokio::test]
    async fn short_text_is_not_classified() {
        let store = Arc::new(MemoryProfileStore::new());
        let ledger = ledger(Arc::clone(&store), Behavior::Rude);
        let out = ledger
            .record_interaction(&"u1".into(), &signal("ok", Mood::Normal, noon()))
            .await
            .expect("record");
        assert_eq!(out.behavior, Behavior::Neutral);
        assert_eq!(out.delta, 50);

        // Five characters, fifteen bytes.
        let out = ledger
            .record_interaction(&"u2".into(), &signal("すごいね！", Mood::Normal, noon()))
            .await
            .expect("record");
        assert_eq!(out.behavior, Behavior::Neutral);
        assert_eq!(out.delta, 50);
    }

    #[tokio::test]
    async fn classifier_failure_is_neutral() {
        let store = Arc::new(MemoryProfileStore::new());
        let ledger = RelationshipLedger::new(store, Arc::new(Failing), &quiet_config());
        let out = ledger
            .record_interaction(&"u1".into(), &signal("this is a longer message", Mood::Normal, noon()))
            .await
            .expect("record");
        assert_eq!(out.behavior, Behavior::Neutral);
    }

    #[tokio::test]
    async fn downward_change_never_fires_milestone() {
        let store = Arc::new(MemoryProfileStore::new());
        let user = UserId::from("u1");
        let mut p = UserProfile::new(user.clone(), noon());
        p.affection = 20_100;
        store.insert_profile(p);

        let ledger = ledger(Arc::clone(&store), Behavior::Rude);
        let out = ledger
            .record_interaction(&user, &signal("whatever, you are annoying", Mood::Normal, noon()))
            .await
            .expect("record");
        assert_eq!(out.tier, Tier::Acquaintance);
        assert!(out.milestone.is_none());
    }

    #[tokio::test]
    async fn random_events_add_after_multipliers() {
        let mut config = AffinityConfig::default();
        config.affection.random_event_chance = 1.0;
        let store = Arc::new(MemoryProfileStore::new());
        let ledger = RelationshipLedger::new(store, Arc::new(Fixed(Behavior::Neutral)), &config).with_seed(1);
        let out = ledger
            .record_interaction(&"u1".into(), &signal("hi", Mood::Bored, noon()))
            .await
            .expect("record");
        let event = out.event.expect("event fired");
        // 50 * 0.6 = 30, plus the event bonus untouched by mood
        assert_eq!(out.delta, 30 + event.amount);
        assert!(catalog::RANDOM_EVENTS.contains(&event));
    }

    #[tokio::test]
    async fn decay_respects_threshold_and_floor() {
        let store = Arc::new(MemoryProfileStore::new());
        let user = UserId::from("u1");
        let mut p = UserProfile::new(user.clone(), noon());
        p.affection = 100;
        store.insert_profile(p);
        let ledger = ledger(Arc::clone(&store), Behavior::Neutral);

        assert_eq!(ledger.apply_decay(&user, 0.9).await.expect("decay"), 0);
        // Stranger decays 150/day, floored at zero
        assert_eq!(ledger.apply_decay(&user, 2.0).await.expect("decay"), 100);
        assert_eq!(ledger.affection(&user).await.expect("get").0, 0);
    }

    #[tokio::test]
    async fn jealousy_fires_once_per_call_after_threshold() {
        let store = Arc::new(MemoryProfileStore::new());
        let user = UserId::from("u1");
        let mut p = UserProfile::new(user.clone(), noon());
        p.affection = 10_000;
        p.touch(noon());
        store.insert_profile(p);
        let ledger = ledger(Arc::clone(&store), Behavior::Neutral);

        let early = ledger
            .check_jealousy(&user, noon() + Duration::days(2))
            .await
            .expect("check");
        assert!(early.is_none());

        let out = ledger
            .check_jealousy(&user, noon() + Duration::hours(84))
            .await
            .expect("check")
            .expect("jealous");
        assert!(catalog::JEALOUSY_LINES.contains(&out.message));
        assert_eq!(out.delta, -100);
        assert!((out.days_since - 3.5).abs() < 1e-9);
        assert_eq!(ledger.affection(&user).await.expect("get").0, 9_900);
    }

    #[tokio::test]
    async fn jealousy_needs_a_prior_interaction() {
        let store = Arc::new(MemoryProfileStore::new());
        let ledger = ledger(store, Behavior::Neutral);
        assert!(ledger.check_jealousy(&"new".into(), noon()).await.expect("check").is_none());
    }

    #[tokio::test]
    async fn streak_extends_then_breaks_with_penalty() {
        let store = Arc::new(MemoryProfileStore::new());
        let user = UserId::from("u1");
        let mut p = UserProfile::new(user.clone(), noon());
        p.affection = 5_000;
        store.insert_profile(p);
        let ledger = ledger(Arc::clone(&store), Behavior::Neutral);

        let first = ledger.update_streak(&user, noon()).await.expect("streak");
        assert_eq!(first.streak, 1);
        assert!(first.new_day);
        let same_day = ledger.update_streak(&user, noon() + Duration::hours(3)).await.expect("streak");
        assert_eq!(same_day.streak, 1);
        assert!(!same_day.new_day);
        let next = ledger.update_streak(&user, noon() + Duration::days(1)).await.expect("streak");
        assert_eq!(next.streak, 2);

        let lapsed = ledger.update_streak(&user, noon() + Duration::days(5)).await.expect("streak");
        assert!(lapsed.broken);
        assert_eq!(lapsed.streak, 1);
        assert_eq!(lapsed.penalty, 100);
        assert_eq!(ledger.affection(&user).await.expect("get").0, 4_900);
    }

    #[tokio::test]
    async fn recovery_arc_threshold() {
        let ledger = ledger(Arc::new(MemoryProfileStore::new()), Behavior::Neutral);
        assert!(ledger.recovery_arc(-500).is_none());
        let line = ledger.recovery_arc(-501).expect("line");
        assert!(catalog::RECOVERY_LINES.contains(&line));
    }
}
