//! The engagement engine.
//!
//! Wires the ledger, the fact lifecycle and the stores to a transport, and
//! owns every decision to message a user first. Each periodic process is a
//! `*_tick(now)` method; [`crate::loops`] drives them on timers.
//!
//! ## Loops
//!
//! | Loop           | Cadence (default) | Work                                         |
//! |----------------|-------------------|----------------------------------------------|
//! | Decay          | 6 h               | Tier decay for everyone who ever interacted  |
//! | Loneliness     | 1 h               | Backoff-gated check-in DM                    |
//! | Proactive      | 2 h               | Probability-gated spontaneous DM             |
//! | Continuation   | 5 min             | Deliver due follow-up thoughts               |
//! | Idle sweep     | 1 min             | Close idle conversations, queue follow-ups   |
//! | Maintenance    | 24 h              | Archive and consolidate facts                |
//! | Reminders      | 1 min             | Deliver due reminders, retry failures        |
//! | Cleanup        | 1 h               | Drop reminders past retention                |
//! | Mood           | 5 min             | Re-evaluate the global mood                  |

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike, Utc};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use affinity_core::catalog::{self, HIGH_AFFECTION_TEMPLATES, PROACTIVE_TEMPLATES};
use affinity_core::extraction::{clean_summary, truncate_chars};
use affinity_core::facts::format_fact_list;
use affinity_core::ledger::{JealousyOutcome, StreakOutcome};
use affinity_core::mood::determine_mood;
use affinity_core::{
    AffinityConfig, AffinityCounters, AffinityError, ChatMessage, Classifier, DelayedThought, Embedder,
    FactLifecycleManager, Generator, InteractionKind, InteractionOutcome, InteractionSignal, KeyedLocks, Mood,
    ProfileStore, PromptEngine, PromptId, RecordId, RelationshipLedger, Reminder, Result, Tier, Transport, UserId,
    UserProfile, VectorMemory,
};

use crate::outreach::{hours, loneliness_candidates, proactive_candidates, time_context};
use crate::pool::WorkerPool;
use crate::state::{EngineState, Exchange};

/// State key holding the persisted mood label.
pub const MOOD_STATE_KEY: &str = "mood";

/// Summary used when the generator cannot summarize an exchange.
pub const FALLBACK_SUMMARY: &str = "general chat";

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// External services the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    /// Profiles, pending DMs, thoughts, reminders and state.
    pub store: Arc<dyn ProfileStore>,
    /// Archive for aged facts.
    pub vector: Arc<dyn VectorMemory>,
    /// Behavior classifier for inbound text.
    pub classifier: Arc<dyn Classifier>,
    /// Text generator for outreach and extraction.
    pub generator: Arc<dyn Generator>,
    /// Embedder for archival and recall.
    pub embedder: Arc<dyn Embedder>,
    /// Outbound delivery.
    pub transport: Arc<dyn Transport>,
}

/// One inbound chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Sender.
    pub user: UserId,
    /// Sender's display name.
    pub display_name: String,
    /// Message text.
    pub text: String,
    /// Where the message was addressed.
    pub kind: InteractionKind,
    /// Whether the message shared personal information.
    pub shared_personal: bool,
}

impl InboundMessage {
    /// A message that shares nothing personal.
    #[must_use]
    pub fn new(
        user: impl Into<UserId>,
        display_name: impl Into<String>,
        text: impl Into<String>,
        kind: InteractionKind,
    ) -> Self {
        Self {
            user: user.into(),
            display_name: display_name.into(),
            text: text.into(),
            kind,
            shared_personal: false,
        }
    }

    /// Mark the message as sharing personal information.
    #[must_use]
    pub fn sharing_personal(mut self) -> Self {
        self.shared_personal = true;
        self
    }
}

/// Everything that happened while handling one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundOutcome {
    /// Ledger result.
    pub interaction: InteractionOutcome,
    /// Streak update.
    pub streak: StreakOutcome,
    /// Whether a pending DM was answered by this message.
    pub cleared_pending_dm: bool,
    /// Anniversary line for the first message of the day.
    pub anniversary: Option<String>,
    /// Acknowledgement of a large drop.
    pub recovery: Option<&'static str>,
}

impl InboundOutcome {
    /// Lines to append to the agent's reply, in display order.
    #[must_use]
    pub fn notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        notes.extend(self.interaction.milestone_text());
        notes.extend(self.interaction.event_text().map(str::to_string));
        notes.extend(self.anniversary.clone());
        notes.extend(self.recovery.map(str::to_string));
        notes
    }
}

/// Name, tier and known facts used to address a user.
struct Recipient {
    name: String,
    tier: Tier,
    affection: u32,
    facts: String,
}

impl Recipient {
    fn new(profile: &UserProfile, name: String) -> Self {
        Self {
            name,
            tier: Tier::from_score(profile.affection),
            affection: profile.affection,
            facts: format_fact_list(&profile.fact_texts()),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The engagement scheduler and inbound orchestrator.
pub struct Engine {
    pub(crate) config: AffinityConfig,
    pub(crate) store: Arc<dyn ProfileStore>,
    pub(crate) ledger: RelationshipLedger,
    pub(crate) facts: Arc<FactLifecycleManager>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) prompts: Arc<PromptEngine>,
    pub(crate) state: EngineState,
    pub(crate) pool: WorkerPool,
    pub(crate) handles: Mutex<Vec<JoinHandle<()>>>,
    activity_locks: KeyedLocks<UserId>,
    offset: FixedOffset,
    rng: Mutex<StdRng>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("persona", &self.config.general.persona_name)
            .field("pool", &self.pool)
            .field("loops", &self.handles.lock().len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine. Nothing runs until [`Engine::start`].
    #[must_use]
    pub fn new(config: AffinityConfig, collaborators: Collaborators, prompts: Arc<PromptEngine>) -> Self {
        let counters = Arc::new(AffinityCounters::new());
        let Collaborators {
            store,
            vector,
            classifier,
            generator,
            embedder,
            transport,
        } = collaborators;

        let ledger = RelationshipLedger::new(Arc::clone(&store), classifier, &config);
        let facts = FactLifecycleManager::new(
            Arc::clone(&store),
            vector,
            embedder,
            Arc::clone(&generator),
            Arc::clone(&prompts),
            &config,
        )
        .with_counters(Arc::clone(&counters));
        let state = EngineState::new(
            config.storage.recent_messages_limit,
            config.storage.recent_messages_keep,
            counters,
        );

        Self {
            offset: config.general.offset(),
            pool: WorkerPool::new(config.engine.worker_pool_size),
            ledger,
            facts: Arc::new(facts),
            store,
            generator,
            transport,
            prompts,
            state,
            handles: Mutex::new(Vec::new()),
            activity_locks: KeyedLocks::new(),
            rng: Mutex::new(StdRng::from_entropy()),
            config,
        }
    }

    /// Seed every random decision, for reproducible tests.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            ledger: self.ledger.with_seed(seed),
            rng: Mutex::new(StdRng::seed_from_u64(seed.wrapping_add(1))),
            ..self
        }
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &AffinityConfig {
        &self.config
    }

    /// Process-local state.
    #[must_use]
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// The relationship ledger.
    #[must_use]
    pub fn ledger(&self) -> &RelationshipLedger {
        &self.ledger
    }

    /// The fact lifecycle manager.
    #[must_use]
    pub fn facts(&self) -> &Arc<FactLifecycleManager> {
        &self.facts
    }

    /// Shared counters.
    #[must_use]
    pub fn counters(&self) -> &AffinityCounters {
        &self.state.counters
    }

    // -----------------------------------------------------------------------
    // Random helpers (never hold the lock across an await)
    // -----------------------------------------------------------------------

    fn roll(&self, chance: f64) -> bool {
        chance > 0.0 && self.rng.lock().gen_bool(chance.min(1.0))
    }

    fn choose<T: Clone>(&self, items: &[T]) -> Option<T> {
        items.choose(&mut *self.rng.lock()).cloned()
    }

    fn uniform(&self, low: f64, high: f64) -> f64 {
        if high > low {
            self.rng.lock().gen_range(low..high)
        } else {
            low
        }
    }

    // -----------------------------------------------------------------------
    // Collaborator helpers
    // -----------------------------------------------------------------------

    async fn generate(&self, id: PromptId, vars: &[(&str, &str)]) -> Result<String> {
        let (system, user) = self.prompts.render(id, vars)?;
        let raw = self
            .generator
            .generate(&system, &[ChatMessage::user(user)])
            .await
            .inspect_err(|_| AffinityCounters::incr(&self.state.counters.collaborator_failures))?;
        let text = raw.trim().trim_matches('"').trim();
        if text.is_empty() {
            return Err(AffinityError::Generation(format!("empty {id} completion")));
        }
        Ok(text.to_string())
    }

    async fn recipient(&self, user: &UserId) -> Result<Recipient> {
        let profile = self
            .store
            .get_profile(user)
            .await?
            .ok_or_else(|| AffinityError::UserNotFound(user.clone()))?;
        Ok(Recipient::new(&profile, self.state.display_name(user)))
    }

    async fn load_profiles(&self) -> Result<Vec<UserProfile>> {
        let mut profiles = Vec::new();
        for user in self.store.list_users().await? {
            match self.store.get_profile(&user).await {
                Ok(Some(p)) => profiles.push(p),
                Ok(None) => {}
                Err(e) => warn!(user = %user, error = %e, "Failed to load profile, skipping"),
            }
        }
        Ok(profiles)
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Score an inbound message and update every per-user clock.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn handle_inbound(&self, message: &InboundMessage, now: DateTime<Utc>) -> Result<InboundOutcome> {
        let user = &message.user;
        self.state.note_inbound(user, &message.display_name, &message.text, now);

        let cleared_pending_dm = message.kind.is_direct() && self.store.clear_pending_dm(user).await?;
        if cleared_pending_dm {
            debug!(user = %user, "Reply cleared pending DM");
        }

        let streak = self.ledger.update_streak(user, now).await?;
        let signal = InteractionSignal {
            kind: message.kind,
            text: message.text.clone(),
            shared_personal: message.shared_personal,
            mood: self.state.mood.current(),
            at: now,
        };
        let interaction = self.ledger.record_interaction(user, &signal).await?;

        let counters = &self.state.counters;
        AffinityCounters::incr(&counters.interactions_recorded);
        if interaction.milestone.is_some() {
            AffinityCounters::incr(&counters.milestones_fired);
        }
        if interaction.event.is_some() {
            AffinityCounters::incr(&counters.random_events);
        }

        let anniversary = if streak.new_day {
            self.ledger.anniversary_message(user, now).await?
        } else {
            None
        };
        let recovery = self.ledger.recovery_arc(interaction.delta - streak.penalty);

        Ok(InboundOutcome {
            interaction,
            streak,
            cleared_pending_dm,
            anniversary,
            recovery,
        })
    }

    /// Record the agent's reply and mine the exchange for facts in the
    /// background. The handle resolves once extraction finishes.
    pub fn record_reply(
        &self,
        user: &UserId,
        user_text: &str,
        reply_text: &str,
        display_name: &str,
        now: DateTime<Utc>,
    ) -> JoinHandle<Option<()>> {
        self.state.note_reply(user, reply_text, now);

        let facts = Arc::clone(&self.facts);
        let user = user.clone();
        let name = display_name.to_string();
        let user_text = user_text.to_string();
        let reply_text = reply_text.to_string();
        self.pool.spawn(async move {
            match facts.extract_facts(&user, &name, &user_text, &reply_text, now).await {
                Ok(outcome) if outcome.delta.changed() || outcome.reminders > 0 => debug!(
                    user = %user,
                    added = outcome.delta.added,
                    removed = outcome.delta.removed,
                    reminders = outcome.reminders,
                    "Extraction applied"
                ),
                Ok(_) => {}
                Err(e) => warn!(user = %user, error = %e, "Fact extraction failed"),
            }
        })
    }

    /// Report that `user` is active somewhere without talking to the agent.
    /// Fires jealousy at most once per persona-local day.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn observe_activity(&self, user: &UserId, now: DateTime<Utc>) -> Result<Option<JealousyOutcome>> {
        let _guard = self.activity_locks.lock(user).await;
        let key = format!("jealousy:{user}");
        let today = now.with_timezone(&self.offset).date_naive().to_string();
        if self.store.get_state(&key).await?.as_deref() == Some(today.as_str()) {
            return Ok(None);
        }
        let outcome = self.ledger.check_jealousy(user, now).await?;
        if outcome.is_some() {
            self.store.set_state(&key, &today).await?;
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Decay
    // -----------------------------------------------------------------------

    /// Decay everyone who has ever interacted. Returns the total removed.
    ///
    /// # Errors
    /// Returns a storage error listing users.
    pub async fn decay_tick(&self, now: DateTime<Utc>) -> Result<i64> {
        let profiles = self.load_profiles().await?;
        let mut removed = 0;
        let mut decayed = 0_usize;
        for profile in &profiles {
            let Some(days) = profile.days_since_interaction(now) else {
                continue;
            };
            match self.ledger.apply_decay(&profile.user_id, days).await {
                Ok(0) => {}
                Ok(amount) => {
                    removed += amount;
                    decayed += 1;
                }
                Err(e) => warn!(user = %profile.user_id, error = %e, "Decay failed"),
            }
        }
        AffinityCounters::incr(&self.state.counters.decay_passes);
        info!(users = profiles.len(), decayed, removed, "Decay sweep complete");
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Loneliness
    // -----------------------------------------------------------------------

    /// Maybe send one check-in to someone who has gone quiet.
    ///
    /// # Errors
    /// Returns a storage or transport error.
    pub async fn loneliness_tick(&self, now: DateTime<Utc>) -> Result<Option<UserId>> {
        let config = &self.config.loneliness;
        if !self
            .state
            .anyone_active_within(now, hours(config.loneliness_threshold_hours))
        {
            debug!("Nobody talked recently, skipping loneliness check");
            return Ok(None);
        }

        let pending = self.store.list_pending_dms().await?;
        let profiles = self.load_profiles().await?;
        let candidates = loneliness_candidates(&pending, &profiles, now, config);
        let Some(user) = self.choose(&candidates) else {
            debug!("No loneliness candidates");
            return Ok(None);
        };

        let attempt = pending
            .iter()
            .find(|p| p.user_id == user)
            .map_or(1, |p| p.attempt_count + 1);
        let recipient = self.recipient(&user).await?;
        let persona = self.config.general.persona_name.as_str();
        let text = match self
            .generate(
                PromptId::Loneliness,
                &[
                    ("persona", persona),
                    ("user_name", &recipient.name),
                    ("tier", recipient.tier.name()),
                    ("instruction", recipient.tier.instruction()),
                    ("tone", catalog::loneliness_tone(attempt)),
                    ("facts", &recipient.facts),
                ],
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(user = %user, attempt, error = %e, "Loneliness message generation failed");
                return Ok(None);
            }
        };

        self.transport.send_direct_message(&user, &text).await?;
        let record = self.store.set_pending_dm(&user, now).await?;
        AffinityCounters::incr(&self.state.counters.loneliness_sent);
        info!(user = %user, attempt = record.attempt_count, "Sent loneliness check-in");
        Ok(Some(user))
    }

    // -----------------------------------------------------------------------
    // Proactive
    // -----------------------------------------------------------------------

    /// Maybe send one spontaneous message to a close user.
    ///
    /// # Errors
    /// Returns a storage or transport error.
    pub async fn proactive_tick(&self, now: DateTime<Utc>) -> Result<Option<UserId>> {
        let pending = self.store.list_pending_dms().await?;
        let profiles = self.load_profiles().await?;
        let candidates = proactive_candidates(&pending, &profiles, now, &self.config.proactive);
        let Some(user) = self.choose(&candidates) else {
            debug!("No proactive candidates");
            return Ok(None);
        };
        let Some(profile) = profiles.iter().find(|p| p.user_id == user) else {
            return Ok(None);
        };

        let recipient = Recipient::new(profile, self.state.display_name(&user));
        let chance = recipient.tier.proactive_chance();
        if !self.roll(chance) {
            debug!(user = %user, tier = %recipient.tier, chance, "Proactive roll missed");
            return Ok(None);
        }

        let text = self.proactive_message(&recipient).await;
        self.transport.send_direct_message(&user, &text).await?;
        self.store.set_pending_dm(&user, now).await?;
        AffinityCounters::incr(&self.state.counters.proactive_sent);
        info!(user = %user, tier = %recipient.tier, "Sent proactive message");
        Ok(Some(user))
    }

    async fn proactive_message(&self, recipient: &Recipient) -> String {
        let config = &self.config.proactive;
        if recipient.affection >= config.high_affection_threshold && self.roll(config.high_affection_template_share) {
            if let Some(line) = self.choose(HIGH_AFFECTION_TEMPLATES) {
                return line.to_string();
            }
        }
        if self.roll(config.template_share) {
            if let Some(line) = self.choose(PROACTIVE_TEMPLATES) {
                return line.to_string();
            }
        }

        let persona = self.config.general.persona_name.as_str();
        match self
            .generate(
                PromptId::Proactive,
                &[
                    ("persona", persona),
                    ("user_name", &recipient.name),
                    ("tier", recipient.tier.name()),
                    ("instruction", recipient.tier.instruction()),
                    ("facts", &recipient.facts),
                ],
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Proactive generation failed, using template");
                self.choose(PROACTIVE_TEMPLATES).unwrap_or_default().to_string()
            }
        }
    }

    // -----------------------------------------------------------------------
    // Continuations
    // -----------------------------------------------------------------------

    /// Maybe queue a follow-up for a conversation that just ended.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn schedule_continuation(
        &self,
        user: &UserId,
        exchange: &Exchange,
        now: DateTime<Utc>,
    ) -> Result<Option<DelayedThought>> {
        let (_, tier) = self.ledger.affection(user).await?;
        let chance = tier.continuation_chance();
        if !self.roll(chance) {
            debug!(user = %user, tier = %tier, chance, "Continuation roll missed");
            return Ok(None);
        }
        if self.store.get_delayed_thought(user).await?.is_some() {
            debug!(user = %user, "Continuation already pending");
            return Ok(None);
        }

        let config = &self.config.continuation;
        let summary = self.summarize(exchange).await;
        let (low, high) = tier.continuation_delay_hours();
        let thought = DelayedThought {
            id: RecordId::new(),
            user_id: user.clone(),
            summary,
            last_user_text: truncate_chars(&exchange.user_text, config.snippet_chars),
            last_reply_text: truncate_chars(&exchange.reply_text, config.snippet_chars),
            scheduled_at: now + hours(self.uniform(low, high)),
            created_at: now,
        };
        if !self.store.put_delayed_thought_if_absent(thought.clone()).await? {
            return Ok(None);
        }
        AffinityCounters::incr(&self.state.counters.continuations_scheduled);
        info!(user = %user, due = %thought.scheduled_at, summary = %thought.summary, "Continuation scheduled");
        Ok(Some(thought))
    }

    async fn summarize(&self, exchange: &Exchange) -> String {
        let persona = self.config.general.persona_name.as_str();
        let summary = match self
            .generate(
                PromptId::Summarize,
                &[
                    ("persona", persona),
                    ("user_text", &exchange.user_text),
                    ("reply_text", &exchange.reply_text),
                ],
            )
            .await
        {
            Ok(raw) => clean_summary(&raw),
            Err(e) => {
                debug!(error = %e, "Summary failed, using fallback");
                String::new()
            }
        };
        if summary.is_empty() {
            FALLBACK_SUMMARY.to_string()
        } else {
            truncate_chars(&summary, self.config.continuation.summary_chars)
        }
    }

    /// Deliver every due follow-up thought. Returns how many were sent.
    ///
    /// Thoughts are consumed on read, so a failed send is not retried.
    ///
    /// # Errors
    /// Returns a storage error taking due thoughts.
    pub async fn continuation_tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.take_due_thoughts(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        let total = due.len();
        let sent = self
            .pool
            .run_all(due, |thought| self.follow_up(thought, now))
            .await
            .into_iter()
            .filter(|sent| *sent)
            .count();
        info!(due = total, sent, "Continuation check complete");
        Ok(sent)
    }

    async fn follow_up(&self, thought: DelayedThought, now: DateTime<Utc>) -> bool {
        match self.try_follow_up(&thought, now).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(user = %thought.user_id, error = %e, "Continuation failed");
                false
            }
        }
    }

    async fn try_follow_up(&self, thought: &DelayedThought, now: DateTime<Utc>) -> Result<bool> {
        let user = &thought.user_id;
        let Some(profile) = self.store.get_profile(user).await? else {
            return Ok(false);
        };
        if profile.last_interaction_at.is_some_and(|t| t > thought.created_at) {
            debug!(user = %user, "User came back, dropping continuation");
            return Ok(false);
        }
        if self.store.get_pending_dm(user).await?.is_some() {
            debug!(user = %user, "Pending DM outstanding, dropping continuation");
            return Ok(false);
        }

        let recipient = Recipient::new(&profile, self.state.display_name(user));
        let persona = self.config.general.persona_name.as_str();
        let text = match self
            .generate(
                PromptId::Continuation,
                &[
                    ("persona", persona),
                    ("user_name", &recipient.name),
                    ("time_context", time_context(now - thought.created_at)),
                    ("tier", recipient.tier.name()),
                    ("instruction", recipient.tier.instruction()),
                    ("summary", &thought.summary),
                    ("user_text", &thought.last_user_text),
                    ("reply_text", &thought.last_reply_text),
                ],
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(user = %user, error = %e, "Continuation generation failed, using fallback");
                self.choose(catalog::continuation_fallbacks(recipient.affection).as_slice())
                    .unwrap_or_default()
                    .to_string()
            }
        };

        self.transport.send_direct_message(user, &text).await?;
        self.store.set_pending_dm(user, now).await?;
        AffinityCounters::incr(&self.state.counters.continuations_sent);
        info!(user = %user, summary = %thought.summary, "Sent continuation");
        Ok(true)
    }

    /// Close conversations idle past the threshold, queueing a follow-up
    /// when the agent spoke last. Returns how many were closed.
    pub async fn idle_sweep(&self, now: DateTime<Utc>) -> usize {
        let threshold = Duration::minutes(i64::from(self.config.continuation.idle_threshold_minutes));
        let idle = self.state.idle_users(now, threshold);
        if idle.is_empty() {
            return 0;
        }
        self.pool
            .run_all(idle, |(user, seen_at)| self.close_idle(user, seen_at, now))
            .await
            .into_iter()
            .filter(|closed| *closed)
            .count()
    }

    async fn close_idle(&self, user: UserId, seen_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if let Some(exchange) = self.state.closing_exchange(&user) {
            if let Err(e) = self.schedule_continuation(&user, &exchange, now).await {
                warn!(user = %user, error = %e, "Continuation scheduling failed");
            }
        }
        let closed = self.state.close_conversation(&user, seen_at);
        if closed {
            debug!(user = %user, "Conversation closed");
        }
        closed
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Run fact maintenance for every active user. Returns how many
    /// profiles were maintained without error.
    pub async fn maintenance_tick(&self, now: DateTime<Utc>) -> usize {
        let users = self.state.active_users();
        if users.is_empty() {
            debug!("No active users to maintain");
            return 0;
        }
        let memory = self.facts.config();
        let results = self
            .pool
            .run_all(users, |user| async move {
                let result = self
                    .facts
                    .maintain_profile(&user, memory.fact_aging_days, memory.fact_summarization_threshold, now)
                    .await;
                (user, result)
            })
            .await;

        let mut maintained = 0;
        for (user, result) in results {
            match result {
                Ok(report) => {
                    maintained += 1;
                    if report.archived > 0 || report.consolidated {
                        info!(
                            user = %user,
                            archived = report.archived,
                            consolidated = report.consolidated,
                            facts = report.facts_after,
                            "Profile maintained"
                        );
                    }
                }
                Err(e) => warn!(user = %user, error = %e, "Maintenance failed"),
            }
        }
        self.facts.prune_locks();
        self.activity_locks.prune();
        info!(maintained, "Maintenance cycle complete");
        maintained
    }

    // -----------------------------------------------------------------------
    // Reminders
    // -----------------------------------------------------------------------

    /// Deliver due reminders through the worker pool. Failed deliveries are
    /// pushed back by the retry delay. Returns how many were delivered.
    ///
    /// # Errors
    /// Returns a storage error loading due reminders.
    pub async fn reminder_tick(&self, now: DateTime<Utc>) -> Result<usize> {
        let due = self.store.due_reminders(now).await?;
        if due.is_empty() {
            return Ok(0);
        }
        let total = due.len();
        let delivered = self
            .pool
            .run_all(due, |reminder| self.deliver_reminder(reminder))
            .await
            .into_iter()
            .filter(|sent| *sent)
            .count();
        debug!(due = total, delivered, "Reminder check complete");
        Ok(delivered)
    }

    async fn deliver_reminder(&self, reminder: Reminder) -> bool {
        let user = reminder.user_id.clone();
        match self.try_deliver_reminder(reminder).await {
            Ok(sent) => sent,
            Err(e) => {
                warn!(user = %user, error = %e, "Reminder bookkeeping failed");
                false
            }
        }
    }

    async fn try_deliver_reminder(&self, mut reminder: Reminder) -> Result<bool> {
        let user = reminder.user_id.clone();
        let name = self.state.display_name(&user);
        let persona = self.config.general.persona_name.as_str();
        let text = match self
            .generate(
                PromptId::Reminder,
                &[("persona", persona), ("user_name", &name), ("text", &reminder.text)],
            )
            .await
        {
            Ok(text) => text,
            Err(e) => {
                debug!(user = %user, error = %e, "Reminder generation failed, sending plain text");
                format!("hey! you asked me to remind you: {}", reminder.text)
            }
        };

        match self.transport.send_direct_message(&user, &text).await {
            Ok(()) => {
                self.store.delete_reminder(reminder.id).await?;
                AffinityCounters::incr(&self.state.counters.reminders_sent);
                info!(user = %user, "Reminder delivered");
                Ok(true)
            }
            Err(e) => {
                reminder.due_at += self.config.reminders.retry_delay();
                self.store.update_reminder(&reminder).await?;
                AffinityCounters::incr(&self.state.counters.reminder_retries);
                warn!(user = %user, error = %e, retry_at = %reminder.due_at, "Reminder delivery failed");
                Ok(false)
            }
        }
    }

    /// Drop reminders past the retention window, delivered or not.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn reminder_cleanup(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::hours(i64::from(self.config.reminders.retention_hours));
        let removed = self.store.cleanup_reminders(cutoff).await?;
        if removed > 0 {
            info!(removed, "Expired reminders removed");
        }
        Ok(removed)
    }

    // -----------------------------------------------------------------------
    // Mood
    // -----------------------------------------------------------------------

    /// Re-evaluate the mood from the message rate since the last tick and
    /// persist it.
    pub async fn mood_tick(&self, now: DateTime<Utc>) -> Mood {
        let rate = self.state.mood.take_rate();
        let local = now.with_timezone(&self.offset);
        let mood = determine_mood(rate, local.hour(), local.weekday(), &mut *self.rng.lock());
        if self.state.mood.set(mood) {
            info!(mood = mood.label(), rate, "Mood changed");
        }
        if let Err(e) = self.store.set_state(MOOD_STATE_KEY, mood.label()).await {
            warn!(error = %e, "Failed to persist mood");
        }
        mood
    }

    /// Load the persisted mood, if any.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn restore_mood(&self) -> Result<Mood> {
        if let Some(label) = self.store.get_state(MOOD_STATE_KEY).await? {
            self.state.mood.set(Mood::from_label(&label));
        }
        Ok(self.state.mood.current())
    }
}
