//! Fact lifecycle: delta application, aging into vector memory, and
//! generator-driven consolidation.
//!
//! Every fact-list change for a user runs under that user's entry in a
//! [`KeyedLocks`] table. Maintenance awaits the embedder and generator
//! between reading and writing the list, so without the lock an extraction
//! finishing mid-maintenance could be overwritten by the consolidated set.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{debug, info, warn};

use crate::collaborators::{ChatMessage, Embedder, Generator};
use crate::config::{AffinityConfig, MemoryConfig};
use crate::error::{AffinityError, Result};
use crate::extraction::{FactDelta, parse_consolidation};
use crate::metrics::AffinityCounters;
use crate::prompt::{PromptEngine, PromptId};
use crate::store::{KeyedLocks, ProfileStore};
use crate::types::{Fact, Reminder, UserId, UserProfile};
use crate::vector::{ScoredMemory, VectorMemory};

/// Render facts as a bullet list for prompts.
#[must_use]
pub fn format_fact_list(facts: &[String]) -> String {
    if facts.is_empty() {
        return "(nothing yet)".to_string();
    }
    facts
        .iter()
        .map(|f| format!("- {f}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Counts from one [`FactLifecycleManager::apply_delta`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaOutcome {
    /// Facts newly present.
    pub added: usize,
    /// Facts dropped.
    pub removed: usize,
}

impl DeltaOutcome {
    /// Whether the fact list changed.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.added + self.removed > 0
    }
}

/// What a maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Facts moved into vector memory.
    pub archived: usize,
    /// Aged facts kept because embedding or insertion failed.
    pub archive_failures: usize,
    /// Whether the fact list was replaced by a consolidated one.
    pub consolidated: bool,
    /// Live facts before the pass.
    pub facts_before: usize,
    /// Live facts after the pass.
    pub facts_after: usize,
}

/// Result of mining one exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Fact changes applied.
    pub delta: DeltaOutcome,
    /// Reminders queued.
    pub reminders: usize,
}

/// Owns every change to a user's fact list.
pub struct FactLifecycleManager {
    store: Arc<dyn ProfileStore>,
    vector: Arc<dyn VectorMemory>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    prompts: Arc<PromptEngine>,
    locks: KeyedLocks<UserId>,
    counters: Arc<AffinityCounters>,
    config: MemoryConfig,
    persona: String,
    offset: FixedOffset,
}

impl std::fmt::Debug for FactLifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FactLifecycleManager")
            .field("config", &self.config)
            .field("locked_users", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl FactLifecycleManager {
    /// Wire the manager to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn ProfileStore>,
        vector: Arc<dyn VectorMemory>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        prompts: Arc<PromptEngine>,
        config: &AffinityConfig,
    ) -> Self {
        Self {
            store,
            vector,
            embedder,
            generator,
            prompts,
            locks: KeyedLocks::new(),
            counters: Arc::new(AffinityCounters::new()),
            config: config.memory.clone(),
            persona: config.general.persona_name.clone(),
            offset: config.general.offset(),
        }
    }

    /// Report into a shared counter set.
    #[must_use]
    pub fn with_counters(self, counters: Arc<AffinityCounters>) -> Self {
        Self { counters, ..self }
    }

    /// Lifecycle settings in use.
    #[must_use]
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Delta application
    // -----------------------------------------------------------------------

    /// Drop facts matching `removes` exactly, then add each of `adds` not
    /// already present, stamped `now`.
    ///
    /// `last_updated` only moves when the list actually changes.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn apply_delta(
        &self,
        user: &UserId,
        adds: &[String],
        removes: &[String],
        now: DateTime<Utc>,
    ) -> Result<DeltaOutcome> {
        if adds.is_empty() && removes.is_empty() {
            return Ok(DeltaOutcome::default());
        }
        let _guard = self.locks.lock(user).await;
        if adds.is_empty() && self.store.get_profile(user).await?.is_none() {
            return Ok(DeltaOutcome::default());
        }
        self.apply_delta_locked(user, adds, removes, now).await
    }

    async fn apply_delta_locked(
        &self,
        user: &UserId,
        adds: &[String],
        removes: &[String],
        now: DateTime<Utc>,
    ) -> Result<DeltaOutcome> {
        // A text named in both lists is kept rather than churned.
        let removes: HashSet<&str> = removes
            .iter()
            .map(String::as_str)
            .filter(|r| !adds.iter().any(|a| a == r))
            .collect();
        let mut outcome = DeltaOutcome::default();
        self.store
            .update_profile(
                user,
                Box::new(|p: &mut UserProfile| {
                    let before = p.facts.len();
                    p.facts.retain(|f| !removes.contains(f.text.as_str()));
                    outcome.removed = before - p.facts.len();

                    for text in adds {
                        if !p.facts.iter().any(|f| f.text == *text) {
                            p.facts.push(Fact::new(text.clone(), now));
                            outcome.added += 1;
                        }
                    }
                    if outcome.changed() {
                        p.last_updated = now;
                    }
                }),
            )
            .await?;

        AffinityCounters::add(&self.counters.facts_added, outcome.added);
        AffinityCounters::add(&self.counters.facts_removed, outcome.removed);
        if outcome.changed() {
            debug!(user = %user, added = outcome.added, removed = outcome.removed, "Applied fact delta");
        }
        Ok(outcome)
    }

    // -----------------------------------------------------------------------
    // Maintenance
    // -----------------------------------------------------------------------

    /// Archive facts older than `aging_days`, then consolidate if more than
    /// `threshold` remain.
    ///
    /// Failed archival leaves the fact in place for the next pass. A failed
    /// or unparseable consolidation leaves the list untouched.
    ///
    /// # Errors
    /// Returns a storage error. Collaborator failures are absorbed into the
    /// report.
    pub async fn maintain_profile(
        &self,
        user: &UserId,
        aging_days: u32,
        threshold: usize,
        now: DateTime<Utc>,
    ) -> Result<MaintenanceReport> {
        let start = Instant::now();
        let _guard = self.locks.lock(user).await;

        let Some(profile) = self.store.get_profile(user).await? else {
            return Ok(MaintenanceReport::default());
        };
        let mut report = MaintenanceReport {
            facts_before: profile.facts.len(),
            facts_after: profile.facts.len(),
            ..MaintenanceReport::default()
        };

        let cutoff = now - Duration::days(i64::from(aging_days));
        let mut archived: HashSet<String> = HashSet::new();
        for fact in profile.facts.iter().filter(|f| f.created_at < cutoff) {
            if self.archive_fact(user, &fact.text).await {
                archived.insert(fact.text.clone());
            } else {
                report.archive_failures += 1;
            }
        }

        let mut remaining = profile.fact_texts();
        if !archived.is_empty() {
            let updated = self
                .store
                .update_profile(
                    user,
                    Box::new(|p: &mut UserProfile| {
                        p.facts.retain(|f| !archived.contains(&f.text));
                        p.last_updated = now;
                    }),
                )
                .await?;
            report.archived = archived.len();
            remaining = updated.fact_texts();
            AffinityCounters::add(&self.counters.facts_archived, report.archived);
        }

        if remaining.len() > threshold {
            if let Some(consolidated) = self.consolidate(user, &remaining).await {
                let facts: Vec<Fact> = dedup(consolidated)
                    .into_iter()
                    .map(|text| Fact::new(text, now))
                    .collect();
                let updated = self
                    .store
                    .update_profile(
                        user,
                        Box::new(move |p: &mut UserProfile| {
                            p.facts = facts;
                            p.last_updated = now;
                        }),
                    )
                    .await?;
                remaining = updated.fact_texts();
                report.consolidated = true;
                AffinityCounters::incr(&self.counters.consolidations);
            }
        }

        report.facts_after = remaining.len();
        if report.archived > 0 || report.consolidated || report.archive_failures > 0 {
            info!(
                user = %user,
                archived = report.archived,
                failures = report.archive_failures,
                consolidated = report.consolidated,
                before = report.facts_before,
                after = report.facts_after,
                elapsed_us = start.elapsed().as_micros(),
                "Profile maintained"
            );
        }
        Ok(report)
    }

    /// Embed and store one fact. `false` means it stays in the profile.
    async fn archive_fact(&self, user: &UserId, text: &str) -> bool {
        let embedding = match self.embedder.embed(text).await {
            Ok(e) => e,
            Err(e) => {
                AffinityCounters::incr(&self.counters.collaborator_failures);
                warn!(user = %user, error = %e, "Embedding failed, fact kept for retry");
                return false;
            }
        };
        match self.vector.add(user, text, embedding).await {
            Ok(()) => true,
            Err(AffinityError::DuplicateMemory { similarity, .. }) => {
                debug!(user = %user, similarity, "Archive refused near-duplicate, fact kept");
                false
            }
            Err(e) => {
                warn!(user = %user, error = %e, "Vector insert failed, fact kept for retry");
                false
            }
        }
    }

    /// Ask the generator to merge `facts` into roughly half as many.
    async fn consolidate(&self, user: &UserId, facts: &[String]) -> Option<Vec<String>> {
        let count = facts.len().to_string();
        let target = (facts.len() / 2).max(1).to_string();
        let listing = format_fact_list(facts);
        let (system, prompt) = match self.prompts.render(
            PromptId::ConsolidateFacts,
            &[("count", &count), ("target", &target), ("facts", &listing)],
        ) {
            Ok(rendered) => rendered,
            Err(e) => {
                warn!(error = %e, "Consolidation prompt unavailable");
                return None;
            }
        };

        let raw = match self.generator.generate(&system, &[ChatMessage::user(prompt)]).await {
            Ok(raw) => raw,
            Err(e) => {
                AffinityCounters::incr(&self.counters.collaborator_failures);
                warn!(user = %user, error = %e, "Consolidation generation failed, facts untouched");
                return None;
            }
        };
        let parsed = parse_consolidation(&raw);
        if parsed.is_none() {
            AffinityCounters::incr(&self.counters.parse_failures);
            warn!(user = %user, "Consolidation output unparseable, facts untouched");
        }
        parsed
    }

    // -----------------------------------------------------------------------
    // Extraction and recall
    // -----------------------------------------------------------------------

    /// Mine one exchange for facts and reminders.
    ///
    /// Short user texts are skipped. Unparseable output is a no-op.
    ///
    /// # Errors
    /// Returns a generation or storage error.
    pub async fn extract_facts(
        &self,
        user: &UserId,
        user_name: &str,
        user_text: &str,
        reply_text: &str,
        now: DateTime<Utc>,
    ) -> Result<ExtractionOutcome> {
        if user_text.trim().chars().count() < self.config.min_extraction_chars {
            return Ok(ExtractionOutcome::default());
        }

        let known = self
            .store
            .get_profile(user)
            .await?
            .map(|p| p.fact_texts())
            .unwrap_or_default();
        let profile = format_fact_list(&known);
        let local_now = now
            .with_timezone(&self.offset)
            .format("%A %Y-%m-%d %H:%M")
            .to_string();
        let (system, prompt) = self.prompts.render(
            PromptId::ExtractFacts,
            &[
                ("persona", &self.persona),
                ("user_name", user_name),
                ("user_text", user_text),
                ("reply_text", reply_text),
                ("profile", &profile),
                ("now", &local_now),
            ],
        )?;

        let raw = self
            .generator
            .generate(&system, &[ChatMessage::user(prompt)])
            .await
            .inspect_err(|_| AffinityCounters::incr(&self.counters.collaborator_failures))?;
        let Some(delta) = FactDelta::parse(&raw) else {
            AffinityCounters::incr(&self.counters.parse_failures);
            debug!(user = %user, "Extraction output unparseable, ignoring");
            return Ok(ExtractionOutcome::default());
        };

        let mut outcome = ExtractionOutcome::default();
        if !delta.is_empty() {
            outcome.delta = self.apply_delta(user, &delta.add, &delta.remove, now).await?;
        }
        for request in delta.reminders.iter().filter(|r| r.delay_seconds > 0) {
            let due = now + Duration::seconds(request.delay_seconds);
            self.store
                .add_reminder(Reminder::new(user.clone(), request.text.clone(), due, now))
                .await?;
            outcome.reminders += 1;
            info!(user = %user, due = %due, "Reminder queued");
        }
        Ok(outcome)
    }

    /// Archived memories relevant to `query`, best first.
    ///
    /// # Errors
    /// Returns an embedding or storage error.
    pub async fn recall_memories(&self, user: &UserId, query: &str, limit: usize) -> Result<Vec<ScoredMemory>> {
        let embedding = self.embedder.embed(query).await?;
        self.vector.search(user, &embedding, limit).await
    }

    /// Drop lock entries for users not currently being processed.
    pub fn prune_locks(&self) {
        self.locks.prune();
    }
}

/// Remove exact duplicates, keeping first occurrences.
fn dedup(facts: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    facts.into_iter().filter(|f| seen.insert(f.clone())).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::store::MemoryProfileStore;
    use crate::vector::InMemoryVectorMemory;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Replies from a script; errors once the script runs out.
    #[derive(Default)]
    struct ScriptedGenerator {
        replies: Mutex<VecDeque<String>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn with(replies: &[&str]) -> Self {
            Self {
                replies: Mutex::new(replies.iter().map(ToString::to_string).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, _system: &str, messages: &[ChatMessage]) -> Result<String> {
            self.calls
                .lock()
                .push(messages.last().map(|m| m.content.clone()).unwrap_or_default());
            self.replies
                .lock()
                .pop_front()
                .ok_or_else(|| AffinityError::Generation("script exhausted".into()))
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(AffinityError::Embedding("offline".into()))
        }
    }

    struct Harness {
        store: Arc<MemoryProfileStore>,
        vector: Arc<InMemoryVectorMemory>,
        generator: Arc<ScriptedGenerator>,
        manager: FactLifecycleManager,
    }

    fn harness(replies: &[&str], embedder: Arc<dyn Embedder>) -> Harness {
        let store = Arc::new(MemoryProfileStore::new());
        let vector = Arc::new(InMemoryVectorMemory::default());
        let generator = Arc::new(ScriptedGenerator::with(replies));
        let manager = FactLifecycleManager::new(
            store.clone(),
            vector.clone(),
            embedder,
            generator.clone(),
            Arc::new(PromptEngine::builtin()),
            &AffinityConfig::default(),
        );
        Harness {
            store,
            vector,
            generator,
            manager,
        }
    }

    fn hashing() -> Arc<dyn Embedder> {
        Arc::new(HashEmbedder::new(64))
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    fn seed_facts(store: &MemoryProfileStore, user: &UserId, facts: &[(&str, DateTime<Utc>)], updated: DateTime<Utc>) {
        let mut profile = UserProfile::new(user.clone(), updated);
        profile.facts = facts.iter().map(|(t, at)| Fact::new(*t, *at)).collect();
        store.insert_profile(profile);
    }

    #[tokio::test]
    async fn add_then_remove_leaves_empty() {
        let h = harness(&[], hashing());
        let user = UserId::from("u1");
        let now = Utc::now();
        let added = h.manager.apply_delta(&user, &strings(&["A"]), &[], now).await.expect("add");
        assert_eq!(added, DeltaOutcome { added: 1, removed: 0 });
        let removed = h.manager.apply_delta(&user, &[], &strings(&["A"]), now).await.expect("remove");
        assert_eq!(removed, DeltaOutcome { added: 0, removed: 1 });
        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert!(p.facts.is_empty());
    }

    #[tokio::test]
    async fn removal_for_unknown_user_creates_nothing() {
        let h = harness(&[], hashing());
        let user = UserId::from("ghost");
        let out = h
            .manager
            .apply_delta(&user, &[], &strings(&["Has a cat"]), Utc::now())
            .await
            .expect("remove");
        assert!(!out.changed());
        assert!(h.store.get_profile(&user).await.expect("get").is_none());
        assert!(h.store.list_users().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn reapplying_delta_is_idempotent() {
        let h = harness(&[], hashing());
        let user = UserId::from("u1");
        let t0 = Utc::now();
        let adds = strings(&["Has a dog", "Lives in Lyon"]);
        h.manager.apply_delta(&user, &adds, &strings(&["Lives in Paris"]), t0).await.expect("first");
        let second = h
            .manager
            .apply_delta(&user, &adds, &strings(&["Lives in Paris"]), t0 + Duration::hours(1))
            .await
            .expect("second");
        assert!(!second.changed());
        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert_eq!(p.fact_texts(), adds);
        assert_eq!(p.last_updated, t0);
    }

    #[tokio::test]
    async fn noop_delta_keeps_last_updated() {
        let h = harness(&[], hashing());
        let user = UserId::from("u1");
        let t0 = Utc::now() - Duration::days(2);
        seed_facts(&h.store, &user, &[("Likes tea", t0)], t0);
        h.manager.apply_delta(&user, &[], &[], Utc::now()).await.expect("empty");
        h.manager
            .apply_delta(&user, &[], &strings(&["not a fact"]), Utc::now())
            .await
            .expect("absent remove");
        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert_eq!(p.last_updated, t0);
    }

    #[tokio::test]
    async fn aged_facts_move_to_vector_memory() {
        let h = harness(&[], hashing());
        let user = UserId::from("u1");
        let now = Utc::now();
        let old = now - Duration::days(10);
        seed_facts(
            &h.store,
            &user,
            &[("Studies marine biology", old), ("Owns a red bicycle", now)],
            old,
        );
        let report = h.manager.maintain_profile(&user, 7, 20, now).await.expect("maintain");
        assert_eq!(report.archived, 1);
        assert!(!report.consolidated);
        assert_eq!(report.facts_after, 1);
        assert_eq!(h.vector.count(&user).await.expect("count"), 1);

        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert_eq!(p.fact_texts(), vec!["Owns a red bicycle"]);

        let hits = h
            .manager
            .recall_memories(&user, "studies marine biology", 3)
            .await
            .expect("recall");
        assert_eq!(hits[0].text, "Studies marine biology");
    }

    #[tokio::test]
    async fn embedding_failure_keeps_facts() {
        let h = harness(&[], Arc::new(FailingEmbedder));
        let user = UserId::from("u1");
        let now = Utc::now();
        let old = now - Duration::days(30);
        seed_facts(&h.store, &user, &[("Plays chess", old)], old);
        let report = h.manager.maintain_profile(&user, 7, 20, now).await.expect("maintain");
        assert_eq!(report.archived, 0);
        assert_eq!(report.archive_failures, 1);
        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert_eq!(p.fact_texts(), vec!["Plays chess"]);
        assert_eq!(p.last_updated, old);
    }

    #[tokio::test]
    async fn consolidation_replaces_list() {
        let h = harness(&["```json\n[\"Has two cats\", \"Works as a nurse\"]\n```"], hashing());
        let user = UserId::from("u1");
        let now = Utc::now();
        let facts: Vec<(&str, DateTime<Utc>)> = vec![
            ("Has a cat named Miso", now),
            ("Has a cat named Tofu", now),
            ("Works as a nurse", now),
            ("Works night shifts", now),
        ];
        seed_facts(&h.store, &user, &facts, now);

        let report = h.manager.maintain_profile(&user, 7, 3, now).await.expect("maintain");
        assert!(report.consolidated);
        assert_eq!(report.facts_before, 4);
        assert_eq!(report.facts_after, 2);

        let prompt = h.generator.calls.lock()[0].clone();
        assert!(prompt.contains("approximately 2 facts"));
        assert!(prompt.contains("- Works night shifts"));
    }

    #[tokio::test]
    async fn failed_consolidation_leaves_facts_identical() {
        let user = UserId::from("u1");
        let now = Utc::now();
        let facts: Vec<(&str, DateTime<Utc>)> = vec![("A", now), ("B", now), ("C", now)];

        for script in [&["definitely not json"][..], &[][..], &["[]"][..]] {
            let h = harness(script, hashing());
            seed_facts(&h.store, &user, &facts, now);
            let before = h.store.get_profile(&user).await.expect("get").expect("exists");
            let report = h.manager.maintain_profile(&user, 7, 2, now).await.expect("maintain");
            assert!(!report.consolidated);
            let after = h.store.get_profile(&user).await.expect("get").expect("exists");
            assert_eq!(before, after);
        }
    }

    #[tokio::test]
    async fn maintenance_of_unknown_user_is_empty() {
        let h = harness(&[], hashing());
        let report = h
            .manager
            .maintain_profile(&UserId::from("ghost"), 7, 20, Utc::now())
            .await
            .expect("maintain");
        assert_eq!(report, MaintenanceReport::default());
        assert!(h.store.get_profile(&"ghost".into()).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn extraction_applies_delta_and_queues_reminders() {
        let reply = r#"{"add": ["Lives in Osaka"], "remove": ["Lives in Tokyo"], "reminders": [{"text": "job interview", "delay_seconds": 3600}, {"text": "bogus", "delay_seconds": 0}]}"#;
        let h = harness(&[reply], hashing());
        let user = UserId::from("u1");
        let now = Utc::now();
        seed_facts(&h.store, &user, &[("Lives in Tokyo", now)], now);

        let outcome = h
            .manager
            .extract_facts(&user, "Kai", "i just moved to osaka, interview in an hour!", "good luck!!", now)
            .await
            .expect("extract");
        assert_eq!(outcome.delta, DeltaOutcome { added: 1, removed: 1 });
        assert_eq!(outcome.reminders, 1);

        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert_eq!(p.fact_texts(), vec!["Lives in Osaka"]);
        let due = h.store.due_reminders(now + Duration::hours(1)).await.expect("due");
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].text, "job interview");

        let prompt = h.generator.calls.lock()[0].clone();
        assert!(prompt.contains("- Lives in Tokyo"));
        assert!(prompt.contains("Kai: \"i just moved"));
    }

    #[tokio::test]
    async fn short_or_garbled_extraction_is_noop() {
        let h = harness(&["I could not find anything"], hashing());
        let user = UserId::from("u1");
        let short = h
            .manager
            .extract_facts(&user, "Kai", "lol ok", "haha", Utc::now())
            .await
            .expect("short");
        assert_eq!(short, ExtractionOutcome::default());
        assert!(h.generator.calls.lock().is_empty());

        let garbled = h
            .manager
            .extract_facts(&user, "Kai", "my sister is visiting next week", "fun!", Utc::now())
            .await
            .expect("garbled");
        assert_eq!(garbled, ExtractionOutcome::default());
        assert!(h.store.get_profile(&user).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn concurrent_deltas_do_not_lose_facts() {
        let h = Arc::new(harness(&[], hashing()));
        let user = UserId::from("u1");
        let now = Utc::now();
        let mut handles = Vec::new();
        for i in 0..20 {
            let h = Arc::clone(&h);
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                h.manager
                    .apply_delta(&user, &[format!("fact {i}")], &[], now)
                    .await
                    .expect("apply");
            }));
        }
        for handle in handles {
            handle.await.expect("join");
        }
        let p = h.store.get_profile(&user).await.expect("get").expect("exists");
        assert_eq!(p.facts.len(), 20);
    }

    #[test]
    fn fact_list_formatting() {
        assert_eq!(format_fact_list(&[]), "(nothing yet)");
        assert_eq!(format_fact_list(&strings(&["a", "b"])), "- a\n- b");
    }
}
