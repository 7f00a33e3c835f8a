//! Runtime counters.
//!
//! Lock-free `AtomicU64` counters bumped on the hot paths and read on
//! export. A [`CounterSnapshot`] renders as Prometheus text for whatever
//! dashboard the host process exposes.

use std::sync::atomic::{AtomicU64, Ordering};

/// Event counters shared by the ledger, the fact lifecycle and the engine.
#[derive(Debug)]
pub struct AffinityCounters {
    /// Inbound interactions scored.
    pub interactions_recorded: AtomicU64,
    /// Tier-up milestones surfaced.
    pub milestones_fired: AtomicU64,
    /// Random bonus events surfaced.
    pub random_events: AtomicU64,
    /// Facts added by delta application.
    pub facts_added: AtomicU64,
    /// Facts removed by delta application.
    pub facts_removed: AtomicU64,
    /// Facts moved into vector memory.
    pub facts_archived: AtomicU64,
    /// Consolidations that replaced a fact list.
    pub consolidations: AtomicU64,
    /// Decay sweeps completed.
    pub decay_passes: AtomicU64,
    /// Loneliness check-ins sent.
    pub loneliness_sent: AtomicU64,
    /// Proactive messages sent.
    pub proactive_sent: AtomicU64,
    /// Continuations sent.
    pub continuations_sent: AtomicU64,
    /// Continuations queued at conversation end.
    pub continuations_scheduled: AtomicU64,
    /// Reminders delivered.
    pub reminders_sent: AtomicU64,
    /// Reminders pushed back after a failed delivery.
    pub reminder_retries: AtomicU64,
    /// Generator or embedder calls that failed.
    pub collaborator_failures: AtomicU64,
    /// Structured generator output that could not be parsed.
    pub parse_failures: AtomicU64,
}

impl AffinityCounters {
    /// Zeroed counters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            interactions_recorded: AtomicU64::new(0),
            milestones_fired: AtomicU64::new(0),
            random_events: AtomicU64::new(0),
            facts_added: AtomicU64::new(0),
            facts_removed: AtomicU64::new(0),
            facts_archived: AtomicU64::new(0),
            consolidations: AtomicU64::new(0),
            decay_passes: AtomicU64::new(0),
            loneliness_sent: AtomicU64::new(0),
            proactive_sent: AtomicU64::new(0),
            continuations_sent: AtomicU64::new(0),
            continuations_scheduled: AtomicU64::new(0),
            reminders_sent: AtomicU64::new(0),
            reminder_retries: AtomicU64::new(0),
            collaborator_failures: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
        }
    }

    /// Add one to `counter`.
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Add `n` to `counter`.
    pub fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Read every counter.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            interactions_recorded: load(&self.interactions_recorded),
            milestones_fired: load(&self.milestones_fired),
            random_events: load(&self.random_events),
            facts_added: load(&self.facts_added),
            facts_removed: load(&self.facts_removed),
            facts_archived: load(&self.facts_archived),
            consolidations: load(&self.consolidations),
            decay_passes: load(&self.decay_passes),
            loneliness_sent: load(&self.loneliness_sent),
            proactive_sent: load(&self.proactive_sent),
            continuations_sent: load(&self.continuations_sent),
            continuations_scheduled: load(&self.continuations_scheduled),
            reminders_sent: load(&self.reminders_sent),
            reminder_retries: load(&self.reminder_retries),
            collaborator_failures: load(&self.collaborator_failures),
            parse_failures: load(&self.parse_failures),
        }
    }
}

impl Default for AffinityCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Counter values at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)]
pub struct CounterSnapshot {
    pub interactions_recorded: u64,
    pub milestones_fired: u64,
    pub random_events: u64,
    pub facts_added: u64,
    pub facts_removed: u64,
    pub facts_archived: u64,
    pub consolidations: u64,
    pub decay_passes: u64,
    pub loneliness_sent: u64,
    pub proactive_sent: u64,
    pub continuations_sent: u64,
    pub continuations_scheduled: u64,
    pub reminders_sent: u64,
    pub reminder_retries: u64,
    pub collaborator_failures: u64,
    pub parse_failures: u64,
}

impl CounterSnapshot {
    fn rows(&self) -> [(&'static str, &'static str, u64); 16] {
        [
            ("interactions_recorded", "Inbound interactions scored", self.interactions_recorded),
            ("milestones_fired", "Tier-up milestones surfaced", self.milestones_fired),
            ("random_events", "Random bonus events surfaced", self.random_events),
            ("facts_added", "Facts added", self.facts_added),
            ("facts_removed", "Facts removed", self.facts_removed),
            ("facts_archived", "Facts archived to vector memory", self.facts_archived),
            ("consolidations", "Fact list consolidations", self.consolidations),
            ("decay_passes", "Decay sweeps completed", self.decay_passes),
            ("loneliness_sent", "Loneliness check-ins sent", self.loneliness_sent),
            ("proactive_sent", "Proactive messages sent", self.proactive_sent),
            ("continuations_sent", "Continuations sent", self.continuations_sent),
            ("continuations_scheduled", "Continuations queued", self.continuations_scheduled),
            ("reminders_sent", "Reminders delivered", self.reminders_sent),
            ("reminder_retries", "Reminder delivery retries", self.reminder_retries),
            ("collaborator_failures", "Failed generator or embedder calls", self.collaborator_failures),
            ("parse_failures", "Unparseable structured output", self.parse_failures),
        ]
    }

    /// Prometheus text exposition.
    #[must_use]
    pub fn to_prometheus(&self) -> String {
        let mut out = String::new();
        for (name, help, value) in self.rows() {
            out.push_str(&format!(
                "# HELP affinity_{name}_total {help}\n# TYPE affinity_{name}_total counter\naffinity_{name}_total {value}\n"
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        assert_eq!(AffinityCounters::new().snapshot(), CounterSnapshot::default());
    }

    #[test]
    fn increments_show_in_snapshot() {
        let c = AffinityCounters::new();
        AffinityCounters::incr(&c.proactive_sent);
        AffinityCounters::add(&c.facts_archived, 3);
        let snap = c.snapshot();
        assert_eq!(snap.proactive_sent, 1);
        assert_eq!(snap.facts_archived, 3);
        assert_eq!(snap.reminders_sent, 0);
    }

    #[test]
    fn prometheus_format() {
        let c = AffinityCounters::new();
        AffinityCounters::add(&c.interactions_recorded, 42);
        let prom = c.snapshot().to_prometheus();
        assert!(prom.contains("affinity_interactions_recorded_total 42"));
        assert!(prom.contains("# TYPE affinity_decay_passes_total counter"));
        assert_eq!(prom.lines().count(), 48);
    }
}
