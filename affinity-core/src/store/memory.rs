//! Process-local [`ProfileStore`] backed by `DashMap`s.
//!
//! Nothing survives a restart. Used by tests and by deployments that
//! persist elsewhere.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use super::{ProfileMutation, ProfileStore};
use crate::error::Result;
use crate::types::{DelayedThought, PendingDm, RecordId, Reminder, UserId, UserProfile};

/// In-memory profile store.
#[derive(Debug, Default)]
pub struct MemoryProfileStore {
    profiles: DashMap<UserId, UserProfile>,
    pending: DashMap<UserId, PendingDm>,
    thoughts: DashMap<UserId, DelayedThought>,
    reminders: DashMap<RecordId, Reminder>,
    state: DashMap<String, String>,
}

impl MemoryProfileStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a profile wholesale.
    pub fn insert_profile(&self, profile: UserProfile) {
        self.profiles.insert(profile.user_id.clone(), profile);
    }

    /// Insert or replace a pending DM wholesale.
    pub fn insert_pending_dm(&self, pending: PendingDm) {
        self.pending.insert(pending.user_id.clone(), pending);
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        Ok(self.profiles.get(user).map(|p| p.clone()))
    }

    async fn update_profile(&self, user: &UserId, mutation: ProfileMutation<'_>) -> Result<UserProfile> {
        // The entry guard holds the shard write lock for the whole mutation.
        let mut entry = self
            .profiles
            .entry(user.clone())
            .or_insert_with(|| UserProfile::new(user.clone(), Utc::now()));
        mutation(entry.value_mut());
        Ok(entry.value().clone())
    }

    async fn list_users(&self) -> Result<Vec<UserId>> {
        let mut users: Vec<UserId> = self.profiles.iter().map(|e| e.key().clone()).collect();
        users.sort();
        Ok(users)
    }

    async fn delete_user(&self, user: &UserId) -> Result<bool> {
        self.pending.remove(user);
        self.thoughts.remove(user);
        self.reminders.retain(|_, r| r.user_id != *user);
        Ok(self.profiles.remove(user).is_some())
    }

    async fn get_pending_dm(&self, user: &UserId) -> Result<Option<PendingDm>> {
        Ok(self.pending.get(user).map(|p| p.clone()))
    }

    async fn set_pending_dm(&self, user: &UserId, now: DateTime<Utc>) -> Result<PendingDm> {
        let mut entry = self.pending.entry(user.clone()).or_insert_with(|| PendingDm {
            user_id: user.clone(),
            sent_at: now,
            attempt_count: 0,
        });
        entry.attempt_count += 1;
        entry.sent_at = now;
        debug!(user = %user, attempt = entry.attempt_count, "Pending DM set");
        Ok(entry.value().clone())
    }

    async fn clear_pending_dm(&self, user: &UserId) -> Result<bool> {
        Ok(self.pending.remove(user).is_some())
    }

    async fn list_pending_dms(&self) -> Result<Vec<PendingDm>> {
        Ok(self.pending.iter().map(|p| p.clone()).collect())
    }

    async fn get_delayed_thought(&self, user: &UserId) -> Result<Option<DelayedThought>> {
        Ok(self.thoughts.get(user).map(|t| t.clone()))
    }

    async fn put_delayed_thought_if_absent(&self, thought: DelayedThought) -> Result<bool> {
        match self.thoughts.entry(thought.user_id.clone()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(thought);
                Ok(true)
            }
        }
    }

    async fn take_due_thoughts(&self, now: DateTime<Utc>) -> Result<Vec<DelayedThought>> {
        let due: Vec<UserId> = self
            .thoughts
            .iter()
            .filter(|t| t.scheduled_at <= now)
            .map(|t| t.key().clone())
            .collect();

        // remove_if re-checks under the shard lock so a concurrent caller
        // cannot take the same thought.
        Ok(due
            .iter()
            .filter_map(|user| self.thoughts.remove_if(user, |_, t| t.scheduled_at <= now))
            .map(|(_, t)| t)
            .collect())
    }

    async fn delete_delayed_thought(&self, user: &UserId) -> Result<()> {
        self.thoughts.remove(user);
        Ok(())
    }

    async fn add_reminder(&self, reminder: Reminder) -> Result<()> {
        self.reminders.insert(reminder.id, reminder);
        Ok(())
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let mut due: Vec<Reminder> = self
            .reminders
            .iter()
            .filter(|r| r.due_at <= now)
            .map(|r| r.clone())
            .collect();
        due.sort_by_key(|r| r.due_at);
        Ok(due)
    }

    async fn update_reminder(&self, reminder: &Reminder) -> Result<()> {
        self.reminders.insert(reminder.id, reminder.clone());
        Ok(())
    }

    async fn delete_reminder(&self, id: RecordId) -> Result<()> {
        self.reminders.remove(&id);
        Ok(())
    }

    async fn cleanup_reminders(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let before = self.reminders.len();
        self.reminders.retain(|_, r| r.due_at >= cutoff);
        Ok(before - self.reminders.len())
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        Ok(self.state.get(key).map(|v| v.clone()))
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        self.state.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
