//! Durable per-user state.
//!
//! [`ProfileStore`] is the single owner of every [`UserProfile`] plus the
//! small keyed records around it (pending DMs, delayed thoughts, reminders,
//! global key/value state). Profile mutations go through
//! [`ProfileStore::update_profile`], which applies a closure as one atomic
//! read-modify-write so concurrent loops never lose each other's writes.

pub mod memory;
pub mod sqlite;

use std::hash::Hash;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;
use crate::types::{DelayedThought, PendingDm, RecordId, Reminder, UserId, UserProfile};

pub use memory::MemoryProfileStore;
pub use sqlite::SqliteProfileStore;

/// A mutation applied to a profile under the store's per-user lock.
pub type ProfileMutation<'a> = Box<dyn FnOnce(&mut UserProfile) + Send + 'a>;

/// Persistence operations the core relies on.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    // -- profiles ----------------------------------------------------------

    /// Load a profile.
    ///
    /// # Errors
    /// Returns a storage or decoding error.
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>>;

    /// Atomically apply `mutation` to the user's profile, creating a blank
    /// profile first if none exists. Returns the stored result.
    ///
    /// # Errors
    /// Returns a storage or decoding error; the profile is unchanged then.
    async fn update_profile(&self, user: &UserId, mutation: ProfileMutation<'_>) -> Result<UserProfile>;

    /// Every user with a stored profile.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn list_users(&self) -> Result<Vec<UserId>>;

    /// Remove the profile and every keyed record of `user`.
    /// Returns `true` if a profile existed.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn delete_user(&self, user: &UserId) -> Result<bool>;

    // -- pending DMs -------------------------------------------------------

    /// The outstanding proactive DM for `user`, if any.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn get_pending_dm(&self, user: &UserId) -> Result<Option<PendingDm>>;

    /// Record a proactive DM sent at `now`: creates attempt 1 or increments
    /// the existing attempt count.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn set_pending_dm(&self, user: &UserId, now: DateTime<Utc>) -> Result<PendingDm>;

    /// Drop the pending DM. Returns `true` if one existed.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn clear_pending_dm(&self, user: &UserId) -> Result<bool>;

    /// All outstanding pending DMs.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn list_pending_dms(&self) -> Result<Vec<PendingDm>>;

    // -- delayed thoughts --------------------------------------------------

    /// The queued continuation for `user`, if any.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn get_delayed_thought(&self, user: &UserId) -> Result<Option<DelayedThought>>;

    /// Queue `thought` unless the user already has one. Returns `true` if
    /// it was stored.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn put_delayed_thought_if_absent(&self, thought: DelayedThought) -> Result<bool>;

    /// Remove and return every thought scheduled at or before `now`.
    /// Each thought is returned by exactly one call.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn take_due_thoughts(&self, now: DateTime<Utc>) -> Result<Vec<DelayedThought>>;

    /// Drop the queued continuation for `user`.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn delete_delayed_thought(&self, user: &UserId) -> Result<()>;

    // -- reminders ---------------------------------------------------------

    /// Queue a reminder.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn add_reminder(&self, reminder: Reminder) -> Result<()>;

    /// Reminders due at or before `now`, earliest first.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>>;

    /// Overwrite a stored reminder (used to reschedule).
    ///
    /// # Errors
    /// Returns a storage error.
    async fn update_reminder(&self, reminder: &Reminder) -> Result<()>;

    /// Delete a reminder by id.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn delete_reminder(&self, id: RecordId) -> Result<()>;

    /// Delete reminders due before `cutoff`. Returns how many were removed.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn cleanup_reminders(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    // -- global state ------------------------------------------------------

    /// Read a global value.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn get_state(&self, key: &str) -> Result<Option<String>>;

    /// Write a global value.
    ///
    /// # Errors
    /// Returns a storage error.
    async fn set_state(&self, key: &str, value: &str) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Keyed locks
// ---------------------------------------------------------------------------

/// A table of async mutexes, one per key.
///
/// Used where a multi-step operation awaits external calls between reading
/// and writing a profile and must not interleave with another such
/// operation for the same user.
#[derive(Debug)]
pub struct KeyedLocks<K: Eq + Hash> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
    /// Empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// Wait for and hold the lock for `key`.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop entries nobody is holding or waiting on.
    pub fn prune(&self) {
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no keys are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_serializes() {
        let locks = Arc::new(KeyedLocks::<UserId>::new());
        let user = UserId::from("u1");

        let guard = locks.lock(&user).await;
        let l2 = Arc::clone(&locks);
        let u2 = user.clone();
        let waiter = tokio::spawn(async move {
            let _g = l2.lock(&u2).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.await.expect("join");
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::<UserId>::new();
        let _a = locks.lock(&UserId::from("a")).await;
        let _b = locks.lock(&UserId::from("b")).await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn prune_drops_idle_entries() {
        let locks = KeyedLocks::<UserId>::new();
        {
            let _g = locks.lock(&UserId::from("a")).await;
        }
        locks.prune();
        assert!(locks.is_empty());
    }
}
