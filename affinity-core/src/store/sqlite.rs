//! SQLite-backed [`ProfileStore`] and [`VectorMemory`].
//!
//! Profiles are stored as JSON blobs so the record can grow without
//! migrations. The keyed records each get a narrow table with the columns
//! needed for due-polling:
//!
//! ```sql
//! CREATE TABLE profiles         (user_id TEXT PRIMARY KEY, data BLOB NOT NULL, updated_at INTEGER NOT NULL);
//! CREATE TABLE pending_dms      (user_id TEXT PRIMARY KEY, sent_at INTEGER NOT NULL, attempt_count INTEGER NOT NULL);
//! CREATE TABLE delayed_thoughts (user_id TEXT PRIMARY KEY, scheduled_at INTEGER NOT NULL, data BLOB NOT NULL);
//! CREATE TABLE reminders        (id TEXT PRIMARY KEY, user_id TEXT NOT NULL, due_at INTEGER NOT NULL, data BLOB NOT NULL);
//! CREATE TABLE state            (key TEXT PRIMARY KEY, value TEXT NOT NULL);
//! CREATE TABLE memories         (id INTEGER PRIMARY KEY, user_id TEXT NOT NULL, text TEXT NOT NULL,
//!                                embedding BLOB NOT NULL, created_at INTEGER NOT NULL);
//! ```
//!
//! Instants are stored as Unix milliseconds so range queries compare
//! integers. The connection sits behind a mutex; every profile update runs
//! inside a transaction while holding it.

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use tracing::{debug, info, warn};

use super::{ProfileMutation, ProfileStore};
use crate::config::StorageConfig;
use crate::error::{AffinityError, Result};
use crate::types::{DelayedThought, PendingDm, RecordId, Reminder, UserId, UserProfile};
use crate::vector::{ScoredMemory, SimilarityPolicy, VectorMemory};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS profiles (
        user_id    TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS pending_dms (
        user_id       TEXT PRIMARY KEY,
        sent_at       INTEGER NOT NULL,
        attempt_count INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS delayed_thoughts (
        user_id      TEXT PRIMARY KEY,
        scheduled_at INTEGER NOT NULL,
        data         BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_thoughts_due ON delayed_thoughts(scheduled_at);
    CREATE TABLE IF NOT EXISTS reminders (
        id      TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        due_at  INTEGER NOT NULL,
        data    BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_reminders_due ON reminders(due_at);
    CREATE TABLE IF NOT EXISTS state (
        key   TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS memories (
        id         INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id    TEXT NOT NULL,
        text       TEXT NOT NULL,
        embedding  BLOB NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id);
";

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn decode<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| AffinityError::Serialization(e.to_string()))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AffinityError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// SqliteProfileStore
// ---------------------------------------------------------------------------

/// Profile and archive store on a single SQLite database.
///
/// ```no_run
/// # use affinity_core::store::{ProfileStore, SqliteProfileStore};
/// # use affinity_core::config::StorageConfig;
/// # async fn demo() -> affinity_core::Result<()> {
/// let store = SqliteProfileStore::open("affinity.db", &StorageConfig::default())?;
/// let users = store.list_users().await?;
/// # Ok(())
/// # }
/// ```
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
    policy: SimilarityPolicy,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteProfileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteProfileStore")
            .field("db_path", &self.db_path)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SqliteProfileStore {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &StorageConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Profile store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            policy: SimilarityPolicy::from_config(config),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy: SimilarityPolicy::from_config(config),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Copy the database to `dest` with SQLite's online-backup API.
    ///
    /// # Errors
    ///
    /// Returns [`AffinityError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut target = Connection::open(dest.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut target)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Profile store backup completed"
        );
        Ok(())
    }

    fn load_profile(conn: &Connection, user: &UserId) -> Result<Option<UserProfile>> {
        let data: Option<Vec<u8>> = conn
            .prepare_cached("SELECT data FROM profiles WHERE user_id = ?1")?
            .query_row(params![user.as_str()], |row| row.get(0))
            .optional()?;
        data.map(|d| decode(&d)).transpose()
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn get_profile(&self, user: &UserId) -> Result<Option<UserProfile>> {
        let conn = self.conn.lock();
        Self::load_profile(&conn, user)
    }

    async fn update_profile(&self, user: &UserId, mutation: ProfileMutation<'_>) -> Result<UserProfile> {
        let start = Instant::now();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut profile = Self::load_profile(&tx, user)?
            .unwrap_or_else(|| UserProfile::new(user.clone(), Utc::now()));
        mutation(&mut profile);

        let json = encode(&profile)?;
        tx.execute(
            "INSERT INTO profiles (user_id, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![user.as_str(), json, millis(Utc::now())],
        )?;
        tx.commit()?;

        debug!(
            user = %user,
            affection = profile.affection,
            facts = profile.facts.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Saved profile"
        );
        Ok(profile)
    }

    async fn list_users(&self) -> Result<Vec<UserId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT user_id FROM profiles ORDER BY user_id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut users = Vec::new();
        for row in rows {
            users.push(UserId::from(row?));
        }
        Ok(users)
    }

    async fn delete_user(&self, user: &UserId) -> Result<bool> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let id = user.as_str();
        tx.execute("DELETE FROM pending_dms WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM delayed_thoughts WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM reminders WHERE user_id = ?1", params![id])?;
        tx.execute("DELETE FROM memories WHERE user_id = ?1", params![id])?;
        let deleted = tx.execute("DELETE FROM profiles WHERE user_id = ?1", params![id])?;
        tx.commit()?;
        info!(user = %user, existed = deleted > 0, "Deleted user");
        Ok(deleted > 0)
    }

    async fn get_pending_dm(&self, user: &UserId) -> Result<Option<PendingDm>> {
        let conn = self.conn.lock();
        let row: Option<(i64, u32)> = conn
            .prepare_cached("SELECT sent_at, attempt_count FROM pending_dms WHERE user_id = ?1")?
            .query_row(params![user.as_str()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;
        Ok(row.map(|(sent_at, attempt_count)| PendingDm {
            user_id: user.clone(),
            sent_at: from_millis(sent_at),
            attempt_count,
        }))
    }

    async fn set_pending_dm(&self, user: &UserId, now: DateTime<Utc>) -> Result<PendingDm> {
        let conn = self.conn.lock();
        let attempt_count: u32 = conn.query_row(
            "INSERT INTO pending_dms (user_id, sent_at, attempt_count) VALUES (?1, ?2, 1)
             ON CONFLICT(user_id) DO UPDATE SET
                sent_at = excluded.sent_at,
                attempt_count = pending_dms.attempt_count + 1
             RETURNING attempt_count",
            params![user.as_str(), millis(now)],
            |row| row.get(0),
        )?;
        debug!(user = %user, attempt = attempt_count, "Pending DM set");
        Ok(PendingDm {
            user_id: user.clone(),
            sent_at: now,
            attempt_count,
        })
    }

    async fn clear_pending_dm(&self, user: &UserId) -> Result<bool> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM pending_dms WHERE user_id = ?1", params![user.as_str()])?;
        Ok(n > 0)
    }

    async fn list_pending_dms(&self) -> Result<Vec<PendingDm>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT user_id, sent_at, attempt_count FROM pending_dms")?;
        let rows = stmt.query_map([], |row| {
            Ok(PendingDm {
                user_id: UserId::new(row.get::<_, String>(0)?),
                sent_at: from_millis(row.get(1)?),
                attempt_count: row.get(2)?,
            })
        })?;
        let mut pending = Vec::new();
        for row in rows {
            pending.push(row?);
        }
        Ok(pending)
    }

    async fn get_delayed_thought(&self, user: &UserId) -> Result<Option<DelayedThought>> {
        let conn = self.conn.lock();
        let data: Option<Vec<u8>> = conn
            .prepare_cached("SELECT data FROM delayed_thoughts WHERE user_id = ?1")?
            .query_row(params![user.as_str()], |row| row.get(0))
            .optional()?;
        data.map(|d| decode(&d)).transpose()
    }

    async fn put_delayed_thought_if_absent(&self, thought: DelayedThought) -> Result<bool> {
        let json = encode(&thought)?;
        let conn = self.conn.lock();
        let n = conn.execute(
            "INSERT OR IGNORE INTO delayed_thoughts (user_id, scheduled_at, data) VALUES (?1, ?2, ?3)",
            params![thought.user_id.as_str(), millis(thought.scheduled_at), json],
        )?;
        Ok(n > 0)
    }

    async fn take_due_thoughts(&self, now: DateTime<Utc>) -> Result<Vec<DelayedThought>> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let blobs: Vec<Vec<u8>> = {
            let mut stmt = tx.prepare_cached(
                "DELETE FROM delayed_thoughts WHERE scheduled_at <= ?1 RETURNING data",
            )?;
            let rows = stmt.query_map(params![millis(now)], |row| row.get::<_, Vec<u8>>(0))?;
            let mut blobs = Vec::new();
            for row in rows {
                blobs.push(row?);
            }
            blobs
        };
        tx.commit()?;

        let mut thoughts = Vec::with_capacity(blobs.len());
        for blob in blobs {
            match decode::<DelayedThought>(&blob) {
                Ok(t) => thoughts.push(t),
                Err(e) => warn!(error = %e, "Dropping undecodable delayed thought"),
            }
        }
        Ok(thoughts)
    }

    async fn delete_delayed_thought(&self, user: &UserId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM delayed_thoughts WHERE user_id = ?1", params![user.as_str()])?;
        Ok(())
    }

    async fn add_reminder(&self, reminder: Reminder) -> Result<()> {
        self.update_reminder(&reminder).await
    }

    async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT data FROM reminders WHERE due_at <= ?1 ORDER BY due_at")?;
        let rows = stmt.query_map(params![millis(now)], |row| row.get::<_, Vec<u8>>(0))?;
        let mut due = Vec::new();
        for row in rows {
            due.push(decode(&row?)?);
        }
        Ok(due)
    }

    async fn update_reminder(&self, reminder: &Reminder) -> Result<()> {
        let json = encode(reminder)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO reminders (id, user_id, due_at, data) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET due_at = excluded.due_at, data = excluded.data",
            params![
                reminder.id.to_string(),
                reminder.user_id.as_str(),
                millis(reminder.due_at),
                json
            ],
        )?;
        Ok(())
    }

    async fn delete_reminder(&self, id: RecordId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM reminders WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    async fn cleanup_reminders(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM reminders WHERE due_at < ?1", params![millis(cutoff)])?;
        if n > 0 {
            info!(removed = n, "Cleaned up stale reminders");
        }
        Ok(n)
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn
            .prepare_cached("SELECT value FROM state WHERE key = ?1")?
            .query_row(params![key], |row| row.get(0))
            .optional()?)
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Archive
// ---------------------------------------------------------------------------

impl SqliteProfileStore {
    fn load_embeddings(conn: &Connection, user: &UserId) -> Result<Vec<(String, Vec<f32>)>> {
        let mut stmt = conn.prepare_cached("SELECT text, embedding FROM memories WHERE user_id = ?1")?;
        let rows = stmt.query_map(params![user.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (text, blob) = row?;
            out.push((text, decode(&blob)?));
        }
        Ok(out)
    }
}

#[async_trait]
impl VectorMemory for SqliteProfileStore {
    async fn add(&self, user: &UserId, text: &str, embedding: Vec<f32>) -> Result<()> {
        let blob = encode(&embedding)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let existing = Self::load_embeddings(&tx, user)?;
        if let Some(similarity) = self
            .policy
            .find_duplicate(existing.iter().map(|(_, e)| e.as_slice()), &embedding)
        {
            debug!(user = %user, similarity, "Rejected near-duplicate memory");
            return Err(AffinityError::DuplicateMemory {
                user: user.clone(),
                similarity,
            });
        }
        tx.execute(
            "INSERT INTO memories (user_id, text, embedding, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user.as_str(), text, blob, millis(Utc::now())],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn search(&self, user: &UserId, query: &[f32], limit: usize) -> Result<Vec<ScoredMemory>> {
        let items = {
            let conn = self.conn.lock();
            Self::load_embeddings(&conn, user)?
        };
        Ok(self.policy.rank(
            items.iter().map(|(t, e)| (t.as_str(), e.as_slice())),
            query,
            limit,
        ))
    }

    async fn count(&self, user: &UserId) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
            params![user.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn delete_user(&self, user: &UserId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM memories WHERE user_id = ?1", params![user.as_str()])?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
