//! SQLite adapter for the [`ProgressStore`] port.
//!
//! Every payload is serialised to JSON and stored in a BLOB column next to a
//! CRC-32 checksum. Keeping the payload opaque means the schema does not
//! change when a record gains a field.
//!
//! ```sql
//! CREATE TABLE affinity_states (
//!     user_id    TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! CREATE TABLE unlock_records (
//!     user_id     TEXT NOT NULL,
//!     fragment_id TEXT NOT NULL,
//!     data        BLOB NOT NULL,
//!     updated_at  TEXT NOT NULL,
//!     checksum    TEXT,
//!     PRIMARY KEY (user_id, fragment_id)
//! );
//! CREATE TABLE choice_events (
//!     seq         INTEGER PRIMARY KEY AUTOINCREMENT,
//!     event_id    TEXT NOT NULL UNIQUE,
//!     user_id     TEXT NOT NULL,
//!     occurred_at TEXT NOT NULL,
//!     data        BLOB NOT NULL,
//!     checksum    TEXT
//! );
//! ```
//!
//! A checksum mismatch is logged and the payload is still decoded; a payload
//! that no longer parses is a `Serialization` error.
//!
//! The connection sits behind a `parking_lot::Mutex`. Each port method runs
//! one short synchronous statement while holding it and never awaits.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::affinity::AffinityState;
use crate::choice::ChoiceEvent;
use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::store::ProgressStore;
use crate::types::UserId;
use crate::unlock::UnlockRecord;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS affinity_states (
        user_id    TEXT PRIMARY KEY,
        data       BLOB NOT NULL,
        updated_at TEXT NOT NULL,
        checksum   TEXT
    );
    CREATE TABLE IF NOT EXISTS unlock_records (
        user_id     TEXT NOT NULL,
        fragment_id TEXT NOT NULL,
        data        BLOB NOT NULL,
        updated_at  TEXT NOT NULL,
        checksum    TEXT,
        PRIMARY KEY (user_id, fragment_id)
    );
    CREATE TABLE IF NOT EXISTS choice_events (
        seq         INTEGER PRIMARY KEY AUTOINCREMENT,
        event_id    TEXT NOT NULL UNIQUE,
        user_id     TEXT NOT NULL,
        occurred_at TEXT NOT NULL,
        data        BLOB NOT NULL,
        checksum    TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_choice_events_user
        ON choice_events (user_id, occurred_at, seq);
";

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32fast::hash(data))
}

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// [`ProgressStore`] backed by a single SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the schema.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
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

        info!(
            path = %db_path.display(),
            wal = config.wal_mode,
            "Progress store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open a private in-memory database.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Path of the database file, `:memory:` for in-memory stores.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Run `PRAGMA integrity_check`; `Ok(false)` means corruption.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if the pragma itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Copy the database to `dest` with SQLite's online-backup API.
    ///
    /// # Errors
    /// Returns `ReverieError::Persistence` if either side fails.
    pub fn backup<P: AsRef<Path>>(&self, dest: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut target = Connection::open(dest.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut target)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(10), None)?;
        info!(
            dest = %dest.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Progress store backup completed"
        );
        Ok(())
    }

    // ------------------------------------------------------------------
    // Payload helpers
    // ------------------------------------------------------------------

    fn encode<T: Serialize>(&self, value: &T) -> Result<(Vec<u8>, Option<String>)> {
        let json = serde_json::to_vec(value)?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        Ok((json, checksum))
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, data: &[u8], stored: Option<&str>) -> Result<T> {
        if self.config.checksum_enabled {
            if let Some(expected) = stored {
                let actual = crc32_hex(data);
                if expected != actual {
                    warn!(
                        key = %key,
                        expected = %expected,
                        actual = %actual,
                        "Checksum mismatch, stored payload may be corrupt"
                    );
                }
            }
        }
        Ok(serde_json::from_slice(data)?)
    }

    // ------------------------------------------------------------------
    // Synchronous operations
    // ------------------------------------------------------------------

    fn load_affinity_sync(&self, user: UserId) -> Result<Option<AffinityState>> {
        let id = user.to_string();
        let row: Option<(Vec<u8>, Option<String>)> = self
            .conn
            .lock()
            .prepare_cached("SELECT data, checksum FROM affinity_states WHERE user_id = ?1")?
            .query_row(params![id], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        row.map(|(data, checksum)| self.decode(&id, &data, checksum.as_deref()))
            .transpose()
    }

    fn save_affinity_sync(&self, user: UserId, state: &AffinityState) -> Result<()> {
        let (data, checksum) = self.encode(state)?;
        self.conn.lock().execute(
            "INSERT INTO affinity_states (user_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![user.to_string(), data, Utc::now().to_rfc3339(), checksum],
        )?;
        debug!(user = %user, total_choices = state.total_choices, "Saved affinity state");
        Ok(())
    }

    fn load_unlock_records_sync(&self, user: UserId) -> Result<Vec<UnlockRecord>> {
        let id = user.to_string();
        let rows: Vec<(String, Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT fragment_id, data, checksum FROM unlock_records WHERE user_id = ?1",
            )?;
            let mapped = stmt.query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            mapped.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
        };

        rows.iter()
            .map(|(fragment, data, checksum)| {
                self.decode(&format!("{id}/{fragment}"), data, checksum.as_deref())
            })
            .collect()
    }

    fn save_unlock_record_sync(&self, user: UserId, record: &UnlockRecord) -> Result<()> {
        let (data, checksum) = self.encode(record)?;
        self.conn.lock().execute(
            "INSERT INTO unlock_records (user_id, fragment_id, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id, fragment_id) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![
                user.to_string(),
                record.fragment_id.as_str(),
                data,
                Utc::now().to_rfc3339(),
                checksum
            ],
        )?;
        debug!(user = %user, fragment = %record.fragment_id, "Saved unlock record");
        Ok(())
    }

    fn append_choice_event_sync(&self, event: &ChoiceEvent) -> Result<()> {
        let (data, checksum) = self.encode(event)?;
        // A retried append of the same event is a no-op.
        let inserted = self.conn.lock().execute(
            "INSERT OR IGNORE INTO choice_events (event_id, user_id, occurred_at, data, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.event_id.to_string(),
                event.user_id.to_string(),
                event.occurred_at.to_rfc3339(),
                data,
                checksum
            ],
        )?;
        debug!(
            user = %event.user_id,
            event = %event.event_id,
            duplicate = inserted == 0,
            "Appended choice event"
        );
        Ok(())
    }

    fn load_choice_events_sync(&self, user: UserId) -> Result<Vec<ChoiceEvent>> {
        let id = user.to_string();
        let rows: Vec<(String, Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT event_id, data, checksum FROM choice_events
                 WHERE user_id = ?1 ORDER BY seq",
            )?;
            let mapped = stmt.query_map(params![id], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            mapped.collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?
        };

        rows.iter()
            .map(|(event_id, data, checksum)| self.decode(event_id, data, checksum.as_deref()))
            .collect()
    }
}

impl ProgressStore for SqliteStore {
    async fn load_affinity(&self, user: UserId) -> Result<Option<AffinityState>> {
        self.load_affinity_sync(user)
    }

    async fn save_affinity(&self, user: UserId, state: &AffinityState) -> Result<()> {
        self.save_affinity_sync(user, state)
    }

    async fn load_unlock_records(&self, user: UserId) -> Result<Vec<UnlockRecord>> {
        self.load_unlock_records_sync(user)
    }

    async fn save_unlock_record(&self, user: UserId, record: &UnlockRecord) -> Result<()> {
        self.save_unlock_record_sync(user, record)
    }

    async fn append_choice_event(&self, event: &ChoiceEvent) -> Result<()> {
        self.append_choice_event_sync(event)
    }

    async fn load_choice_events(&self, user: UserId) -> Result<Vec<ChoiceEvent>> {
        self.load_choice_events_sync(user)
    }
}
