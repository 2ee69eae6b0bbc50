//! Registration persistence
//!
//! The relational engine is an external collaborator; the registry talks
//! to it through [`RecordStore`]. One row per distinct peer identity in
//! the register-record table, upserted on every successful registration
//! pass, plus an append-only connection history fed by the connection
//! notifier. [`SqliteStore`] is the bundled implementation.

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database failure
    #[error("database error: {0}")]
    Database(String),

    /// Row contents could not be (de)serialized
    #[error("store serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Durable audit record of a registration
///
/// `id` is assigned by the store on first insert; callers build records
/// with `id` 0 and the upsert keys on `peer_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterRecord {
    /// Snowflake-style numeric ID
    pub id: i64,
    /// Peer identity string (upsert key)
    pub peer_id: String,
    /// Peer display name
    pub name: String,
    /// Transport-level host identity
    pub host_id: String,
    /// Node software version
    pub version: String,
    /// Serialized end-station map (JSON)
    pub stations: String,
    /// Record signature (hex)
    pub signature: String,
    /// First-registration timestamp (unix seconds)
    pub created_at: i64,
    /// Last-refresh timestamp (unix seconds)
    pub updated_at: i64,
}

/// One persisted connect/disconnect observation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnEventRow {
    /// Remote peer identity
    pub peer_id: String,
    /// Remote address, when known
    pub addr: Option<String>,
    /// `"connected"` or `"disconnected"`
    pub kind: String,
    /// Observation timestamp (unix seconds)
    pub occurred_at: i64,
}

/// Persistence operations consumed by the registry
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Run schema migration; invoked once at `init`
    async fn migrate(&self) -> Result<(), StoreError>;

    /// Insert or update the row for `rec.peer_id`
    ///
    /// A second upsert for the same identity updates the mutable fields
    /// and `updated_at` in place rather than inserting a duplicate row.
    async fn upsert_registration(&self, rec: &RegisterRecord) -> Result<(), StoreError>;

    /// Fetch the row for a peer identity, if any
    async fn fetch_registration(&self, peer_id: &str)
        -> Result<Option<RegisterRecord>, StoreError>;

    /// Append a connection history row
    async fn record_connection(&self, row: &ConnEventRow) -> Result<(), StoreError>;

    /// Connection history for a peer, oldest first
    async fn connection_history(&self, peer_id: &str) -> Result<Vec<ConnEventRow>, StoreError>;
}

/// Snowflake-style ID generator: millisecond timestamp in the high bits,
/// a wrapping per-process sequence in the low 16
#[derive(Debug, Default)]
struct IdGen {
    seq: AtomicU16,
}

impl IdGen {
    fn next(&self) -> i64 {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        (millis << 16) | i64::from(seq)
    }
}

/// SQLite-backed [`RecordStore`]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    ids: IdGen,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    ///
    /// # Errors
    ///
    /// Returns a database error if the file cannot be opened.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: IdGen::default(),
        })
    }

    /// Open an in-memory database
    ///
    /// # Errors
    ///
    /// Returns a database error if the connection cannot be created.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
            ids: IdGen::default(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("sqlite connection lock poisoned")
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        self.lock().execute_batch(
            "CREATE TABLE IF NOT EXISTS register_records (
                 id         INTEGER PRIMARY KEY,
                 peer_id    TEXT NOT NULL UNIQUE,
                 name       TEXT NOT NULL,
                 host_id    TEXT NOT NULL,
                 version    TEXT NOT NULL,
                 stations   TEXT NOT NULL,
                 signature  TEXT NOT NULL,
                 created_at INTEGER NOT NULL,
                 updated_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS connection_events (
                 id          INTEGER PRIMARY KEY AUTOINCREMENT,
                 peer_id     TEXT NOT NULL,
                 addr        TEXT,
                 kind        TEXT NOT NULL,
                 occurred_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_connection_events_peer
                 ON connection_events (peer_id);",
        )?;
        Ok(())
    }

    async fn upsert_registration(&self, rec: &RegisterRecord) -> Result<(), StoreError> {
        let id = if rec.id == 0 { self.ids.next() } else { rec.id };
        self.lock().execute(
            "INSERT INTO register_records
                 (id, peer_id, name, host_id, version, stations, signature, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(peer_id) DO UPDATE SET
                 name       = excluded.name,
                 host_id    = excluded.host_id,
                 version    = excluded.version,
                 stations   = excluded.stations,
                 signature  = excluded.signature,
                 updated_at = excluded.updated_at",
            params![
                id,
                rec.peer_id,
                rec.name,
                rec.host_id,
                rec.version,
                rec.stations,
                rec.signature,
                rec.created_at,
                rec.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn fetch_registration(
        &self,
        peer_id: &str,
    ) -> Result<Option<RegisterRecord>, StoreError> {
        let row = self
            .lock()
            .query_row(
                "SELECT id, peer_id, name, host_id, version, stations, signature,
                        created_at, updated_at
                 FROM register_records WHERE peer_id = ?1",
                params![peer_id],
                |row| {
                    Ok(RegisterRecord {
                        id: row.get(0)?,
                        peer_id: row.get(1)?,
                        name: row.get(2)?,
                        host_id: row.get(3)?,
                        version: row.get(4)?,
                        stations: row.get(5)?,
                        signature: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    async fn record_connection(&self, row: &ConnEventRow) -> Result<(), StoreError> {
        self.lock().execute(
            "INSERT INTO connection_events (peer_id, addr, kind, occurred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![row.peer_id, row.addr, row.kind, row.occurred_at],
        )?;
        Ok(())
    }

    async fn connection_history(&self, peer_id: &str) -> Result<Vec<ConnEventRow>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT peer_id, addr, kind, occurred_at
             FROM connection_events WHERE peer_id = ?1 ORDER BY id ASC",
        )?;
        let rows = stmt
            .query_map(params![peer_id], |row| {
                Ok(ConnEventRow {
                    peer_id: row.get(0)?,
                    addr: row.get(1)?,
                    kind: row.get(2)?,
                    occurred_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

/// Current unix time in seconds, for record timestamps
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
