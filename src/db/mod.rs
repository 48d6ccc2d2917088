pub mod schema;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::core::metrics::MetricsSnapshot;

/// One observed actor, as persisted in `mm_intel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorRecord {
    pub wallet_id: String,
    pub threat_level: f64,
    pub behavior_pattern: String,
    pub trust_score: f64,
    pub total_raids: u64,
    pub historical_data_json: String,
    pub last_seen_at: DateTime<Utc>,
}

/// Incoming observation to merge into an actor's record.
#[derive(Debug, Clone)]
pub struct ActorUpsert {
    pub wallet_id: String,
    pub risk_score: f64,
    pub behavior_pattern: String,
    pub historical_data_json: String,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Json(serde_json::Error),
    Poisoned,
    Join(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {e}"),
            StoreError::Json(e) => write!(f, "JSON error: {e}"),
            StoreError::Poisoned => write!(f, "registry lock poisoned"),
            StoreError::Join(e) => write!(f, "blocking write task failed: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

/// Fixed-width RFC 3339 so that text order equals time order in SQL.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

const ACTOR_COLUMNS: &str =
    "wallet_id, threat_level, behavior_pattern, trust_score, total_raids, historical_data_json, last_seen_at";

pub struct Database {
    conn: Connection,
}

/// Thread-safe wrapper around Database. The single connection behind the
/// mutex is the only writer, which serializes every merge.
#[derive(Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    /// Read-only handle for dashboard-style readers. Never migrates.
    pub fn open_read_only(path: &Path) -> Result<Self, StoreError> {
        let db = Database::open_read_only(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(db)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or merge an actor, returning the merged record.
    pub fn upsert_actor(&self, upsert: &ActorUpsert) -> Result<ActorRecord, StoreError> {
        Ok(self.lock()?.upsert_actor(upsert)?)
    }

    pub fn get_actor(&self, wallet_id: &str) -> Result<Option<ActorRecord>, StoreError> {
        Ok(self.lock()?.get_actor(wallet_id)?)
    }

    /// Most recently seen actors first.
    pub fn recent_actors(&self, limit: usize) -> Result<Vec<ActorRecord>, StoreError> {
        Ok(self.lock()?.recent_actors(limit)?)
    }

    pub fn all_actors(&self) -> Result<Vec<ActorRecord>, StoreError> {
        Ok(self.lock()?.all_actors()?)
    }

    pub fn actor_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.actor_count()?)
    }

    /// Persist the latest counters so external readers can see them.
    pub fn record_metrics(&self, snapshot: &MetricsSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)?;
        self.lock()?.record_metrics(&json)?;
        Ok(())
    }

    pub fn latest_metrics(&self) -> Result<Option<MetricsSnapshot>, StoreError> {
        let json = self.lock()?.latest_metrics()?;
        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }
}

impl Database {
    pub fn open(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_read_only(path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// One statement: insert with `total_raids = 1`, or merge into the
    /// existing row (mean threat, +1 raid, newest descriptive fields,
    /// `last_seen_at` never moves backwards).
    pub fn upsert_actor(&self, u: &ActorUpsert) -> Result<ActorRecord, rusqlite::Error> {
        let sql = format!(
            "INSERT INTO mm_intel ({ACTOR_COLUMNS})
             VALUES (?1, ?2, ?3, 100.0 - ?2, 1, ?4, ?5)
             ON CONFLICT(wallet_id) DO UPDATE SET
                 total_raids          = mm_intel.total_raids + 1,
                 threat_level         = (mm_intel.threat_level + excluded.threat_level) / 2.0,
                 trust_score          = 100.0 - (mm_intel.threat_level + excluded.threat_level) / 2.0,
                 behavior_pattern     = excluded.behavior_pattern,
                 historical_data_json = excluded.historical_data_json,
                 last_seen_at         = MAX(mm_intel.last_seen_at, excluded.last_seen_at)
             RETURNING {ACTOR_COLUMNS}"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        stmt.query_row(
            rusqlite::params![
                u.wallet_id,
                u.risk_score,
                u.behavior_pattern,
                u.historical_data_json,
                format_timestamp(u.seen_at),
            ],
            Self::row_to_actor,
        )
    }

    fn row_to_actor(row: &rusqlite::Row) -> rusqlite::Result<ActorRecord> {
        let seen: String = row.get(6)?;
        Ok(ActorRecord {
            wallet_id: row.get(0)?,
            threat_level: row.get(1)?,
            behavior_pattern: row.get(2)?,
            trust_score: row.get(3)?,
            total_raids: row.get::<_, i64>(4)? as u64,
            historical_data_json: row.get(5)?,
            last_seen_at: parse_timestamp(6, &seen)?,
        })
    }

    pub fn get_actor(&self, wallet_id: &str) -> Result<Option<ActorRecord>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ACTOR_COLUMNS} FROM mm_intel WHERE wallet_id = ?1"))?;
        stmt.query_row(rusqlite::params![wallet_id], Self::row_to_actor)
            .optional()
    }

    pub fn recent_actors(&self, limit: usize) -> Result<Vec<ActorRecord>, rusqlite::Error> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ACTOR_COLUMNS} FROM mm_intel ORDER BY last_seen_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(rusqlite::params![limit as i64], Self::row_to_actor)?;
        rows.collect()
    }

    pub fn all_actors(&self) -> Result<Vec<ActorRecord>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {ACTOR_COLUMNS} FROM mm_intel ORDER BY last_seen_at DESC"))?;
        let rows = stmt.query_map([], Self::row_to_actor)?;
        rows.collect()
    }

    pub fn actor_count(&self) -> Result<usize, rusqlite::Error> {
        self.conn.query_row("SELECT COUNT(*) FROM mm_intel", [], |row| {
            row.get::<_, i64>(0).map(|c| c as usize)
        })
    }

    pub fn record_metrics(&self, snapshot_json: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO radar_stats (id, snapshot_json, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET snapshot_json = excluded.snapshot_json, updated_at = excluded.updated_at",
            rusqlite::params![snapshot_json, format_timestamp(Utc::now())],
        )?;
        Ok(())
    }

    pub fn latest_metrics(&self) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row("SELECT snapshot_json FROM radar_stats WHERE id = 1", [], |row| row.get(0))
            .optional()
    }
}
