//! SQLite-backed EpisodeStore
//!
//! Timestamps are stored as integer microseconds since the Unix epoch. The
//! label histogram is kept as a JSON object in a TEXT column.

use super::store::{EpisodeStore, ReplaceOutcome, SaveFailure, StoreError};
use super::types::{ConfidenceStats, EpisodeRecord, EventRecord};
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, Transaction};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS sound_events (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        timestamp_us INTEGER,
        label TEXT NOT NULL,
        confidence REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_sound_events_session_ts
        ON sound_events(session_id, timestamp_us);

    CREATE TABLE IF NOT EXISTS episodes (
        id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        start_us INTEGER NOT NULL,
        end_us INTEGER NOT NULL,
        duration_us INTEGER NOT NULL,
        member_count INTEGER NOT NULL,
        relevant_count INTEGER NOT NULL,
        avg_confidence REAL NOT NULL,
        min_confidence REAL NOT NULL,
        max_confidence REAL NOT NULL,
        median_confidence REAL NOT NULL,
        peak_confidence REAL NOT NULL,
        label_histogram TEXT NOT NULL,
        display_name TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_episodes_session_start
        ON episodes(session_id, start_us);
";

pub struct SqliteEpisodeStore {
    conn: Mutex<Connection>,
}

impl SqliteEpisodeStore {
    /// Open (or create) the database file and its tables.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        apply_optimized_pragmas(&conn)?;
        conn.execute_batch(SCHEMA)?;

        log::info!("✅ SQLite episode store ready at {}", db_path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, mainly for tests
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("SQLite connection lock poisoned".to_string()))
    }

    /// Record one classified event (capture side). A reused event id is an error.
    pub fn insert_event(&self, event: &EventRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sound_events (id, session_id, timestamp_us, label, confidence)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.session_id,
                event.timestamp.map(|t| t.timestamp_micros()),
                event.label,
                event.confidence,
            ],
        )?;
        Ok(())
    }

    /// Stored episodes of a session, ordered by start time
    pub fn list_episodes(&self, session_id: &str) -> Result<Vec<EpisodeRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, start_us, end_us, duration_us, member_count, relevant_count,
                    avg_confidence, min_confidence, max_confidence, median_confidence,
                    peak_confidence, label_histogram, display_name
             FROM episodes WHERE session_id = ?1
             ORDER BY start_us ASC",
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(EpisodeRow {
                id: row.get(0)?,
                session_id: row.get(1)?,
                start_us: row.get(2)?,
                end_us: row.get(3)?,
                duration_us: row.get(4)?,
                member_count: row.get(5)?,
                relevant_count: row.get(6)?,
                stats: ConfidenceStats {
                    average: row.get(7)?,
                    min: row.get(8)?,
                    max: row.get(9)?,
                    median: row.get(10)?,
                    peak: row.get(11)?,
                },
                histogram_json: row.get(12)?,
                display_name: row.get(13)?,
            })
        })?;

        let mut episodes = Vec::new();
        for row in rows {
            episodes.push(row?.into_episode()?);
        }
        Ok(episodes)
    }

    /// Sessions that have at least one recorded event
    pub fn list_sessions(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT session_id FROM sound_events ORDER BY session_id")?;
        let sessions = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(sessions)
    }
}

struct EpisodeRow {
    id: String,
    session_id: String,
    start_us: i64,
    end_us: i64,
    duration_us: i64,
    member_count: i64,
    relevant_count: i64,
    stats: ConfidenceStats,
    histogram_json: String,
    display_name: String,
}

impl EpisodeRow {
    fn into_episode(self) -> Result<EpisodeRecord, StoreError> {
        let start_time = micros_to_time(self.start_us)
            .ok_or_else(|| StoreError::InvalidRow(format!("episode {} start_us", self.id)))?;
        let end_time = micros_to_time(self.end_us)
            .ok_or_else(|| StoreError::InvalidRow(format!("episode {} end_us", self.id)))?;
        let label_histogram: BTreeMap<String, usize> = serde_json::from_str(&self.histogram_json)?;

        Ok(EpisodeRecord {
            id: self.id,
            session_id: self.session_id,
            start_time,
            end_time,
            duration: Duration::microseconds(self.duration_us),
            member_count: self.member_count.max(0) as usize,
            relevant_count: self.relevant_count.max(0) as usize,
            confidence_stats: self.stats,
            label_histogram,
            display_name: self.display_name,
        })
    }
}

fn micros_to_time(us: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(us)
}

fn insert_episode(conn: &Connection, episode: &EpisodeRecord) -> Result<(), StoreError> {
    let histogram = serde_json::to_string(&episode.label_histogram)?;
    let stats = &episode.confidence_stats;

    conn.execute(
        "INSERT INTO episodes (
            id, session_id, start_us, end_us, duration_us, member_count, relevant_count,
            avg_confidence, min_confidence, max_confidence, median_confidence, peak_confidence,
            label_histogram, display_name
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            episode.id,
            episode.session_id,
            episode.start_time.timestamp_micros(),
            episode.end_time.timestamp_micros(),
            episode.duration.num_microseconds().unwrap_or(i64::MAX),
            episode.member_count as i64,
            episode.relevant_count as i64,
            stats.average,
            stats.min,
            stats.max,
            stats.median,
            stats.peak,
            histogram,
            episode.display_name,
        ],
    )?;
    Ok(())
}

/// Insert inside a savepoint so a failed row is rolled back on its own
fn insert_in_savepoint(tx: &mut Transaction<'_>, episode: &EpisodeRecord) -> Result<(), StoreError> {
    let sp = tx.savepoint()?;
    insert_episode(&sp, episode)?;
    sp.commit()?;
    Ok(())
}

#[async_trait]
impl EpisodeStore for SqliteEpisodeStore {
    async fn delete_episodes(&self, session_id: &str) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM episodes WHERE session_id = ?1", params![session_id])?;
        log::debug!("Deleted {} episodes for session {}", deleted, session_id);
        Ok(())
    }

    async fn save_episode(&self, episode: &EpisodeRecord) -> Result<(), StoreError> {
        let conn = self.lock()?;
        insert_episode(&conn, episode)
    }

    async fn fetch_events_sorted(&self, session_id: &str) -> Result<Vec<EventRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, session_id, timestamp_us, label, confidence
             FROM sound_events WHERE session_id = ?1
             ORDER BY timestamp_us ASC, rowid ASC",
        )?;

        let events = stmt
            .query_map(params![session_id], |row| {
                let timestamp_us: Option<i64> = row.get(2)?;
                Ok(EventRecord {
                    id: row.get(0)?,
                    session_id: row.get(1)?,
                    timestamp: timestamp_us.and_then(micros_to_time),
                    label: row.get(3)?,
                    confidence: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(events)
    }

    async fn replace_episodes(
        &self,
        session_id: &str,
        episodes: Vec<EpisodeRecord>,
    ) -> Result<ReplaceOutcome, StoreError> {
        let mut conn = self.lock()?;
        let mut tx = conn.transaction()?;

        tx.execute("DELETE FROM episodes WHERE session_id = ?1", params![session_id])?;

        let mut outcome = ReplaceOutcome::default();
        for episode in episodes {
            match insert_in_savepoint(&mut tx, &episode) {
                Ok(()) => outcome.saved.push(episode),
                Err(error) => outcome.failures.push(SaveFailure { episode, error }),
            }
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn backend_type(&self) -> &'static str {
        "SQLite"
    }
}
