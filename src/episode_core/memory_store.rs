//! In-memory EpisodeStore, with switchable failures for exercising error paths

use super::store::{EpisodeStore, StoreError};
use super::types::{EpisodeRecord, EventRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    events: HashMap<String, Vec<EventRecord>>,
    episodes: HashMap<String, Vec<EpisodeRecord>>,
    failing_starts: HashSet<DateTime<Utc>>,
}

#[derive(Default)]
pub struct MemoryEpisodeStore {
    tables: Mutex<Tables>,
    fail_deletes: AtomicBool,
}

impl MemoryEpisodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn insert_event(&self, event: EventRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables
            .events
            .entry(event.session_id.clone())
            .or_default()
            .push(event);
        Ok(())
    }

    /// Stored episodes of a session, ordered by start time
    pub fn episodes(&self, session_id: &str) -> Result<Vec<EpisodeRecord>, StoreError> {
        let tables = self.lock()?;
        let mut episodes = tables.episodes.get(session_id).cloned().unwrap_or_default();
        episodes.sort_by_key(|e| e.start_time);
        Ok(episodes)
    }

    /// Make every subsequent `delete_episodes` call fail
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make `save_episode` fail for the episode starting at `start`
    pub fn fail_saves_for_start(&self, start: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock()?.failing_starts.insert(start);
        Ok(())
    }
}

#[async_trait]
impl EpisodeStore for MemoryEpisodeStore {
    async fn delete_episodes(&self, session_id: &str) -> Result<(), StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "delete rejected for session {}",
                session_id
            )));
        }
        self.lock()?.episodes.remove(session_id);
        Ok(())
    }

    async fn save_episode(&self, episode: &EpisodeRecord) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        if tables.failing_starts.contains(&episode.start_time) {
            return Err(StoreError::Unavailable(format!(
                "save rejected for episode starting {}",
                episode.start_time
            )));
        }
        tables
            .episodes
            .entry(episode.session_id.clone())
            .or_default()
            .push(episode.clone());
        Ok(())
    }

    async fn fetch_events_sorted(&self, session_id: &str) -> Result<Vec<EventRecord>, StoreError> {
        let tables = self.lock()?;
        let mut events = tables.events.get(session_id).cloned().unwrap_or_default();
        // Events without a timestamp sort first; the segmenters skip them.
        events.sort_by_key(|e| e.timestamp);
        Ok(events)
    }

    fn backend_type(&self) -> &'static str {
        "Memory"
    }
}
