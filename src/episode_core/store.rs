//! Persistence boundary consumed by both segmenters

use super::types::{EpisodeRecord, EventRecord};
use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Invalid row: {0}")]
    InvalidRow(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// An episode that was closed but could not be persisted.
#[derive(Debug, Clone)]
pub struct SaveFailure {
    pub episode: EpisodeRecord,
    pub error: StoreError,
}

/// Result of replacing all episodes of one session.
#[derive(Debug, Clone, Default)]
pub struct ReplaceOutcome {
    pub saved: Vec<EpisodeRecord>,
    pub failures: Vec<SaveFailure>,
}

/// Store contract required by the engine.
///
/// `replace_episodes` has a default built from `delete_episodes` and
/// `save_episode`; transactional stores override it so readers never see a
/// mix of stale and fresh episodes.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    /// Remove every episode of the session. Ok when there are none.
    async fn delete_episodes(&self, session_id: &str) -> Result<(), StoreError>;

    /// Append one finalized episode
    async fn save_episode(&self, episode: &EpisodeRecord) -> Result<(), StoreError>;

    /// All events of the session, ascending by timestamp
    async fn fetch_events_sorted(&self, session_id: &str) -> Result<Vec<EventRecord>, StoreError>;

    /// Delete then save as one failure unit. A delete failure aborts before
    /// anything is written; a save failure loses only that episode.
    async fn replace_episodes(
        &self,
        session_id: &str,
        episodes: Vec<EpisodeRecord>,
    ) -> Result<ReplaceOutcome, StoreError> {
        self.delete_episodes(session_id).await?;

        let mut outcome = ReplaceOutcome::default();
        for episode in episodes {
            match self.save_episode(&episode).await {
                Ok(()) => outcome.saved.push(episode),
                Err(error) => outcome.failures.push(SaveFailure { episode, error }),
            }
        }
        Ok(outcome)
    }

    /// Backend type for logging
    fn backend_type(&self) -> &'static str;
}
