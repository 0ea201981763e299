use super::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SegmenterError {
    #[error("Failed to fetch events for session {session_id}: {source}")]
    Fetch {
        session_id: String,
        source: StoreError,
    },
    /// Replacing the stored episodes failed as a whole (delete, lock or commit).
    /// Prior episodes are left intact.
    #[error("Failed to replace episodes for session {session_id}: {source}")]
    Replace {
        session_id: String,
        source: StoreError,
    },
    #[error("Streaming segmenter for session {0} has stopped")]
    WorkerStopped(String),
    #[error("Session {0} was already finalized")]
    SessionFinalized(String),
}
