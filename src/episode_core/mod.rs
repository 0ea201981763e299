//! Episode Core - gap-based segmentation of classified audio events
//!
//! Turns a time-ordered stream of labelled, confidence-scored events into
//! episodes: contiguous bursts of relevant labels, closed by a pause longer
//! than the gap threshold or by any irrelevant label.
//!
//! # Architecture
//!
//! ```text
//! EpisodeStore::fetch_events_sorted ──► BatchSegmenter ──┐
//!                                                        ├─► OpenBatch ──► EpisodeRecord ──► EpisodeStore
//! live detections ──► StreamingSegmenter (worker task) ──┘      ▲
//!                                                               │
//!                                        RelevancePolicy + StatisticsAccumulator
//! ```
//!
//! Both paths share the same policy and closing code, so a batch run over a
//! finished session reproduces what the streaming path stored live.

pub mod batch;
pub mod closer;
pub mod error;
pub mod memory_store;
pub mod policy;
pub mod sqlite_store;
pub mod stats;
pub mod store;
pub mod streaming;
pub mod types;

pub use batch::{segment_events, BatchSegmenter, RunReport, Segmented};
pub use closer::OpenBatch;
pub use error::SegmenterError;
pub use memory_store::MemoryEpisodeStore;
pub use policy::RelevancePolicy;
pub use sqlite_store::SqliteEpisodeStore;
pub use stats::StatisticsAccumulator;
pub use store::{EpisodeStore, ReplaceOutcome, SaveFailure, StoreError};
pub use streaming::{StreamReport, StreamingSegmenter, StreamingState};
pub use types::{ConfidenceStats, EpisodeRecord, EventRecord};
