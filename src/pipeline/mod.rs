//! Live pipeline glue between the detection loop and the streaming segmenter
//!
//! ```text
//! classifier ──► mpsc<DetectionMessage> ──► run_detection_ingestion
//!                                               │  (confidence filter)
//!                                               ▼
//!                                        StreamingSegmenter ──► EpisodeStore
//! ```

pub mod ingestion;

pub use ingestion::{run_detection_ingestion, spawn_detection_pipeline, DetectionMessage, IngestionSummary};
