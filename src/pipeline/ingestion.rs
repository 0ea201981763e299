//! Live detection ingestion - channel consumer feeding the streaming segmenter
//!
//! The classifier side sends `DetectionMessage`s into a bounded mpsc channel.
//! This task filters low-confidence detections, forwards the rest to one
//! session's `StreamingSegmenter`, and finalizes the session when told to stop
//! or when every sender is gone.

use crate::config::EngineConfig;
use crate::episode_core::{EpisodeStore, EventRecord, StreamReport, StreamingSegmenter};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum DetectionMessage {
    Event(EventRecord),
    /// Recording stopped, analysis completed, or analysis failed
    Stop,
}

/// Counters for one ingestion run
#[derive(Debug, Clone, Default)]
pub struct IngestionSummary {
    pub received: u64,
    pub forwarded: u64,
    pub dropped_low_confidence: u64,
    pub episodes_written: usize,
    pub save_failures: usize,
}

impl IngestionSummary {
    fn absorb(&mut self, report: &StreamReport) {
        self.episodes_written += report.closed.len();
        self.save_failures += report.failures.len();
    }
}

/// Consume detections until `Stop` or channel close, then finalize the session.
pub async fn run_detection_ingestion(
    mut rx: mpsc::Receiver<DetectionMessage>,
    segmenter: StreamingSegmenter,
    min_confidence: f64,
) -> IngestionSummary {
    log::info!("🚀 Starting detection ingestion for session {}", segmenter.session_id());
    log::info!("   └─ Minimum confidence: {:.2}", min_confidence);

    let mut summary = IngestionSummary::default();

    while let Some(message) = rx.recv().await {
        match message {
            DetectionMessage::Event(event) => {
                summary.received += 1;

                if event.confidence <= min_confidence {
                    summary.dropped_low_confidence += 1;
                    log::debug!(
                        "Dropped {} ({:.2}) below confidence threshold",
                        event.label,
                        event.confidence
                    );
                    continue;
                }

                match segmenter.process(event).await {
                    Ok(report) => {
                        summary.forwarded += 1;
                        summary.absorb(&report);
                    }
                    Err(e) => {
                        log::error!("❌ Streaming segmenter rejected event: {}", e);
                        break;
                    }
                }
            }
            DetectionMessage::Stop => {
                log::info!("Detection ingestion received stop signal");
                break;
            }
        }
    }

    match segmenter.finalize_session().await {
        Ok(report) => summary.absorb(&report),
        Err(e) => log::error!("❌ Failed to finalize session {}: {}", segmenter.session_id(), e),
    }

    log::info!(
        "✅ Detection ingestion stopped: {} received, {} forwarded, {} dropped, {} episodes ({} failed)",
        summary.received,
        summary.forwarded,
        summary.dropped_low_confidence,
        summary.episodes_written,
        summary.save_failures
    );

    summary
}

/// Wire a streaming segmenter and its ingestion task for one recording session.
pub fn spawn_detection_pipeline(
    session_id: &str,
    config: &EngineConfig,
    store: Arc<dyn EpisodeStore>,
) -> (mpsc::Sender<DetectionMessage>, JoinHandle<IngestionSummary>) {
    let (tx, rx) = mpsc::channel(config.channel_buffer.max(1));
    let segmenter = StreamingSegmenter::spawn(
        session_id,
        config.relevance_policy(),
        store,
        config.channel_buffer,
    );

    let handle = tokio::spawn(run_detection_ingestion(rx, segmenter, config.min_confidence));
    (tx, handle)
}
