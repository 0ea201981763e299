//! Live segmentation of events as they arrive
//!
//! `StreamingState` holds the segmentation rules and is driven synchronously.
//! `StreamingSegmenter` wraps it in a single tokio task so that arrivals and
//! the gap-timeout finalization are serialized through one `select!` loop:
//!
//! ```text
//! process(event) ──► mpsc ──► worker task ──► StreamingState::on_event
//!                               │    ▲
//!                  sleep_until(deadline)   (re-armed on every relevant arrival)
//!                               │
//!                               └──► StreamingState::on_timeout ──► EpisodeStore
//! ```

use super::closer::OpenBatch;
use super::error::SegmenterError;
use super::policy::RelevancePolicy;
use super::store::{EpisodeStore, SaveFailure};
use super::types::{EpisodeRecord, EventRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// What one arrival did to the open batch
#[derive(Debug, Default)]
pub struct Arrival {
    /// Episodes closed by this arrival (gap detected or irrelevant label)
    pub closed: Vec<EpisodeRecord>,
    /// Generation to arm the finalization timer with, if the event joined the batch
    pub arm: Option<u64>,
}

/// Synchronous streaming segmentation rules.
pub struct StreamingState {
    session_id: String,
    policy: RelevancePolicy,
    batch: OpenBatch,
    last_processed: Option<DateTime<Utc>>,
    /// Bumped every time a timer is armed; a timeout only closes the batch it was armed for
    generation: u64,
    finished: bool,
}

impl StreamingState {
    pub fn new(session_id: impl Into<String>, policy: RelevancePolicy) -> Self {
        Self {
            session_id: session_id.into(),
            policy,
            batch: OpenBatch::new(),
            last_processed: None,
            generation: 0,
            finished: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn policy(&self) -> &RelevancePolicy {
        &self.policy
    }

    pub fn open_len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Apply one arrival. The caller must already have cancelled any pending timer.
    pub fn on_event(&mut self, event: &EventRecord) -> Arrival {
        let mut arrival = Arrival::default();

        let Some(timestamp) = event.timestamp else {
            log::warn!(
                "⚠️  Skipping live event {} ({}) in session {}: missing timestamp",
                event.id,
                event.label,
                self.session_id
            );
            return arrival;
        };

        if let Some(previous) = self.last_processed {
            if self.policy.exceeds_gap(timestamp - previous) {
                arrival.closed.extend(self.batch.close(&self.session_id));
            }
        }

        if self.policy.is_relevant(&event.label) {
            self.batch.push(event, timestamp, &self.policy);
            self.generation += 1;
            arrival.arm = Some(self.generation);
        } else {
            arrival.closed.extend(self.batch.close(&self.session_id));
        }

        self.last_processed = Some(timestamp);
        arrival
    }

    /// Gap timeout fired. No-op if a later arrival re-armed or the batch is empty.
    pub fn on_timeout(&mut self, generation: u64) -> Option<EpisodeRecord> {
        if generation != self.generation {
            log::debug!(
                "Stale finalization timer ignored for session {} (armed {}, current {})",
                self.session_id,
                generation,
                self.generation
            );
            return None;
        }
        self.batch.close(&self.session_id)
    }

    /// Close whatever is open. Subsequent calls return `None`.
    pub fn finish(&mut self) -> Option<EpisodeRecord> {
        if self.finished {
            return None;
        }
        self.finished = true;
        self.batch.close(&self.session_id)
    }
}

/// Episodes persisted (and failed) since the previous report
#[derive(Debug, Clone, Default)]
pub struct StreamReport {
    pub closed: Vec<EpisodeRecord>,
    pub failures: Vec<SaveFailure>,
}

impl StreamReport {
    pub fn is_empty(&self) -> bool {
        self.closed.is_empty() && self.failures.is_empty()
    }

    fn merge(&mut self, other: StreamReport) {
        self.closed.extend(other.closed);
        self.failures.extend(other.failures);
    }
}

enum Command {
    Event {
        event: EventRecord,
        reply: oneshot::Sender<Result<StreamReport, SegmenterError>>,
    },
    Finalize {
        reply: oneshot::Sender<StreamReport>,
    },
}

/// Handle to a live segmentation worker for one session.
///
/// Cloning the handle shares the same worker. When every handle is dropped
/// the worker finalizes the session on its own before exiting.
#[derive(Clone)]
pub struct StreamingSegmenter {
    session_id: String,
    tx: mpsc::Sender<Command>,
}

impl StreamingSegmenter {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(
        session_id: impl Into<String>,
        policy: RelevancePolicy,
        store: Arc<dyn EpisodeStore>,
        buffer: usize,
    ) -> Self {
        let session_id = session_id.into();
        let (tx, rx) = mpsc::channel(buffer.max(1));

        let worker = SegmenterWorker {
            state: StreamingState::new(session_id.clone(), policy),
            store,
            deadline: None,
            unreported: StreamReport::default(),
        };
        tokio::spawn(worker.run(rx));

        Self { session_id, tx }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Feed one event. The report includes episodes closed by this arrival and
    /// any closed by the gap timer since the previous call.
    pub async fn process(&self, event: EventRecord) -> Result<StreamReport, SegmenterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Event { event, reply })
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())?
    }

    /// End the session: cancel the pending timer and close any open batch.
    /// Calling it again returns an empty report.
    pub async fn finalize_session(&self) -> Result<StreamReport, SegmenterError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Finalize { reply })
            .await
            .map_err(|_| self.stopped())?;
        rx.await.map_err(|_| self.stopped())
    }

    fn stopped(&self) -> SegmenterError {
        SegmenterError::WorkerStopped(self.session_id.clone())
    }
}

struct SegmenterWorker {
    state: StreamingState,
    store: Arc<dyn EpisodeStore>,
    deadline: Option<(Instant, u64)>,
    /// Timer-closed results waiting for the next caller
    unreported: StreamReport,
}

impl SegmenterWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        log::info!("🎧 Streaming segmenter started for session {}", self.state.session_id());

        loop {
            tokio::select! {
                biased;

                command = rx.recv() => match command {
                    Some(Command::Event { event, reply }) => {
                        let result = self.handle_event(event).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Finalize { reply }) => {
                        let report = self.handle_finalize().await;
                        let _ = reply.send(report);
                    }
                    None => {
                        if !self.state.is_finished() {
                            log::warn!(
                                "⚠️  All handles dropped for session {}, finalizing",
                                self.state.session_id()
                            );
                            let report = self.handle_finalize().await;
                            for failure in &report.failures {
                                log::error!(
                                    "❌ Unreported episode loss in session {}: {}",
                                    self.state.session_id(),
                                    failure.error
                                );
                            }
                        }
                        break;
                    }
                },

                generation = wait_for(self.deadline) => {
                    self.deadline = None;
                    if let Some(episode) = self.state.on_timeout(generation) {
                        log::debug!(
                            "⏰ Gap timeout closed episode in session {}",
                            self.state.session_id()
                        );
                        let report = self.persist(vec![episode]).await;
                        self.unreported.merge(report);
                    }
                }
            }
        }

        log::info!("✅ Streaming segmenter stopped for session {}", self.state.session_id());
    }

    async fn handle_event(&mut self, event: EventRecord) -> Result<StreamReport, SegmenterError> {
        if self.state.is_finished() {
            return Err(SegmenterError::SessionFinalized(self.state.session_id().to_string()));
        }

        // Cancel before deciding anything about this arrival. A skipped event
        // (no timestamp) leaves the pending timer armed.
        if event.timestamp.is_some() {
            self.deadline = None;
        }

        let arrival = self.state.on_event(&event);
        if let Some(generation) = arrival.arm {
            let gap = self.state.policy().gap_threshold().to_std().unwrap_or_default();
            self.deadline = Some((Instant::now() + gap, generation));
        }

        let report = self.persist(arrival.closed).await;
        let mut out = std::mem::take(&mut self.unreported);
        out.merge(report);
        Ok(out)
    }

    async fn handle_finalize(&mut self) -> StreamReport {
        self.deadline = None;

        let closed: Vec<EpisodeRecord> = self.state.finish().into_iter().collect();
        let report = self.persist(closed).await;

        let mut out = std::mem::take(&mut self.unreported);
        out.merge(report);
        out
    }

    async fn persist(&self, episodes: Vec<EpisodeRecord>) -> StreamReport {
        let mut report = StreamReport::default();

        for episode in episodes {
            match self.store.save_episode(&episode).await {
                Ok(()) => {
                    log::debug!(
                        "✅ Episode saved: session {} {} -> {} ({} events)",
                        episode.session_id,
                        episode.start_time,
                        episode.end_time,
                        episode.member_count
                    );
                    report.closed.push(episode);
                }
                Err(error) => {
                    log::error!(
                        "❌ Failed to save episode for session {}: {}",
                        episode.session_id,
                        error
                    );
                    report.failures.push(SaveFailure { episode, error });
                }
            }
        }

        report
    }
}

async fn wait_for(deadline: Option<(Instant, u64)>) -> u64 {
    match deadline {
        Some((at, generation)) => {
            sleep_until(at).await;
            generation
        }
        None => std::future::pending().await,
    }
}
