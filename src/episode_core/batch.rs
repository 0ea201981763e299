//! Batch segmentation over a complete, sorted session history
//!
//! Used for full re-aggregation: fetch every event of a session, rebuild the
//! episode list from scratch and replace whatever was stored before.

use super::closer::OpenBatch;
use super::error::SegmenterError;
use super::policy::RelevancePolicy;
use super::store::{EpisodeStore, SaveFailure};
use super::types::{EpisodeRecord, EventRecord};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of one re-aggregation run
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub session_id: String,
    pub events_read: usize,
    pub events_skipped: usize,
    /// Episodes persisted; its length is the session's episode total
    pub episodes: Vec<EpisodeRecord>,
    pub failures: Vec<SaveFailure>,
}

impl RunReport {
    pub fn episodes_written(&self) -> usize {
        self.episodes.len()
    }
}

pub struct BatchSegmenter {
    policy: RelevancePolicy,
    store: Arc<dyn EpisodeStore>,
}

impl BatchSegmenter {
    pub fn new(policy: RelevancePolicy, store: Arc<dyn EpisodeStore>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &RelevancePolicy {
        &self.policy
    }

    /// Re-aggregate one session.
    ///
    /// Must not run concurrently for the same session. A failed fetch or
    /// replace aborts the run with prior episodes intact; failed saves are
    /// listed in the report and do not stop the remaining episodes.
    pub async fn run(&self, session_id: &str) -> Result<RunReport, SegmenterError> {
        log::info!("🔄 Re-aggregating session {}", session_id);

        let events = self
            .store
            .fetch_events_sorted(session_id)
            .await
            .map_err(|source| SegmenterError::Fetch {
                session_id: session_id.to_string(),
                source,
            })?;

        let segmented = segment_events(session_id, &events, &self.policy);

        let outcome = self
            .store
            .replace_episodes(session_id, segmented.episodes)
            .await
            .map_err(|source| SegmenterError::Replace {
                session_id: session_id.to_string(),
                source,
            })?;

        for failure in &outcome.failures {
            log::error!(
                "❌ Episode {} of session {} not saved: {}",
                failure.episode.start_time,
                session_id,
                failure.error
            );
        }

        log::info!(
            "✅ Session {}: {} events, {} skipped, {} episodes written ({} failed) via {}",
            session_id,
            events.len(),
            segmented.skipped,
            outcome.saved.len(),
            outcome.failures.len(),
            self.store.backend_type()
        );

        Ok(RunReport {
            session_id: session_id.to_string(),
            events_read: events.len(),
            events_skipped: segmented.skipped,
            episodes: outcome.saved,
            failures: outcome.failures,
        })
    }
}

/// Episodes produced by one pass, plus how many events had no timestamp
#[derive(Debug, Clone, Default)]
pub struct Segmented {
    pub episodes: Vec<EpisodeRecord>,
    pub skipped: usize,
}

/// Single deterministic pass over events sorted by timestamp.
///
/// A relevant event extends the open batch unless it comes more than the gap
/// threshold after the previous relevant one. Any irrelevant event closes the
/// batch and breaks continuity regardless of timing.
pub fn segment_events(session_id: &str, events: &[EventRecord], policy: &RelevancePolicy) -> Segmented {
    let mut out = Segmented::default();
    let mut batch = OpenBatch::new();
    let mut last_relevant: Option<DateTime<Utc>> = None;

    for event in events {
        let Some(timestamp) = event.timestamp else {
            log::warn!(
                "⚠️  Skipping event {} ({}) in session {}: missing timestamp",
                event.id,
                event.label,
                session_id
            );
            out.skipped += 1;
            continue;
        };

        if policy.is_relevant(&event.label) {
            if let Some(previous) = last_relevant {
                if !batch.is_empty() && policy.exceeds_gap(timestamp - previous) {
                    out.episodes.extend(batch.close(session_id));
                }
            }
            batch.push(event, timestamp, policy);
            last_relevant = Some(timestamp);
        } else {
            out.episodes.extend(batch.close(session_id));
            last_relevant = None;
        }
    }

    out.episodes.extend(batch.close(session_id));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::episode_core::memory_store::MemoryEpisodeStore;
    use crate::episode_core::store::{ReplaceOutcome, StoreError};
    use chrono::{Duration, TimeZone};

    fn at_millis(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn event(label: &str, confidence: f64, ms: i64) -> EventRecord {
        EventRecord::new("session", at_millis(ms), label, confidence)
    }

    fn snore_policy(gap_secs: i64) -> RelevancePolicy {
        RelevancePolicy::new(["snoring"], "snoring", Duration::seconds(gap_secs))
    }

    #[test]
    fn test_empty_input_yields_no_episodes() {
        let segmented = segment_events("session", &[], &snore_policy(5));
        assert!(segmented.episodes.is_empty());
        assert_eq!(segmented.skipped, 0);
    }

    #[test]
    fn test_end_to_end_scenario() {
        let events = vec![
            event("snoring", 0.9, 0),
            event("snoring", 0.85, 1_000),
            event("silence", 0.99, 2_000),
            event("snoring", 0.7, 10_000),
        ];

        let episodes = segment_events("session", &events, &snore_policy(5)).episodes;

        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].start_time, at_millis(0));
        assert_eq!(episodes[0].end_time, at_millis(1_000));
        assert_eq!(episodes[0].member_count, 2);
        assert!((episodes[0].confidence_stats.average - 0.875).abs() < 1e-9);
        assert_eq!(episodes[1].start_time, at_millis(10_000));
        assert_eq!(episodes[1].end_time, at_millis(10_000));
        assert_eq!(episodes[1].member_count, 1);
        assert!((episodes[1].confidence_stats.average - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_gap_just_above_threshold_splits() {
        let events = vec![event("snoring", 0.8, 0), event("snoring", 0.8, 5_001)];
        assert_eq!(segment_events("session", &events, &snore_policy(5)).episodes.len(), 2);
    }

    #[test]
    fn test_gap_just_below_threshold_joins() {
        let events = vec![event("snoring", 0.8, 0), event("snoring", 0.8, 4_999)];
        assert_eq!(segment_events("session", &events, &snore_policy(5)).episodes.len(), 1);
    }

    #[test]
    fn test_gap_exactly_at_threshold_joins() {
        let events = vec![event("snoring", 0.8, 0), event("snoring", 0.8, 5_000)];
        assert_eq!(segment_events("session", &events, &snore_policy(5)).episodes.len(), 1);
    }

    #[test]
    fn test_irrelevant_event_breaks_continuity() {
        let events = vec![
            event("snoring", 0.8, 0),
            event("speech", 0.9, 1_000),
            event("snoring", 0.6, 1_200),
        ];

        let episodes = segment_events("session", &events, &snore_policy(5)).episodes;

        assert_eq!(episodes.len(), 2);
        assert!(episodes.iter().all(|e| e.member_count == 1));
    }

    #[test]
    fn test_missing_timestamp_is_skipped() {
        let mut broken = event("snoring", 0.9, 500);
        broken.timestamp = None;
        let events = vec![event("snoring", 0.8, 0), broken, event("snoring", 0.6, 1_000)];

        let segmented = segment_events("session", &events, &snore_policy(5));

        assert_eq!(segmented.skipped, 1);
        assert_eq!(segmented.episodes.len(), 1);
        assert_eq!(segmented.episodes[0].member_count, 2);
    }

    #[test]
    fn test_secondary_labels_extend_but_are_not_counted() {
        let policy = RelevancePolicy::new(["snoring", "gasp"], "snoring", Duration::seconds(5));
        let events = vec![
            event("snoring", 0.8, 0),
            event("gasp", 0.6, 1_000),
            event("Snoring", 0.7, 2_000),
        ];

        let episodes = segment_events("session", &events, &policy).episodes;

        assert_eq!(episodes.len(), 1);
        assert_eq!(episodes[0].member_count, 3);
        // primary label match is exact, relevance is case-insensitive
        assert_eq!(episodes[0].relevant_count, 1);
        assert_eq!(episodes[0].label_histogram.len(), 3);
    }

    #[tokio::test]
    async fn test_run_replaces_previous_episodes() {
        let store = Arc::new(MemoryEpisodeStore::new());
        for e in [event("snoring", 0.9, 0), event("snoring", 0.8, 1_000), event("snoring", 0.7, 20_000)] {
            store.insert_event(e).unwrap();
        }
        let segmenter = BatchSegmenter::new(snore_policy(5), store.clone());

        let first = segmenter.run("session").await.unwrap();
        let second = segmenter.run("session").await.unwrap();

        assert_eq!(first.episodes_written(), 2);
        assert_eq!(second.episodes_written(), 2);
        assert_eq!(store.episodes("session").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delete_failure_aborts_run() {
        let store = Arc::new(MemoryEpisodeStore::new());
        store.insert_event(event("snoring", 0.9, 0)).unwrap();
        let segmenter = BatchSegmenter::new(snore_policy(5), store.clone());
        segmenter.run("session").await.unwrap();

        store.insert_event(event("snoring", 0.9, 60_000)).unwrap();
        store.fail_deletes(true);

        let result = segmenter.run("session").await;

        assert!(matches!(result, Err(SegmenterError::Replace { .. })));
        assert_eq!(store.episodes("session").unwrap().len(), 1);
    }

    /// Deletes and saves succeed, but the replace as a whole does not commit.
    struct CommitFailingStore {
        inner: MemoryEpisodeStore,
    }

    #[async_trait::async_trait]
    impl EpisodeStore for CommitFailingStore {
        async fn delete_episodes(&self, session_id: &str) -> Result<(), StoreError> {
            self.inner.delete_episodes(session_id).await
        }

        async fn save_episode(&self, episode: &EpisodeRecord) -> Result<(), StoreError> {
            self.inner.save_episode(episode).await
        }

        async fn fetch_events_sorted(&self, session_id: &str) -> Result<Vec<EventRecord>, StoreError> {
            self.inner.fetch_events_sorted(session_id).await
        }

        async fn replace_episodes(
            &self,
            session_id: &str,
            _episodes: Vec<EpisodeRecord>,
        ) -> Result<ReplaceOutcome, StoreError> {
            self.inner.delete_episodes(session_id).await?;
            Err(StoreError::Database("commit failed".to_string()))
        }

        fn backend_type(&self) -> &'static str {
            "CommitFailing"
        }
    }

    #[tokio::test]
    async fn test_commit_failure_is_reported_as_replace() {
        let inner = MemoryEpisodeStore::new();
        inner.insert_event(event("snoring", 0.9, 0)).unwrap();
        let store = Arc::new(CommitFailingStore { inner });
        let segmenter = BatchSegmenter::new(snore_policy(5), store);

        let err = segmenter.run("session").await.unwrap_err();

        assert!(matches!(
            &err,
            SegmenterError::Replace { source: StoreError::Database(_), .. }
        ));
        let message = err.to_string();
        assert!(message.contains("replace episodes"), "{}", message);
        assert!(!message.contains("delete"), "{}", message);
    }

    #[tokio::test]
    async fn test_save_failure_does_not_stop_run() {
        let store = Arc::new(MemoryEpisodeStore::new());
        for e in [event("snoring", 0.9, 0), event("snoring", 0.8, 30_000), event("snoring", 0.7, 60_000)] {
            store.insert_event(e).unwrap();
        }
        store.fail_saves_for_start(at_millis(30_000)).unwrap();
        let segmenter = BatchSegmenter::new(snore_policy(5), store.clone());

        let report = segmenter.run("session").await.unwrap();

        assert_eq!(report.episodes_written(), 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].episode.start_time, at_millis(30_000));
    }
}
