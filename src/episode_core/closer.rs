//! Open batch shared by both segmenters, and the episode it closes into

use super::policy::RelevancePolicy;
use super::stats::StatisticsAccumulator;
use super::types::{EpisodeRecord, EventRecord};
use chrono::{DateTime, Utc};

/// In-progress episode. Keeps only the running statistics and the first/last
/// member timestamps, not the member events themselves.
#[derive(Debug, Clone, Default)]
pub struct OpenBatch {
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
    relevant_count: usize,
    stats: StatisticsAccumulator,
}

impl OpenBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stats.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stats.count()
    }

    /// Append a member. Callers feed events in timestamp order.
    pub fn push(&mut self, event: &EventRecord, timestamp: DateTime<Utc>, policy: &RelevancePolicy) {
        if self.start.is_none() {
            self.start = Some(timestamp);
        }
        self.end = Some(timestamp);

        if policy.is_primary(&event.label) {
            self.relevant_count += 1;
        }
        self.stats.add(event);
    }

    /// Close the batch into an episode and reset it. An empty batch yields `None`.
    pub fn close(&mut self, session_id: &str) -> Option<EpisodeRecord> {
        let batch = std::mem::take(self);
        let (start_time, end_time) = match (batch.start, batch.end) {
            (Some(start), Some(end)) if !batch.is_empty() => (start, end),
            _ => return None,
        };

        let member_count = batch.len();

        Some(EpisodeRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            start_time,
            end_time,
            duration: end_time - start_time,
            member_count,
            relevant_count: batch.relevant_count,
            confidence_stats: batch.stats.finalize(),
            label_histogram: batch.stats.histogram().clone(),
            display_name: format!("Episode ({} events)", member_count),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn policy() -> RelevancePolicy {
        RelevancePolicy::new(["snoring", "gasp"], "snoring", Duration::seconds(5))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_close_empty_batch_is_noop() {
        let mut batch = OpenBatch::new();
        assert!(batch.close("session").is_none());
        assert!(batch.is_empty());
    }

    #[test]
    fn test_close_builds_episode() {
        let policy = policy();
        let mut batch = OpenBatch::new();

        for (secs, label, confidence) in [(0, "snoring", 0.9), (2, "gasp", 0.5), (3, "snoring", 0.7)] {
            let event = EventRecord::new("session", at(secs), label, confidence);
            batch.push(&event, at(secs), &policy);
        }

        let episode = batch.close("session").expect("episode");

        assert_eq!(episode.start_time, at(0));
        assert_eq!(episode.end_time, at(3));
        assert_eq!(episode.duration, Duration::seconds(3));
        assert_eq!(episode.member_count, 3);
        assert_eq!(episode.relevant_count, 2);
        assert_eq!(episode.label_histogram.get("gasp"), Some(&1));
        assert_eq!(episode.display_name, "Episode (3 events)");
        assert!(batch.is_empty(), "close must reset the batch");
    }

    #[test]
    fn test_single_event_has_zero_duration() {
        let policy = policy();
        let mut batch = OpenBatch::new();
        let event = EventRecord::new("session", at(10), "snoring", 0.7);
        batch.push(&event, at(10), &policy);

        let episode = batch.close("session").unwrap();
        assert_eq!(episode.duration, Duration::zero());
        assert_eq!(episode.member_count, 1);
    }
}
