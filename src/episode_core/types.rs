//! Value types flowing through the segmenters

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One classified observation produced by the detection pipeline.
///
/// `timestamp` is `None` when the source row carried no usable time; such
/// events are skipped by both segmenters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: String,
    pub session_id: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub label: String,
    pub confidence: f64,
}

impl EventRecord {
    pub fn new(
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        label: impl Into<String>,
        confidence: f64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            timestamp: Some(timestamp),
            label: label.into(),
            confidence,
        }
    }
}

/// Confidence summary over the members of one episode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceStats {
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64,
    /// Highest member confidence (same value as `max`, kept for reports)
    pub peak: f64,
}

/// One closed episode. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    pub id: String,
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(with = "duration_micros")]
    pub duration: Duration,
    pub member_count: usize,
    pub relevant_count: usize,
    pub confidence_stats: ConfidenceStats,
    pub label_histogram: BTreeMap<String, usize>,
    pub display_name: String,
}

impl EpisodeRecord {
    /// True when the two episodes share any instant of their `[start, end]` ranges.
    pub fn overlaps(&self, other: &EpisodeRecord) -> bool {
        self.start_time <= other.end_time && other.start_time <= self.end_time
    }
}

mod duration_micros {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_microseconds().unwrap_or(i64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::microseconds(i64::deserialize(d)?))
    }
}
