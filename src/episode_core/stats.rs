//! Running confidence statistics and label histogram for an open batch

use super::types::{ConfidenceStats, EventRecord};
use std::collections::BTreeMap;

/// Incremental reducer over the members of one batch.
///
/// Confidences are retained and sorted at finalize time for the median;
/// batches are short bursts, not unbounded streams.
#[derive(Debug, Clone, Default)]
pub struct StatisticsAccumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    confidences: Vec<f64>,
    histogram: BTreeMap<String, usize>,
}

impl StatisticsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, event: &EventRecord) {
        let confidence = event.confidence;

        if self.count == 0 {
            self.min = confidence;
            self.max = confidence;
        } else {
            self.min = self.min.min(confidence);
            self.max = self.max.max(confidence);
        }

        self.count += 1;
        self.sum += confidence;
        self.confidences.push(confidence);
        *self.histogram.entry(event.label.clone()).or_insert(0) += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn histogram(&self) -> &BTreeMap<String, usize> {
        &self.histogram
    }

    pub fn finalize(&self) -> ConfidenceStats {
        if self.count == 0 {
            return ConfidenceStats::default();
        }

        let mut sorted = self.confidences.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let middle = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[middle - 1] + sorted[middle]) / 2.0
        } else {
            sorted[middle]
        };

        ConfidenceStats {
            average: self.sum / self.count as f64,
            min: self.min,
            max: self.max,
            median,
            peak: self.max,
        }
    }
}
