//! Relevance policy: which labels keep an episode alive, and for how long

use chrono::Duration;
use std::collections::HashSet;

/// Immutable snapshot of the labelling rules used for one aggregation pass.
///
/// Relevant labels and the primary label are separate settings: "gasp" can
/// keep an episode open without being counted in `relevant_count`.
#[derive(Debug, Clone)]
pub struct RelevancePolicy {
    relevant_labels: HashSet<String>,
    primary_label: String,
    gap_threshold: Duration,
}

impl RelevancePolicy {
    /// Labels are matched case-insensitively; blank entries are ignored.
    pub fn new<I, S>(relevant_labels: I, primary_label: impl Into<String>, gap_threshold: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let relevant_labels = relevant_labels
            .into_iter()
            .map(|label| label.as_ref().trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();

        Self {
            relevant_labels,
            primary_label: primary_label.into(),
            gap_threshold,
        }
    }

    pub fn is_relevant(&self, label: &str) -> bool {
        let label = label.trim();
        if label.is_empty() {
            return false;
        }
        self.relevant_labels.contains(&label.to_lowercase())
    }

    /// Exact match against the primary label (used for `relevant_count`)
    pub fn is_primary(&self, label: &str) -> bool {
        label == self.primary_label
    }

    pub fn gap_threshold(&self) -> Duration {
        self.gap_threshold
    }

    pub fn primary_label(&self) -> &str {
        &self.primary_label
    }

    /// Strictly greater than the threshold closes; equal does not.
    pub fn exceeds_gap(&self, elapsed: Duration) -> bool {
        elapsed > self.gap_threshold
    }
}
