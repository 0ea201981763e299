//! Engine configuration from environment variables
//!
//! Read once at startup and snapshotted into each segmenter; picking up a
//! change means building a new segmenter.

use crate::episode_core::RelevancePolicy;
use std::env;

pub const DEFAULT_RELEVANT_LABELS: [&str; 5] = ["snoring", "gasp", "breathing", "sigh", "whispering"];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} is not a valid number: {value}")]
    NotANumber { name: &'static str, value: String },
    #[error("EPISODE_GAP_THRESHOLD_SECS must be finite and > 0, got {0}")]
    InvalidGapThreshold(f64),
    #[error("MIN_DETECTION_CONFIDENCE must be within [0, 1], got {0}")]
    InvalidMinConfidence(f64),
    #[error("PRIMARY_LABEL must not be empty")]
    EmptyPrimaryLabel,
    #[error("RELEVANT_LABELS must name at least one label")]
    NoRelevantLabels,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Longest pause between relevant events inside one episode
    pub gap_threshold_secs: f64,

    /// Labels that keep an episode open (case-insensitive)
    pub relevant_labels: Vec<String>,

    /// Label counted in `relevant_count`
    pub primary_label: String,

    /// Live detections at or below this confidence are not forwarded
    pub min_confidence: f64,

    /// Path to the SQLite database file
    pub db_path: String,

    /// Detection channel buffer size (events)
    pub channel_buffer: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gap_threshold_secs: 3.0,
            relevant_labels: DEFAULT_RELEVANT_LABELS.iter().map(|s| s.to_string()).collect(),
            primary_label: "snoring".to_string(),
            min_confidence: 0.6,
            db_path: "data/snoreflow.db".to_string(),
            channel_buffer: 1_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `EPISODE_GAP_THRESHOLD_SECS` (default: 3.0)
    /// - `RELEVANT_LABELS` (comma-separated, default: snoring,gasp,breathing,sigh,whispering)
    /// - `PRIMARY_LABEL` (default: snoring)
    /// - `MIN_DETECTION_CONFIDENCE` (default: 0.6)
    /// - `SNOREFLOW_DB_PATH` (default: data/snoreflow.db)
    /// - `DETECTION_CHANNEL_BUFFER` (default: 1000)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as `from_env`, reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            gap_threshold_secs: parse_var(&lookup, "EPISODE_GAP_THRESHOLD_SECS")?
                .unwrap_or(defaults.gap_threshold_secs),

            relevant_labels: lookup("RELEVANT_LABELS")
                .map(|s| {
                    s.split(',')
                        .map(|label| label.trim().to_string())
                        .filter(|label| !label.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.relevant_labels),

            primary_label: lookup("PRIMARY_LABEL")
                .map(|s| s.trim().to_string())
                .unwrap_or(defaults.primary_label),

            min_confidence: parse_var(&lookup, "MIN_DETECTION_CONFIDENCE")?
                .unwrap_or(defaults.min_confidence),

            db_path: lookup("SNOREFLOW_DB_PATH").unwrap_or(defaults.db_path),

            channel_buffer: parse_var(&lookup, "DETECTION_CHANNEL_BUFFER")?
                .unwrap_or(defaults.channel_buffer),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.gap_threshold_secs.is_finite() || self.gap_threshold_secs <= 0.0 {
            return Err(ConfigError::InvalidGapThreshold(self.gap_threshold_secs));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::InvalidMinConfidence(self.min_confidence));
        }
        if self.primary_label.is_empty() {
            return Err(ConfigError::EmptyPrimaryLabel);
        }
        if self.relevant_labels.is_empty() {
            return Err(ConfigError::NoRelevantLabels);
        }
        Ok(())
    }

    /// Immutable policy snapshot for one segmenter
    pub fn relevance_policy(&self) -> RelevancePolicy {
        let gap = chrono::Duration::microseconds((self.gap_threshold_secs * 1_000_000.0).round() as i64);
        RelevancePolicy::new(&self.relevant_labels, self.primary_label.clone(), gap)
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::NotANumber { name, value }),
        None => Ok(None),
    }
}
