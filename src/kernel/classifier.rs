use std::fmt;

use serde::{Deserialize, Serialize};

use super::sample::Sample;
use crate::config::CLASSIFICATION_WINDOW;

/// Fewer samples than this in the window classifies as `Unknown`.
pub const MIN_SAMPLES: usize = 3;

const DROP_RATIO: f64 = 0.75;
const SEVERE_DROP_RATIO: f64 = 0.5;

const GOOD_MIN_AVERAGE: f64 = 3000.0;
const GOOD_MAX_DROP: f64 = 0.15;

const INTERMITTENT_MIN_AVERAGE: f64 = 1500.0;
const INTERMITTENT_MAX_DROP: f64 = 0.35;
const INTERMITTENT_MAX_SEVERE: f64 = 0.10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QualityTier {
    /// Not enough data to judge.
    Unknown,
    Good,
    Intermittent,
    Poor,
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::Unknown
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QualityTier::Unknown => "unknown",
            QualityTier::Good => "good",
            QualityTier::Intermittent => "intermittent",
            QualityTier::Poor => "poor",
        };
        f.write_str(label)
    }
}

/// Aggregates over the classification window.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WindowStats {
    pub samples: usize,
    pub average: f64,
    pub minimum: f64,
    pub maximum: f64,
    /// Fraction of samples below 75% of the average.
    pub drop_fraction: f64,
    /// Fraction of samples below 50% of the average.
    pub severe_drop_fraction: f64,
}

impl WindowStats {
    /// First matching rule wins.
    pub fn tier(&self) -> QualityTier {
        if self.samples < MIN_SAMPLES {
            QualityTier::Unknown
        } else if self.average >= GOOD_MIN_AVERAGE
            && self.drop_fraction < GOOD_MAX_DROP
            && self.severe_drop_fraction == 0.0
        {
            QualityTier::Good
        } else if self.average >= INTERMITTENT_MIN_AVERAGE
            && self.drop_fraction < INTERMITTENT_MAX_DROP
            && self.severe_drop_fraction < INTERMITTENT_MAX_SEVERE
        {
            QualityTier::Intermittent
        } else {
            QualityTier::Poor
        }
    }
}

/// Stats over the last `min(window, len)` samples, or `None` when that is
/// fewer than `MIN_SAMPLES`.
pub fn window_stats(samples: &[Sample], window: usize) -> Option<WindowStats> {
    let start = samples.len().saturating_sub(window);
    let recent = &samples[start..];
    if recent.len() < MIN_SAMPLES {
        return None;
    }

    let count = recent.len() as f64;
    let (sum, minimum, maximum) = recent.iter().map(Sample::bitrate).fold(
        (0.0, f64::INFINITY, f64::NEG_INFINITY),
        |(sum, lo, hi), b| (sum + b, lo.min(b), hi.max(b)),
    );
    let average = sum / count;

    let drops = recent.iter().filter(|s| s.bitrate() < average * DROP_RATIO).count();
    let severe = recent.iter().filter(|s| s.bitrate() < average * SEVERE_DROP_RATIO).count();

    Some(WindowStats {
        samples: recent.len(),
        average,
        minimum,
        maximum,
        drop_fraction: drops as f64 / count,
        severe_drop_fraction: severe as f64 / count,
    })
}

/// Pure: tier of the last `min(window, len)` samples. No smoothing between calls.
pub fn classify_recent(samples: &[Sample], window: usize) -> QualityTier {
    window_stats(samples, window)
        .map(|stats| stats.tier())
        .unwrap_or(QualityTier::Unknown)
}

pub fn classify(samples: &[Sample]) -> QualityTier {
    classify_recent(samples, CLASSIFICATION_WINDOW)
}
