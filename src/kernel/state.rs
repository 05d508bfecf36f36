use serde::Serialize;
use tracing::{debug, info};

use super::buffer::SampleBuffer;
use super::classifier::{self, QualityTier, WindowStats};
use super::connection::{ConnectionGraph, ConnectionRequest, ConnectionState};
use super::sample::Sample;
use crate::config::TelemetryConfig;

/// Read-only view handed to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    pub tier: QualityTier,
    pub connection_state: ConnectionState,
    pub sample_count: usize,
    pub is_loading: bool,
}

/// Strict state delta. This is the ONLY way session state mutates.
#[derive(Debug, Clone)]
pub enum StateDelta {
    /// Back to empty defaults: no samples, `Unknown`, `Disconnected`, not loading.
    Reset,
    LoadingStarted,
    LoadingFinished,
    SampleAppended(Sample),
    WindowReplaced(Vec<Sample>),
    Connection(ConnectionRequest),
}

#[derive(Debug, Clone)]
pub struct SessionState {
    buffer: SampleBuffer,
    tier: QualityTier,
    connection: ConnectionState,
    is_loading: bool,
    window: usize,
    // Monotonic, bumped on every reduction
    pub version: u64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&TelemetryConfig::default())
    }
}

impl SessionState {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            buffer: SampleBuffer::new(config.buffer_capacity),
            tier: QualityTier::Unknown,
            connection: ConnectionState::Disconnected,
            is_loading: false,
            window: config.classification_window,
            version: 0,
        }
    }

    pub fn reduce(&mut self, delta: StateDelta) {
        self.version += 1;

        match delta {
            StateDelta::Reset => {
                self.buffer.clear();
                self.tier = QualityTier::Unknown;
                self.connection = ConnectionState::Disconnected;
                self.is_loading = false;
            }
            StateDelta::LoadingStarted => self.is_loading = true,
            StateDelta::LoadingFinished => self.is_loading = false,
            StateDelta::SampleAppended(sample) => {
                self.buffer.append(sample);
                self.is_loading = false;
                self.reclassify();
            }
            StateDelta::WindowReplaced(samples) => {
                self.buffer.replace(samples);
                self.is_loading = false;
                self.reclassify();
            }
            StateDelta::Connection(request) => {
                match ConnectionGraph::transition(self.connection, request) {
                    Some(next) => {
                        debug!("Connection {} -> {} ({:?})", self.connection, next, request);
                        self.connection = next;
                    }
                    None => debug!("Ignored {:?} while {}", request, self.connection),
                }
            }
        }
    }

    fn reclassify(&mut self) {
        let stats = self.stats();
        let tier = stats.map(|s| s.tier()).unwrap_or(QualityTier::Unknown);
        if tier != self.tier {
            match stats {
                Some(s) => info!(
                    "Stream health {} -> {} (avg {:.0}, drops {:.0}%, severe {:.0}%)",
                    self.tier,
                    tier,
                    s.average,
                    s.drop_fraction * 100.0,
                    s.severe_drop_fraction * 100.0
                ),
                None => info!("Stream health {} -> {} ({} samples)", self.tier, tier, self.buffer.len()),
            }
        }
        self.tier = tier;
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            tier: self.tier,
            connection_state: self.connection,
            sample_count: self.buffer.len(),
            is_loading: self.is_loading,
        }
    }

    pub fn stats(&self) -> Option<WindowStats> {
        classifier::window_stats(&self.buffer.recent(self.window), self.window)
    }

    // Read-only accessors
    pub fn tier(&self) -> QualityTier {
        self.tier
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.buffer.snapshot()
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_loading(&self) -> bool {
        self.is_loading
    }
}
