use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One bitrate measurement. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    timestamp: DateTime<Utc>,
    bitrate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

impl Sample {
    /// Negative or NaN bitrates are clamped to zero.
    pub fn new(timestamp: DateTime<Utc>, bitrate: f64) -> Self {
        Self {
            timestamp,
            bitrate: if bitrate.is_nan() { 0.0 } else { bitrate.max(0.0) },
            stream_id: None,
            username: None,
        }
    }

    pub fn with_stream(mut self, stream_id: Option<String>, username: Option<String>) -> Self {
        self.stream_id = stream_id;
        self.username = username;
        self
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn bitrate(&self) -> f64 {
        self.bitrate
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
}

/// Timestamps arrive either as epoch milliseconds or as RFC 3339 text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(i64),
    Fractional(f64),
    Text(String),
}

impl WireTimestamp {
    fn resolve(&self) -> Option<DateTime<Utc>> {
        match self {
            WireTimestamp::Millis(ms) => Utc.timestamp_millis_opt(*ms).single(),
            WireTimestamp::Fractional(ms) => Utc.timestamp_millis_opt(ms.round() as i64).single(),
            WireTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

/// Stream ids are numeric on some backends, strings on others.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

/// A sample as it appears on the wire. Every field is optional here;
/// `into_sample` decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRecord {
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,
    #[serde(default)]
    pub bitrate: Option<f64>,
    #[serde(default)]
    pub stream_id: Option<WireId>,
    #[serde(default)]
    pub username: Option<String>,
}

impl SampleRecord {
    /// Missing or unreadable timestamps fall back to `received_at`.
    /// Returns `None` only when there is no bitrate.
    pub fn into_sample(self, received_at: DateTime<Utc>) -> Option<Sample> {
        let bitrate = self.bitrate?;
        let timestamp = self
            .timestamp
            .as_ref()
            .and_then(WireTimestamp::resolve)
            .unwrap_or(received_at);
        Some(Sample::new(timestamp, bitrate).with_stream(self.stream_id.map(String::from), self.username))
    }
}

/// Decode a list of loosely-typed records, dropping the ones that can't be used.
pub fn parse_records(values: Vec<serde_json::Value>, received_at: DateTime<Utc>) -> Vec<Sample> {
    let total = values.len();
    let samples: Vec<Sample> = values
        .into_iter()
        .filter_map(|value| serde_json::from_value::<SampleRecord>(value).ok())
        .filter_map(|record| record.into_sample(received_at))
        .collect();

    if samples.len() < total {
        warn!("Dropped {} unusable history records", total - samples.len());
    }
    samples
}
