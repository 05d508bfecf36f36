use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::TelemetryConfig;
use crate::error::{Result, TelemetryError};
use crate::kernel::sample::{parse_records, Sample, WireId};

/// Read side of the bitrate REST API, as the history loader and poller need it.
#[async_trait]
pub trait BitrateSource: Send + Sync {
    async fn current(&self, username: &str) -> Result<CurrentBitrate>;
    async fn history(&self, username: &str, minutes: u32) -> Result<Vec<Sample>>;
}

/// `GET /streams/{username}/bitrate/current`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBitrate {
    #[serde(default)]
    pub bitrate: Option<f64>,
    #[serde(default)]
    pub stream_id: Option<WireId>,
    #[serde(default)]
    pub username: Option<String>,
}

impl CurrentBitrate {
    /// Synthetic sample stamped at `fetched_at`; `None` when no bitrate was reported.
    pub fn into_sample(self, fetched_at: DateTime<Utc>) -> Option<Sample> {
        let bitrate = self.bitrate?;
        Some(Sample::new(fetched_at, bitrate).with_stream(self.stream_id.map(String::from), self.username))
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    history: Vec<serde_json::Value>,
}

/// `GET /streams/{username}/bitrate/stats`. Diagnostic only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BitrateStats {
    pub average: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub current: Option<f64>,
    pub samples: Option<u64>,
}

#[derive(Clone)]
pub struct BitrateClient {
    client: Client,
    base_url: Url,
}

impl BitrateClient {
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| TelemetryError::InvalidUrl(format!("{}: {}", config.api_url, e)))?;
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, base_url })
    }

    /// `{base}/streams/{username}/bitrate/{leaf}`, with the username percent-encoded.
    pub fn endpoint(&self, username: &str, leaf: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| TelemetryError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["streams", username, "bitrate", leaf]);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!("GET {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(TelemetryError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    pub async fn stats(&self, username: &str) -> Result<BitrateStats> {
        self.get_json(self.endpoint(username, "stats")?).await
    }
}

#[async_trait]
impl BitrateSource for BitrateClient {
    async fn current(&self, username: &str) -> Result<CurrentBitrate> {
        self.get_json(self.endpoint(username, "current")?).await
    }

    async fn history(&self, username: &str, minutes: u32) -> Result<Vec<Sample>> {
        let mut url = self.endpoint(username, "history")?;
        url.query_pairs_mut().append_pair("minutes", &minutes.to_string());
        let response: HistoryResponse = self.get_json(url).await?;
        Ok(parse_records(response.history, Utc::now()))
    }
}
