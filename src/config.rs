use std::time::Duration;

pub const BUFFER_CAPACITY: usize = 60;
pub const CLASSIFICATION_WINDOW: usize = 30;
pub const POLL_INTERVAL_SECS: u64 = 10;
pub const HISTORY_WINDOW_MINUTES: u32 = 5;
pub const RECONNECT_ATTEMPTS: u32 = 3;
pub const RECONNECT_DELAY_SECS: u64 = 2;
pub const CONNECT_TIMEOUT_SECS: u64 = 10;
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Endpoints and timing for one telemetry session.
///
/// Only the endpoints are read from the environment. The timing values are
/// fixed defaults; tests shorten them to keep runs fast.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// REST base, e.g. `http://localhost:3000/api`.
    pub api_url: String,
    /// Push channel endpoint, e.g. `ws://localhost:3000/telemetry`.
    pub ws_url: String,
    pub buffer_capacity: usize,
    pub classification_window: usize,
    pub poll_interval: Duration,
    pub history_minutes: u32,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000/api".to_string(),
            ws_url: "ws://localhost:3000/telemetry".to_string(),
            buffer_capacity: BUFFER_CAPACITY,
            classification_window: CLASSIFICATION_WINDOW,
            poll_interval: Duration::from_secs(POLL_INTERVAL_SECS),
            history_minutes: HISTORY_WINDOW_MINUTES,
            reconnect_attempts: RECONNECT_ATTEMPTS,
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl TelemetryConfig {
    /// Defaults with `BITRATE_API_URL` / `BITRATE_WS_URL` applied when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("BITRATE_API_URL") {
            config.api_url = url;
        }
        if let Ok(url) = std::env::var("BITRATE_WS_URL") {
            config.ws_url = url;
        }
        config
    }
}
