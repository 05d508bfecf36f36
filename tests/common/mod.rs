#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::StatusCode;

use streamwatch::error::{Result, TelemetryError};
use streamwatch::kernel::sample::Sample;
use streamwatch::services::bitrate::{BitrateSource, CurrentBitrate};
use streamwatch::{TelemetryController, TelemetrySnapshot, TelemetryConfig};

/// Scripted answer for one history request.
pub enum Reply {
    Samples(Vec<Sample>),
    Fail,
}

/// In-memory stand-in for the REST API. Once the script runs out,
/// history answers with an empty list.
#[derive(Default)]
pub struct FakeSource {
    history: Mutex<VecDeque<Reply>>,
    current: Mutex<Option<Option<f64>>>,
    pub history_calls: AtomicUsize,
    pub current_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, reply: Reply) -> Self {
        self.history.lock().unwrap().push_back(reply);
        self
    }

    /// `Some(rate)` answers with that bitrate, `None` answers with no bitrate.
    /// Without this the current endpoint fails.
    pub fn with_current(self, bitrate: Option<f64>) -> Self {
        *self.current.lock().unwrap() = Some(bitrate);
        self
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

fn server_error() -> TelemetryError {
    TelemetryError::Status(StatusCode::INTERNAL_SERVER_ERROR)
}

#[async_trait]
impl BitrateSource for FakeSource {
    async fn current(&self, username: &str) -> Result<CurrentBitrate> {
        self.current_calls.fetch_add(1, Ordering::SeqCst);
        match *self.current.lock().unwrap() {
            Some(bitrate) => Ok(CurrentBitrate {
                bitrate,
                stream_id: None,
                username: Some(username.to_string()),
            }),
            None => Err(server_error()),
        }
    }

    async fn history(&self, _username: &str, _minutes: u32) -> Result<Vec<Sample>> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        match self.history.lock().unwrap().pop_front() {
            Some(Reply::Samples(samples)) => Ok(samples),
            Some(Reply::Fail) => Err(server_error()),
            None => Ok(Vec::new()),
        }
    }
}

/// Samples one second apart with the given bitrates.
pub fn samples(bitrates: &[f64]) -> Vec<Sample> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    bitrates
        .iter()
        .enumerate()
        .map(|(i, &b)| Sample::new(start + chrono::Duration::seconds(i as i64), b))
        .collect()
}

pub fn steady(bitrate: f64, count: usize) -> Vec<Sample> {
    samples(&vec![bitrate; count])
}

/// A ws:// url nothing is listening on.
pub fn closed_ws_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{}", addr)
}

/// Fast timings; the poller effectively never fires unless a test asks for it.
pub fn test_config() -> TelemetryConfig {
    TelemetryConfig {
        ws_url: closed_ws_url(),
        poll_interval: Duration::from_secs(3600),
        reconnect_attempts: 0,
        reconnect_delay: Duration::from_millis(10),
        connect_timeout: Duration::from_secs(1),
        ..TelemetryConfig::default()
    }
}

/// Apply queued events until `done` holds or the deadline passes.
pub async fn pump_until<F>(controller: &mut TelemetryController, limit: Duration, done: F) -> bool
where
    F: Fn(&TelemetrySnapshot) -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if done(&controller.snapshot()) {
            return true;
        }
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return false;
        }
        if tokio::time::timeout(remaining, controller.step()).await.is_err() {
            return done(&controller.snapshot());
        }
    }
}
