use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::client::BitrateSource;
use crate::kernel::event::{Event, HistoryOutcome, SessionContext};

/// One-shot seed of the sample window when a subscription starts.
pub struct HistoryLoader {
    source: Arc<dyn BitrateSource>,
    task: Option<JoinHandle<()>>,
}

impl HistoryLoader {
    pub fn new(source: Arc<dyn BitrateSource>) -> Self {
        Self { source, task: None }
    }

    /// Spawn the seed fetch. The result comes back as `Event::History`
    /// tagged with the epoch taken before the first request went out.
    pub fn load(&mut self, ctx: &SessionContext, username: &str, minutes: u32) {
        self.cancel();

        let source = self.source.clone();
        let ctx = ctx.clone();
        let username = username.to_string();

        self.task = Some(tokio::spawn(async move {
            let epoch = ctx.epoch();
            let outcome = fetch_seed(source.as_ref(), &username, minutes).await;
            ctx.emit(Event::History { epoch, outcome }).await;
        }));
    }

    /// Abort an in-flight load. Its result would be discarded anyway once
    /// the session changes; this just stops the network work early.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for HistoryLoader {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// History first; if it is empty, fall back to a single current-value
/// sample stamped at fetch time. Failures are logged, never returned.
pub async fn fetch_seed(source: &dyn BitrateSource, username: &str, minutes: u32) -> HistoryOutcome {
    match source.history(username, minutes).await {
        Ok(samples) if !samples.is_empty() => {
            info!("Seeded {} samples of history for {}", samples.len(), username);
            HistoryOutcome::Seeded(samples)
        }
        Ok(_) => match source.current(username).await {
            Ok(current) => match current.into_sample(Utc::now()) {
                Some(sample) => {
                    info!("No history for {}, seeding from current value {}", username, sample.bitrate());
                    HistoryOutcome::Current(sample)
                }
                None => HistoryOutcome::NoData,
            },
            Err(e) => {
                warn!("Current bitrate fetch failed for {}: {}", username, e);
                HistoryOutcome::Failed
            }
        },
        Err(e) => {
            warn!("History fetch failed for {}: {}", username, e);
            HistoryOutcome::Failed
        }
    }
}
