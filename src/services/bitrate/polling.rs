use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::client::BitrateSource;
use crate::kernel::event::{Event, SessionContext};

/// Fixed-interval REST refresh, independent of the push channel.
/// Every successful fetch replaces the window wholesale.
pub struct PollingScheduler {
    source: Arc<dyn BitrateSource>,
    period: Duration,
    minutes: u32,
    cancel: Option<CancellationToken>,
}

impl PollingScheduler {
    pub fn new(source: Arc<dyn BitrateSource>, period: Duration, minutes: u32) -> Self {
        Self {
            source,
            period,
            minutes,
            cancel: None,
        }
    }

    /// First tick fires one period after start; the history load covers t=0.
    pub fn start(&mut self, ctx: &SessionContext, username: &str) {
        self.stop();

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let source = self.source.clone();
        let ctx = ctx.clone();
        let username = username.to_string();
        let period = self.period;
        let minutes = self.minutes;

        tokio::spawn(async move {
            let mut cadence = interval_at(Instant::now() + period, period);
            cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = cadence.tick() => {}
                }

                let epoch = ctx.epoch();
                let result = tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    result = source.history(&username, minutes) => result,
                };

                match result {
                    Ok(samples) => {
                        debug!("Poll for {} returned {} samples", username, samples.len());
                        ctx.emit(Event::Poll { epoch, samples }).await;
                    }
                    // Next tick will try again
                    Err(e) => warn!("Poll for {} failed: {}", username, e),
                }
            }
            debug!("Poller for {} stopped", username);
        });

        self.cancel = Some(token);
    }

    /// Cancels the timer synchronously; an in-flight fetch is dropped.
    pub fn stop(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
