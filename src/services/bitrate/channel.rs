//! Push channel over WebSocket.
//!
//! One task per subscription owns the socket. It reports lifecycle changes
//! as `ConnectionRequest`s and each `bitrate_update` as one `Event::Push`;
//! transport failures never leave this module as errors.

use std::time::Duration;

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::{Result, TelemetryError};
use crate::kernel::connection::ConnectionRequest;
use crate::kernel::event::{Event, SessionContext};
use crate::kernel::sample::SampleRecord;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundMessage {
    SubscribeBitrate { username: String },
    UnsubscribeBitrate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    BitrateUpdate(SampleRecord),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Automatic retries after the first attempt. Only a connection that
    /// delivered at least one update earns a fresh set.
    pub attempts: u32,
    pub delay: Duration,
    pub connect_timeout: Duration,
}

impl From<&TelemetryConfig> for ReconnectPolicy {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            attempts: config.reconnect_attempts,
            delay: config.reconnect_delay,
            connect_timeout: config.connect_timeout,
        }
    }
}

enum ChannelExit {
    TornDown,
    Closed,
}

struct ChannelHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    url: String,
    policy: ReconnectPolicy,
    handle: Option<ChannelHandle>,
}

impl ConnectionManager {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
            handle: None,
        }
    }

    /// Open the channel for `username`, replacing any previous one.
    pub fn connect(&mut self, ctx: &SessionContext, username: &str) {
        self.disconnect();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_channel(
            self.url.clone(),
            username.to_string(),
            self.policy,
            ctx.clone(),
            cancel.clone(),
        ));
        self.handle = Some(ChannelHandle { cancel, task });
    }

    /// Idempotent. The task unsubscribes if it is connected, then closes
    /// the socket; the caller forces its own state to `Disconnected`.
    pub fn disconnect(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel.cancel();
        }
    }

    /// True while a channel task is alive, including between retries.
    pub fn is_active(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.task.is_finished())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn run_channel(
    url: String,
    username: String,
    policy: ReconnectPolicy,
    ctx: SessionContext,
    cancel: CancellationToken,
) {
    let mut retries = 0;

    loop {
        let mut delivered = 0;

        report(&ctx, ConnectionRequest::ConnectRequested).await;

        let attempt = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            attempt = open(&url, policy.connect_timeout) => attempt,
        };

        match attempt {
            Ok(socket) => {
                info!("Push channel open for {}", username);
                report(&ctx, ConnectionRequest::Opened).await;

                match pump(socket, &username, &ctx, &cancel, &mut delivered).await {
                    Ok(ChannelExit::TornDown) => {
                        debug!("Push channel for {} torn down", username);
                        return;
                    }
                    Ok(ChannelExit::Closed) => info!("Push channel for {} closed by server", username),
                    Err(e) => warn!("Push channel for {} failed: {}", username, e),
                }
            }
            Err(e) => warn!("Push channel connect for {} failed: {}", username, e),
        }

        report(&ctx, ConnectionRequest::Lost).await;

        if delivered > 0 {
            retries = 0;
        }
        if retries >= policy.attempts {
            warn!("Giving up on push channel for {} after {} retries", username, retries);
            return;
        }
        retries += 1;

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(policy.delay) => {}
        }
    }
}

async fn report(ctx: &SessionContext, request: ConnectionRequest) {
    ctx.emit(Event::Connection {
        epoch: ctx.epoch(),
        request,
    })
    .await;
}

async fn open(url: &str, timeout: Duration) -> Result<Socket> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((socket, _response))) => Ok(socket),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TelemetryError::ConnectTimeout(timeout)),
    }
}

fn encode(message: &OutboundMessage) -> Result<Message> {
    Ok(Message::Text(serde_json::to_string(message)?))
}

/// Subscribe, then forward updates until teardown, server close or error.
/// `delivered` counts the updates forwarded on this socket.
async fn pump(
    socket: Socket,
    username: &str,
    ctx: &SessionContext,
    cancel: &CancellationToken,
    delivered: &mut usize,
) -> Result<ChannelExit> {
    let (mut write, mut read) = socket.split();

    write
        .send(encode(&OutboundMessage::SubscribeBitrate {
            username: username.to_string(),
        })?)
        .await?;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(encode(&OutboundMessage::UnsubscribeBitrate)?).await {
                    debug!("Unsubscribe for {} not delivered: {}", username, e);
                }
                let _ = write.close().await;
                return Ok(ChannelExit::TornDown);
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if forward(&text, ctx).await {
                        *delivered += 1;
                    }
                }
                Some(Ok(Message::Close(_))) | None => return Ok(ChannelExit::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }
}

/// Returns true when the frame became a `Push`.
async fn forward(text: &str, ctx: &SessionContext) -> bool {
    let received_at = Utc::now();
    match serde_json::from_str::<InboundMessage>(text) {
        Ok(InboundMessage::BitrateUpdate(record)) => match record.into_sample(received_at) {
            Some(sample) => {
                ctx.emit(Event::Push {
                    epoch: ctx.epoch(),
                    sample,
                })
                .await;
                true
            }
            None => {
                warn!("Dropping bitrate_update without a bitrate");
                false
            }
        },
        Err(_) => {
            debug!("Ignoring frame: {}", text);
            false
        }
    }
}
