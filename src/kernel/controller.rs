use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::connection::ConnectionRequest;
use super::event::{Epoch, Event, HistoryOutcome, SequenceId, Sequencer, SessionContext, SessionId};
use super::state::{SessionState, StateDelta, TelemetrySnapshot};
use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::services::bitrate::channel::ReconnectPolicy;
use crate::services::bitrate::{BitrateClient, BitrateSource, ConnectionManager, HistoryLoader, PollingScheduler};

const EVENT_QUEUE: usize = 256;
const COMMAND_QUEUE: usize = 16;

/// Requests from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Monitor `username`, tearing down any current subscription first.
    Start(String),
    /// Stream went offline, target changed, or monitoring was hidden.
    Stop,
    Shutdown,
}

/// Cloneable front end for a controller running under `run`.
#[derive(Clone)]
pub struct TelemetryHandle {
    commands: mpsc::Sender<Command>,
    snapshots: watch::Receiver<TelemetrySnapshot>,
}

impl TelemetryHandle {
    pub async fn start(&self, username: impl Into<String>) -> bool {
        self.commands.send(Command::Start(username.into())).await.is_ok()
    }

    pub async fn stop(&self) -> bool {
        self.commands.send(Command::Stop).await.is_ok()
    }

    pub async fn shutdown(&self) -> bool {
        self.commands.send(Command::Shutdown).await.is_ok()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        *self.snapshots.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshots.clone()
    }
}

struct ActiveSession {
    id: SessionId,
    username: String,
    // Sequence of the last write that touched the sample window
    last_write: SequenceId,
}

/// Single writer for one subscription's telemetry.
///
/// History seed, push appends and poll refreshes all arrive as `Event`s on
/// one queue and are applied here in order. Results from an ended session,
/// or buffer writes older than the last applied one, are discarded.
pub struct TelemetryController {
    receiver: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    state: SessionState,
    config: TelemetryConfig,
    history: HistoryLoader,
    poller: PollingScheduler,
    channel: ConnectionManager,
    sequencer: Sequencer,
    generation: u64,
    active: Option<ActiveSession>,
    snapshots: watch::Sender<TelemetrySnapshot>,
}

impl TelemetryController {
    pub fn new(config: TelemetryConfig, source: Arc<dyn BitrateSource>) -> Self {
        let (tx, receiver) = mpsc::channel(EVENT_QUEUE);
        let state = SessionState::new(&config);
        let (snapshots, _) = watch::channel(state.snapshot());

        Self {
            receiver,
            tx,
            state,
            history: HistoryLoader::new(source.clone()),
            poller: PollingScheduler::new(source, config.poll_interval, config.history_minutes),
            channel: ConnectionManager::new(config.ws_url.clone(), ReconnectPolicy::from(&config)),
            config,
            sequencer: Sequencer::new(),
            generation: 0,
            active: None,
            snapshots,
        }
    }

    /// Controller backed by the REST API at `config.api_url`.
    pub fn with_client(config: TelemetryConfig) -> Result<Self> {
        let client = BitrateClient::new(&config)?;
        Ok(Self::new(config, Arc::new(client)))
    }

    /// Move the controller onto its own task and return a handle to drive it.
    pub fn spawn(self) -> (TelemetryHandle, JoinHandle<()>) {
        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE);
        let handle = TelemetryHandle {
            commands,
            snapshots: self.subscribe(),
        };
        let mut controller = self;
        let task = tokio::spawn(async move { controller.run(receiver).await });
        (handle, task)
    }

    pub fn start(&mut self, username: impl Into<String>) {
        let username = username.into();
        self.stop();

        self.generation += 1;
        let id = SessionId(self.generation);
        self.state.reduce(StateDelta::Reset);
        self.state.reduce(StateDelta::LoadingStarted);

        info!("Starting telemetry session {} for {}", id.0, username);
        let ctx = SessionContext::new(id, self.sequencer.clone(), self.tx.clone());
        self.history.load(&ctx, &username, self.config.history_minutes);
        self.channel.connect(&ctx, &username);
        self.poller.start(&ctx, &username);

        self.active = Some(ActiveSession {
            id,
            username,
            last_write: 0,
        });
        self.publish();
    }

    /// Idempotent. Timer and channel teardown are requested before this returns.
    pub fn stop(&mut self) {
        let Some(session) = self.active.take() else {
            return;
        };

        self.poller.stop();
        self.channel.disconnect();
        self.history.cancel();
        self.state.reduce(StateDelta::Connection(ConnectionRequest::TornDown));
        self.state.reduce(StateDelta::Reset);

        info!("Stopped telemetry session {} for {}", session.id.0, session.username);
        self.publish();
    }

    pub fn apply(&mut self, event: Event) {
        let epoch = event.epoch();
        let Some(session) = self.active.as_mut() else {
            debug!("No active session, dropping {:?}", epoch);
            return;
        };
        if epoch.session != session.id {
            debug!("Dropping result from ended session {} (active {})", epoch.session.0, session.id.0);
            return;
        }

        match event {
            Event::Connection { request, .. } => self.state.reduce(StateDelta::Connection(request)),
            Event::Push { epoch, sample } => {
                if admit(session, epoch) {
                    self.state.reduce(StateDelta::SampleAppended(sample));
                }
            }
            Event::Poll { epoch, samples } => {
                if admit(session, epoch) {
                    self.state.reduce(StateDelta::WindowReplaced(samples));
                }
            }
            Event::History { epoch, outcome } => {
                match outcome {
                    HistoryOutcome::Seeded(samples) => {
                        if admit(session, epoch) {
                            self.state.reduce(StateDelta::WindowReplaced(samples));
                        }
                    }
                    HistoryOutcome::Current(sample) => {
                        if admit(session, epoch) {
                            self.state.reduce(StateDelta::WindowReplaced(vec![sample]));
                        }
                    }
                    HistoryOutcome::NoData | HistoryOutcome::Failed => {}
                }
                self.state.reduce(StateDelta::LoadingFinished);
            }
        }

        self.publish();
    }

    /// Apply everything already queued without waiting. Returns how many events were applied.
    pub fn drain(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.receiver.try_recv() {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next event and apply it.
    pub async fn step(&mut self) {
        if let Some(event) = self.receiver.recv().await {
            self.apply(event);
        }
    }

    /// Async driver loop. Returns on `Shutdown` or when every handle is gone.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<Command>) {
        info!("Telemetry controller running");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Start(username)) => self.start(username),
                    Some(Command::Stop) => self.stop(),
                    Some(Command::Shutdown) | None => {
                        self.stop();
                        break;
                    }
                },
                Some(event) = self.receiver.recv() => self.apply(event),
            }
        }
        info!("Telemetry controller stopped");
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.state.snapshot()
    }

    /// Read-only view for callers that need more than the snapshot.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshots.subscribe()
    }

    pub fn session(&self) -> Option<SessionId> {
        self.active.as_ref().map(|s| s.id)
    }

    pub fn username(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.username.as_str())
    }

    /// Epoch for work issued now under the active session.
    pub fn epoch(&self) -> Option<Epoch> {
        self.active.as_ref().map(|s| Epoch {
            session: s.id,
            seq: self.sequencer.next(),
        })
    }

    fn publish(&self) {
        let snapshot = self.state.snapshot();
        self.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}

/// Freshest write wins: a buffer write that began before the last applied
/// one is stale, whichever finished later.
fn admit(session: &mut ActiveSession, epoch: Epoch) -> bool {
    if epoch.seq <= session.last_write {
        debug!("Discarding stale write seq {} (last applied {})", epoch.seq, session.last_write);
        return false;
    }
    session.last_write = epoch.seq;
    true
}
