use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::connection::ConnectionRequest;
use super::sample::Sample;

/// Generation counter for subscriptions. A new start always gets a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

pub type SequenceId = u64;

/// Tag carried by every asynchronous result: the session it was issued
/// under and a sequence number taken when the work began.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Epoch {
    pub session: SessionId,
    pub seq: SequenceId,
}

/// Monotonic sequence shared by every writer of one controller.
#[derive(Debug, Clone, Default)]
pub struct Sequencer(Arc<AtomicU64>);

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> SequenceId {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone)]
pub enum HistoryOutcome {
    /// Bulk history was non-empty.
    Seeded(Vec<Sample>),
    /// History was empty; one synthetic sample from the current value.
    Current(Sample),
    /// Both fetches succeeded but neither had data.
    NoData,
    Failed,
}

#[derive(Debug, Clone)]
pub enum Event {
    History { epoch: Epoch, outcome: HistoryOutcome },
    Poll { epoch: Epoch, samples: Vec<Sample> },
    Push { epoch: Epoch, sample: Sample },
    Connection { epoch: Epoch, request: ConnectionRequest },
}

impl Event {
    pub fn epoch(&self) -> Epoch {
        match self {
            Event::History { epoch, .. }
            | Event::Poll { epoch, .. }
            | Event::Push { epoch, .. }
            | Event::Connection { epoch, .. } => *epoch,
        }
    }
}

/// Handed to every task spawned for a session so its results can be
/// tagged and routed back to the controller.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session: SessionId,
    sequencer: Sequencer,
    tx: mpsc::Sender<Event>,
}

impl SessionContext {
    pub fn new(session: SessionId, sequencer: Sequencer, tx: mpsc::Sender<Event>) -> Self {
        Self { session, sequencer, tx }
    }

    pub fn epoch(&self) -> Epoch {
        Epoch {
            session: self.session,
            seq: self.sequencer.next(),
        }
    }

    pub async fn emit(&self, event: Event) {
        if self.tx.send(event).await.is_err() {
            debug!("Controller gone, dropping event for session {}", self.session.0);
        }
    }
}
