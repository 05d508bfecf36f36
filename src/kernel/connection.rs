use std::fmt;

use serde::{Deserialize, Serialize};

/// Push channel lifecycle as seen by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(label)
    }
}

/// What the channel task reports. These are requests; the graph decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionRequest {
    /// An attempt (first or retry) is starting.
    ConnectRequested,
    /// The socket is open.
    Opened,
    /// Error, close frame or connect timeout.
    Lost,
    /// Local teardown.
    TornDown,
}

pub struct ConnectionGraph;

impl ConnectionGraph {
    /// Pure function: (Current State, Request) -> New State.
    /// Returns None if the transition is invalid/ignored.
    pub fn transition(current: ConnectionState, request: ConnectionRequest) -> Option<ConnectionState> {
        use ConnectionRequest::*;
        use ConnectionState::*;

        match (current, request) {
            (Disconnected, ConnectRequested) => Some(Connecting),

            (Connecting, Opened) => Some(Connected),
            (Connecting, Lost) => Some(Disconnected),
            (Connecting, TornDown) => Some(Disconnected),

            (Connected, Lost) => Some(Disconnected),
            (Connected, TornDown) => Some(Disconnected),

            _ => None,
        }
    }
}
