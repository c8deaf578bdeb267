//! Connection status and the report type progress sources send upward.

use serde::Serialize;

use crate::errors::ProgressError;
use crate::stream::ProgressEvent;

/// Connection state shown to the consumer. Owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Waiting out a retry interval; a neutral indicator, not an error
    Reconnecting { attempt: u32, max_attempts: u32 },
    Failed,
    /// The task finished and the source shut down cleanly
    Closed,
}

impl ConnectionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Failed | ConnectionStatus::Closed)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "reconnecting ({}/{})", attempt, max_attempts),
            ConnectionStatus::Failed => write!(f, "failed"),
            ConnectionStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Which progress source the coordinator currently owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    None,
    Stream,
    Polling,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::None => write!(f, "none"),
            SourceKind::Stream => write!(f, "stream"),
            SourceKind::Polling => write!(f, "polling"),
        }
    }
}

/// What a source (supervised stream or poller) tells the coordinator.
///
/// Sources only ever write these; they never read coordinator state back.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceReport {
    Status(ConnectionStatus),
    Event(ProgressEvent),
    Failed(ProgressError),
}
