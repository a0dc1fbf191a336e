//! What the manager reports to its callers.

use chrono::{DateTime, Utc};
use pulsegen_core::{ErrorReport, StatusReport, TransportError};
use serde::Serialize;

/// Something an embedded agent said, or a change in its liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ManagerEvent {
    /// A status response (ready, success, or a status poll reply).
    Status {
        connection_id: String,
        correlation_id: Option<String>,
        report: StatusReport,
    },
    /// The agent failed to carry out a command.
    Error {
        connection_id: String,
        correlation_id: Option<String>,
        report: ErrorReport,
    },
    Heartbeat {
        connection_id: String,
        at: DateTime<Utc>,
    },
    /// Timed out or explicitly disconnected.
    Disconnected { connection_id: String },
}

impl ManagerEvent {
    pub fn connection_id(&self) -> &str {
        match self {
            ManagerEvent::Status { connection_id, .. }
            | ManagerEvent::Error { connection_id, .. }
            | ManagerEvent::Heartbeat { connection_id, .. }
            | ManagerEvent::Disconnected { connection_id } => connection_id,
        }
    }
}

/// A command handed to a connection's target.
///
/// Delivery is fire-and-forget; the agent's answer arrives later as a
/// [`ManagerEvent`] carrying the same correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dispatch {
    pub connection_id: String,
    pub correlation_id: String,
}

/// Why a command was not dispatched.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("unknown connection: {0}")]
    UnknownConnection(String),
    #[error("connection {0} is disconnected")]
    Disconnected(String),
    #[error("failed to encode command: {0}")]
    Encode(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub type DispatchResult = Result<Dispatch, DispatchError>;
