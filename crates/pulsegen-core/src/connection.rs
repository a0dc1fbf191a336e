//! Manager-side records of embedded targets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness of an embedded target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Heard from within the heartbeat window.
    Connected,
    /// Timed out or explicitly disconnected.
    Disconnected,
}

/// A logical handle to one embedded target window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Opaque id assigned by the manager.
    pub id: String,
    /// Origin or location of the target.
    pub url: String,
    pub status: ConnectionStatus,
    /// Last heartbeat or status response, if any.
    pub last_seen: Option<DateTime<Utc>>,
}

impl Connection {
    /// A freshly registered, connected target that has not spoken yet.
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            status: ConnectionStatus::Connected,
            last_seen: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }
}
