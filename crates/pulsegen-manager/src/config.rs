//! Manager configuration.

use pulsegen_core::MANAGER_SOURCE;
use std::time::Duration;

/// How long a connection may stay silent before it is marked disconnected.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub heartbeat_timeout: Duration,
    /// `source` stamped on outgoing envelopes.
    pub source: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            source: MANAGER_SOURCE.to_string(),
        }
    }
}
