//! Agent configuration.

use pulsegen_core::{OriginAllowList, PROTOCOL_VERSION};
use std::time::Duration;

/// Default interval between unsolicited heartbeats.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Embedders allowed to send commands.
    pub allowed_origins: OriginAllowList,
    pub heartbeat_interval: Duration,
    /// Version reported in status replies and applied-theme state.
    pub version: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            allowed_origins: OriginAllowList::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            version: PROTOCOL_VERSION.to_string(),
        }
    }
}
