//! Application-side manager for the PulseGen theme channel.
//!
//! The manager keeps a registry of embedded connections, posts theme commands
//! to them and turns the envelopes they send back into [`ManagerEvent`]s.
//! Transport is fire-and-forget, so a command's immediate result only says
//! whether it was handed to the target; the agent's answer arrives later as an
//! event carrying the same correlation id.

mod config;
mod event;
mod manager;

pub use config::{DEFAULT_HEARTBEAT_TIMEOUT, ManagerConfig};
pub use event::{Dispatch, DispatchError, DispatchResult, ManagerEvent};
pub use manager::{CommunicationManager, run_liveness_monitor};
