//! PulseGen bridge daemon.
//!
//! Hosts a [`pulsegen_manager::CommunicationManager`] behind a WebSocket
//! listener so embedded pages can connect, report status and receive themes.

pub mod config;
pub mod server;

pub use config::{DaemonConfig, ThemeConfig};
