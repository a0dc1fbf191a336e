//! In-page agent for the PulseGen theme channel.
//!
//! The agent runs inside an embedded dashboard page. It applies theme payloads
//! sent by its embedder, answers status and heartbeat requests, and reports
//! back to every window it was given at construction.
//!
//! The page itself is reached through the [`Document`] trait and the embedder
//! windows through [`Target`], so the agent logic runs the same against a real
//! DOM or the in-memory [`MemoryDocument`].

mod agent;
mod config;
mod document;
mod driver;

pub use agent::Agent;
pub use config::{AgentConfig, DEFAULT_HEARTBEAT_INTERVAL};
pub use document::{Document, DomError, ElementKind, MemoryDocument, MemoryElement};
pub use driver::{AgentHandle, DriverError, spawn};
pub use pulsegen_core::{ChannelTarget, Target, TransportError};
