//! Core types for the PulseGen theme channel.
//!
//! This crate provides the protocol primitives shared by the in-page agent and
//! the application-side manager: theme payloads, the message envelope, the
//! origin allow-list, connection records and the [`Target`] seam envelopes
//! are posted through.

mod connection;
mod message;
mod origin;
mod theme;
mod transport;

pub use connection::{Connection, ConnectionStatus};
pub use message::{
    Envelope, ErrorReport, Heartbeat, Message, MessageKind, ProtocolError, StatusKind,
    StatusReport,
};
pub use origin::{Origin, OriginAllowList, OriginParseError};
pub use theme::{AppliedTheme, ThemePayload};
pub use transport::{ChannelTarget, Target, TransportError};

/// Protocol version stamped on every envelope.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// `source` of agent-originated envelopes.
pub const AGENT_SOURCE: &str = "ghl-injection";

/// `source` of manager-originated envelopes.
pub const MANAGER_SOURCE: &str = "pulsegen-manager";

/// Id of the `<style>` element holding the active theme's CSS.
pub const THEME_STYLE_ID: &str = "pulsegen-theme";

/// Id of the `<script>` element holding the active theme's JS.
pub const THEME_SCRIPT_ID: &str = "pulsegen-script";

/// Marker class on `<body>` while a theme is active.
pub const THEMED_BODY_CLASS: &str = "pulsegen-themed";

/// In-page event fired after a theme has been applied.
pub const THEME_APPLIED_EVENT: &str = "pulsegen:theme-applied";

/// In-page event fired after a theme has been removed.
pub const THEME_REMOVED_EVENT: &str = "pulsegen:theme-removed";
