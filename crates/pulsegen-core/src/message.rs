//! Protocol messages.
//!
//! Every exchange is an [`Envelope`] carrying one [`Message`]. On the wire the
//! message is split into a `type` string and a `data` object; decoding checks
//! the type against the closed set before the data is interpreted, so an
//! unknown type and a malformed payload are different errors.

use crate::{AppliedTheme, PROTOCOL_VERSION, ThemePayload};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// The closed set of message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    ThemeUpdate,
    ThemeRemove,
    StatusRequest,
    StatusResponse,
    Heartbeat,
    Error,
}

impl MessageKind {
    pub const ALL: [MessageKind; 6] = [
        MessageKind::ThemeUpdate,
        MessageKind::ThemeRemove,
        MessageKind::StatusRequest,
        MessageKind::StatusResponse,
        MessageKind::Heartbeat,
        MessageKind::Error,
    ];

    /// Wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::ThemeUpdate => "PG_THEME_UPDATE",
            MessageKind::ThemeRemove => "PG_THEME_REMOVE",
            MessageKind::StatusRequest => "PG_STATUS_REQUEST",
            MessageKind::StatusResponse => "PG_STATUS_RESPONSE",
            MessageKind::Heartbeat => "PG_HEARTBEAT",
            MessageKind::Error => "PG_ERROR",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownType(s.to_string()))
    }
}

/// Outcome reported in a status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    /// Agent finished loading.
    Ready,
    /// Last command succeeded, or a plain status reply.
    Success,
    Error,
}

/// Data of `PG_STATUS_RESPONSE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: StatusKind,
    /// Currently applied theme, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<AppliedTheme>,
    #[serde(default)]
    pub version: String,
    /// Page URL of the agent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusReport {
    pub fn new(status: StatusKind) -> Self {
        Self {
            status,
            theme: None,
            version: PROTOCOL_VERSION.to_string(),
            url: None,
            message: None,
        }
    }

    pub fn with_theme(mut self, theme: Option<AppliedTheme>) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Data of `PG_HEARTBEAT`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Heartbeat {
    pub status: String,
    /// When the peer sent it, if it said so in a form we read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Heartbeat {
    pub const ALIVE: &'static str = "alive";

    pub fn alive() -> Self {
        Self {
            status: Self::ALIVE.to_string(),
            timestamp: Some(Utc::now()),
        }
    }

    /// Read heartbeat `data` of any shape.
    ///
    /// A missing status counts as alive. `timestamp` may be RFC 3339 text or
    /// epoch milliseconds; anything else is dropped.
    pub fn from_data(data: &Value) -> Self {
        let status = data
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or(Self::ALIVE)
            .to_string();
        let timestamp = match data.get("timestamp") {
            Some(Value::String(text)) => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            Some(Value::Number(millis)) => {
                millis.as_i64().and_then(DateTime::from_timestamp_millis)
            }
            _ => None,
        };
        Self { status, timestamp }
    }

    pub fn is_alive(&self) -> bool {
        self.status == Self::ALIVE
    }
}

/// Data of `PG_ERROR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: String,
    /// The payload that failed to apply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<ThemePayload>,
    /// Raw `data` of a command that could not be decoded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejected: Option<Value>,
}

/// A message, keyed by its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Apply a new theme.
    ThemeUpdate(ThemePayload),
    /// Remove the current theme.
    ThemeRemove,
    /// Poll current state.
    StatusRequest,
    /// Report outcome or state.
    StatusResponse(StatusReport),
    /// Liveness signal.
    Heartbeat(Heartbeat),
    /// Report a failure.
    Error(ErrorReport),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ThemeUpdate(_) => MessageKind::ThemeUpdate,
            Message::ThemeRemove => MessageKind::ThemeRemove,
            Message::StatusRequest => MessageKind::StatusRequest,
            Message::StatusResponse(_) => MessageKind::StatusResponse,
            Message::Heartbeat(_) => MessageKind::Heartbeat,
            Message::Error(_) => MessageKind::Error,
        }
    }

    pub fn heartbeat() -> Self {
        Message::Heartbeat(Heartbeat::alive())
    }

    /// Interpret `data` as the payload of `kind`.
    ///
    /// Commands without a payload, and heartbeats, accept any `data`,
    /// including none.
    pub fn decode(kind: MessageKind, data: Value) -> Result<Self, ProtocolError> {
        let invalid = |source| ProtocolError::InvalidData { kind, source };
        let message = match kind {
            MessageKind::ThemeUpdate => {
                Message::ThemeUpdate(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::ThemeRemove => Message::ThemeRemove,
            MessageKind::StatusRequest => Message::StatusRequest,
            MessageKind::StatusResponse => {
                Message::StatusResponse(serde_json::from_value(data).map_err(invalid)?)
            }
            MessageKind::Heartbeat => Message::Heartbeat(Heartbeat::from_data(&data)),
            MessageKind::Error => Message::Error(serde_json::from_value(data).map_err(invalid)?),
        };
        Ok(message)
    }

    /// The `data` object for the wire.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        match self {
            Message::ThemeUpdate(payload) => serde_json::to_value(payload),
            Message::ThemeRemove | Message::StatusRequest => Ok(Value::Object(Default::default())),
            Message::StatusResponse(report) => serde_json::to_value(report),
            Message::Heartbeat(heartbeat) => serde_json::to_value(heartbeat),
            Message::Error(report) => serde_json::to_value(report),
        }
    }
}

/// The structure every exchange travels in.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct Envelope {
    pub message: Message,
    /// Sender role.
    pub source: String,
    pub timestamp: DateTime<Utc>,
    /// Protocol version of the sender.
    pub version: String,
    /// Links replies to the command that caused them.
    pub correlation_id: Option<String>,
}

impl Envelope {
    /// Wrap `message`, stamped now with the current protocol version.
    pub fn new(message: Message, source: impl Into<String>) -> Self {
        Self {
            message,
            source: source.into(),
            timestamp: Utc::now(),
            version: PROTOCOL_VERSION.to_string(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: Option<String>) -> Self {
        self.correlation_id = correlation_id;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    /// Decode an envelope from its JSON text.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope = serde_json::from_str(text).map_err(ProtocolError::Malformed)?;
        wire.try_into()
    }

    /// Decode an envelope from an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        let wire: WireEnvelope = serde_json::from_value(value).map_err(ProtocolError::Malformed)?;
        wire.try_into()
    }

    /// Encode to JSON text.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let data = self.message.data().map_err(serde::ser::Error::custom)?;
        WireEnvelope {
            kind: self.kind().as_str().to_string(),
            source: self.source.clone(),
            data,
            timestamp: Some(self.timestamp),
            version: self.version.clone(),
            correlation_id: self.correlation_id.clone(),
        }
        .serialize(serializer)
    }
}

/// Envelope as it appears on the wire, before the type is checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let kind: MessageKind = wire.kind.parse()?;
        let message = Message::decode(kind, wire.data)?;
        Ok(Self {
            message,
            source: wire.source,
            timestamp: wire.timestamp.unwrap_or_else(Utc::now),
            version: wire.version,
            correlation_id: wire.correlation_id,
        })
    }
}

/// Error decoding or encoding an envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownType(String),
    #[error("invalid {kind} data: {source}")]
    InvalidData {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}
