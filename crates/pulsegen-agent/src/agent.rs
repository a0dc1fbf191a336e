//! The agent instance.

use crate::config::AgentConfig;
use crate::document::{Document, DomError, ElementKind};
use chrono::Utc;
use pulsegen_core::{
    AGENT_SOURCE, AppliedTheme, Envelope, ErrorReport, Message, MessageKind, ProtocolError,
    StatusKind, StatusReport, THEME_APPLIED_EVENT, THEME_REMOVED_EVENT, THEME_SCRIPT_ID,
    THEME_STYLE_ID, THEMED_BODY_CLASS, Target, ThemePayload,
};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

/// Applies themes to one page and speaks the protocol with its embedder.
///
/// All state lives on the instance. The lifecycle is [`Agent::on_load`] when
/// the page loads and [`Agent::dispose`] when it unloads; a disposed agent
/// ignores further messages.
pub struct Agent<D> {
    config: AgentConfig,
    document: D,
    targets: Vec<Box<dyn Target>>,
    current: Option<AppliedTheme>,
    connected: bool,
    disposed: bool,
}

impl<D: Document> Agent<D> {
    pub fn new(config: AgentConfig, document: D, targets: Vec<Box<dyn Target>>) -> Self {
        Self {
            config,
            document,
            targets,
            current: None,
            connected: false,
            disposed: false,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn document(&self) -> &D {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut D {
        &mut self.document
    }

    /// The theme currently applied, if any.
    pub fn current_theme(&self) -> Option<&AppliedTheme> {
        self.current.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Announce the agent to its embedder.
    pub fn on_load(&mut self) {
        self.connected = true;
        self.disposed = false;
        let url = self.document.location();
        info!(%url, targets = self.targets.len(), "Agent loaded");
        let report = StatusReport::new(StatusKind::Ready)
            .with_url(url)
            .with_message("PulseGen agent ready");
        self.send_message(Message::StatusResponse(self.versioned(report)));
    }

    /// Send an unsolicited heartbeat.
    pub fn heartbeat(&self) {
        self.send_message(Message::heartbeat());
    }

    /// Leave the page un-themed and stop handling messages.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.clear_theme();
        self.connected = false;
        self.disposed = true;
        info!("Agent disposed");
    }

    /// Apply `payload`, replacing whatever theme was active.
    ///
    /// Returns whether the theme was applied. The outcome is also reported to
    /// the embedder.
    pub fn apply_theme(&mut self, payload: ThemePayload) -> bool {
        self.apply_theme_correlated(payload, None)
    }

    /// Remove the active theme. Safe to call with no theme applied.
    pub fn remove_theme(&mut self) {
        if self.clear_theme() {
            self.document.dispatch_event(THEME_REMOVED_EVENT, Value::Null);
            info!("Theme removed");
        }
    }

    /// Entry point for a `message` event from `origin`.
    ///
    /// Returns the kind of message acted on, or `None` if it was dropped or
    /// ignored. Messages from origins outside the allow-list get no reply.
    pub fn handle_message(&mut self, raw: &str, origin: &str) -> Option<MessageKind> {
        if self.disposed {
            return None;
        }
        if !self.config.allowed_origins.allows(origin) {
            debug!(%origin, "Dropping message from unknown origin");
            return None;
        }

        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(e) => {
                debug!(%origin, "Ignoring non-JSON message: {}", e);
                return None;
            }
        };
        let correlation_id = value
            .get("correlationId")
            .and_then(Value::as_str)
            .map(str::to_string);

        let data = value.get("data").cloned();

        let envelope = match Envelope::from_value(value) {
            Ok(envelope) => envelope,
            Err(ProtocolError::UnknownType(kind)) => {
                debug!(%kind, "Ignoring unknown message type");
                return None;
            }
            Err(ProtocolError::InvalidData {
                kind: MessageKind::ThemeUpdate,
                source,
            }) => {
                warn!("Rejecting malformed theme payload: {}", source);
                self.reply(
                    Message::Error(ErrorReport {
                        error: format!("invalid theme payload: {source}"),
                        theme: None,
                        rejected: data,
                    }),
                    correlation_id.as_deref(),
                );
                return Some(MessageKind::ThemeUpdate);
            }
            Err(e) => {
                debug!("Ignoring undecodable message: {}", e);
                return None;
            }
        };

        let kind = envelope.kind();
        let correlation = envelope.correlation_id.as_deref();
        match envelope.message {
            Message::ThemeUpdate(payload) => {
                self.apply_theme_correlated(payload, correlation);
            }
            Message::ThemeRemove => {
                self.remove_theme();
                let report = StatusReport::new(StatusKind::Success).with_message("Theme removed");
                self.reply(Message::StatusResponse(self.versioned(report)), correlation);
            }
            Message::StatusRequest => {
                let report = StatusReport::new(StatusKind::Success)
                    .with_theme(self.current.clone())
                    .with_url(self.document.location());
                self.reply(Message::StatusResponse(self.versioned(report)), correlation);
            }
            Message::Heartbeat(_) => {
                self.reply(Message::heartbeat(), correlation);
            }
            Message::StatusResponse(_) | Message::Error(_) => {
                debug!(%kind, "Ignoring agent-bound message kind");
                return None;
            }
        }
        Some(kind)
    }

    /// Broadcast `message` to every target. Returns how many accepted it.
    pub fn send_message(&self, message: Message) -> usize {
        self.broadcast(&Envelope::new(message, AGENT_SOURCE))
    }

    fn reply(&self, message: Message, correlation: Option<&str>) -> usize {
        let envelope =
            Envelope::new(message, AGENT_SOURCE).with_correlation(correlation.map(str::to_string));
        self.broadcast(&envelope)
    }

    fn broadcast(&self, envelope: &Envelope) -> usize {
        let text = match envelope.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(kind = %envelope.kind(), "Failed to encode envelope: {}", e);
                return 0;
            }
        };
        if self.targets.is_empty() {
            debug!(kind = %envelope.kind(), "No embedder window to report to");
        }
        let mut delivered = 0;
        for target in &self.targets {
            match target.post(&text) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(window = target.label(), "Failed to post message: {}", e),
            }
        }
        delivered
    }

    fn versioned(&self, report: StatusReport) -> StatusReport {
        StatusReport {
            version: self.config.version.clone(),
            ..report
        }
    }

    fn apply_theme_correlated(&mut self, payload: ThemePayload, correlation: Option<&str>) -> bool {
        self.clear_theme();

        if let Err(e) = self.inject(&payload) {
            // Anything the failed attempt inserted goes too.
            self.clear_theme();
            warn!(theme = %payload.name, "Failed to apply theme: {}", e);
            self.reply(
                Message::Error(ErrorReport {
                    error: e.to_string(),
                    theme: Some(payload),
                    rejected: None,
                }),
                correlation,
            );
            return false;
        }

        let applied = AppliedTheme::from_payload(&payload, Utc::now(), &self.config.version);
        self.document.add_body_class(THEMED_BODY_CLASS);
        self.document.dispatch_event(
            THEME_APPLIED_EVENT,
            json!({ "name": payload.name, "theme": applied }),
        );
        self.current = Some(applied.clone());
        info!(theme = %payload.name, "Theme applied");

        let report = StatusReport::new(StatusKind::Success)
            .with_theme(Some(applied))
            .with_message(format!("Theme '{}' applied", payload.name));
        self.reply(Message::StatusResponse(self.versioned(report)), correlation);
        true
    }

    fn inject(&mut self, payload: &ThemePayload) -> Result<(), DomError> {
        if !payload.css.is_empty() {
            self.document
                .upsert_head_element(THEME_STYLE_ID, ElementKind::Style, &payload.css)?;
        }
        if !payload.js.is_empty() {
            self.document
                .upsert_head_element(THEME_SCRIPT_ID, ElementKind::Script, &payload.js)?;
        }
        Ok(())
    }

    /// Strip theme nodes and state. Returns whether a theme was active.
    fn clear_theme(&mut self) -> bool {
        let had_style = self.document.remove_element(THEME_STYLE_ID);
        let had_script = self.document.remove_element(THEME_SCRIPT_ID);
        self.document.remove_body_class(THEMED_BODY_CLASS);
        let had_state = self.current.take().is_some();
        had_style || had_script || had_state
    }
}
