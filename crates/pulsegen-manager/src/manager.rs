//! The communication manager.

use crate::config::ManagerConfig;
use crate::event::{Dispatch, DispatchError, DispatchResult, ManagerEvent};
use chrono::{DateTime, TimeDelta, Utc};
use pulsegen_core::{
    Connection, ConnectionStatus, Envelope, Message, ProtocolError, Target, ThemePayload,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A registered embed target.
struct Entry {
    connection: Connection,
    registered_at: DateTime<Utc>,
    target: Box<dyn Target>,
}

impl Entry {
    /// Last time the target was heard from, or registration time.
    fn last_activity(&self) -> DateTime<Utc> {
        self.connection.last_seen.unwrap_or(self.registered_at)
    }
}

/// Tracks embedded connections and sends them theme commands.
///
/// Sends never fail loudly: every command returns a [`DispatchResult`], and
/// what the agent later says about it is published as a [`ManagerEvent`].
pub struct CommunicationManager {
    config: ManagerConfig,
    connections: RwLock<HashMap<String, Entry>>,
    events: broadcast::Sender<ManagerEvent>,
}

impl Default for CommunicationManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl CommunicationManager {
    pub fn new(config: ManagerConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            connections: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Listen for agent reports and liveness changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Register an embed target at `url`. Returns the new connection id.
    pub async fn register(&self, url: impl Into<String>, target: Box<dyn Target>) -> String {
        let id = Uuid::new_v4().to_string();
        let connection = Connection::new(id.clone(), url);
        info!(connection_id = %id, url = %connection.url, "Connection registered");
        self.connections.write().await.insert(
            id.clone(),
            Entry {
                connection,
                registered_at: Utc::now(),
                target,
            },
        );
        id
    }

    /// Forget a connection. Returns false if it was unknown.
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.connections.write().await.remove(id).is_some();
        if removed {
            info!(connection_id = %id, "Connection removed");
        }
        removed
    }

    /// Mark a connection disconnected. Returns false if it was unknown.
    pub async fn mark_disconnected(&self, id: &str) -> bool {
        let mut connections = self.connections.write().await;
        let Some(entry) = connections.get_mut(id) else {
            return false;
        };
        if entry.connection.status == ConnectionStatus::Connected {
            entry.connection.status = ConnectionStatus::Disconnected;
            self.publish(ManagerEvent::Disconnected {
                connection_id: id.to_string(),
            });
        }
        true
    }

    /// Snapshot of every known connection, ordered by id.
    pub async fn get_connections(&self) -> Vec<Connection> {
        let connections = self.connections.read().await;
        let mut list: Vec<Connection> = connections
            .values()
            .map(|entry| entry.connection.clone())
            .collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    pub async fn connection(&self, id: &str) -> Option<Connection> {
        let connections = self.connections.read().await;
        connections.get(id).map(|entry| entry.connection.clone())
    }

    /// Send a theme to apply.
    pub async fn send_theme_update(&self, id: &str, payload: ThemePayload) -> DispatchResult {
        self.dispatch(id, Message::ThemeUpdate(payload)).await
    }

    /// Ask the agent to remove its theme.
    pub async fn remove_theme(&self, id: &str) -> DispatchResult {
        self.dispatch(id, Message::ThemeRemove).await
    }

    /// Poll the agent's current state.
    pub async fn request_status(&self, id: &str) -> DispatchResult {
        self.dispatch(id, Message::StatusRequest).await
    }

    pub async fn send_heartbeat(&self, id: &str) -> DispatchResult {
        self.dispatch(id, Message::heartbeat()).await
    }

    async fn dispatch(&self, id: &str, message: Message) -> DispatchResult {
        let connections = self.connections.read().await;
        let entry = connections
            .get(id)
            .ok_or_else(|| DispatchError::UnknownConnection(id.to_string()))?;
        if !entry.connection.is_connected() {
            return Err(DispatchError::Disconnected(id.to_string()));
        }

        let correlation_id = Uuid::new_v4().to_string();
        let kind = message.kind();
        let text = Envelope::new(message, self.config.source.as_str())
            .with_correlation(Some(correlation_id.clone()))
            .to_json()
            .map_err(|e| DispatchError::Encode(e.to_string()))?;

        if let Err(e) = entry.target.post(&text) {
            warn!(connection_id = %id, %kind, "Dispatch failed: {}", e);
            return Err(e.into());
        }
        debug!(connection_id = %id, %kind, %correlation_id, "Dispatched");

        Ok(Dispatch {
            connection_id: id.to_string(),
            correlation_id,
        })
    }

    /// Handle an envelope received from connection `id`.
    ///
    /// Heartbeats and status responses refresh the connection's liveness.
    /// Returns the event published for it, if any.
    pub async fn handle_incoming(&self, id: &str, raw: &str) -> Option<ManagerEvent> {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(ProtocolError::UnknownType(kind)) => {
                debug!(connection_id = %id, %kind, "Ignoring unknown message type");
                return None;
            }
            Err(e) => {
                debug!(connection_id = %id, "Ignoring undecodable message: {}", e);
                return None;
            }
        };

        let connection_id = id.to_string();
        let correlation_id = envelope.correlation_id;
        let event = match envelope.message {
            Message::Heartbeat(_) => {
                let at = self.touch(id).await?;
                ManagerEvent::Heartbeat { connection_id, at }
            }
            Message::StatusResponse(report) => {
                self.touch(id).await?;
                ManagerEvent::Status {
                    connection_id,
                    correlation_id,
                    report,
                }
            }
            Message::Error(report) => {
                if !self.is_known(id).await {
                    return None;
                }
                warn!(connection_id = %id, error = %report.error, "Agent reported an error");
                ManagerEvent::Error {
                    connection_id,
                    correlation_id,
                    report,
                }
            }
            other => {
                debug!(connection_id = %id, kind = %other.kind(), "Ignoring manager-bound kind");
                return None;
            }
        };

        self.publish(event.clone());
        Some(event)
    }

    /// Mark connections silent for longer than the heartbeat timeout as
    /// disconnected. Returns the ids that changed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let timeout = self.config.heartbeat_timeout;
        let mut stale = Vec::new();
        let mut connections = self.connections.write().await;
        for (id, entry) in connections.iter_mut() {
            if !entry.connection.is_connected() {
                continue;
            }
            let silent_for = now
                .signed_duration_since(entry.last_activity())
                .to_std()
                .unwrap_or_default();
            if silent_for > timeout {
                entry.connection.status = ConnectionStatus::Disconnected;
                stale.push(id.clone());
            }
        }
        drop(connections);

        stale.sort();
        for id in &stale {
            info!(connection_id = %id, "Connection timed out");
            self.publish(ManagerEvent::Disconnected {
                connection_id: id.clone(),
            });
        }
        stale
    }

    /// Refresh liveness. Returns the time recorded, or `None` if unknown.
    async fn touch(&self, id: &str) -> Option<DateTime<Utc>> {
        let mut connections = self.connections.write().await;
        let Some(entry) = connections.get_mut(id) else {
            debug!(connection_id = %id, "Message from unknown connection");
            return None;
        };
        let now = Utc::now();
        if entry.connection.status == ConnectionStatus::Disconnected {
            info!(connection_id = %id, "Connection is back");
        }
        entry.connection.status = ConnectionStatus::Connected;
        entry.connection.last_seen = Some(now);
        Some(now)
    }

    async fn is_known(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    fn publish(&self, event: ManagerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

/// Sweep `manager` for silent connections every `every`.
pub fn run_liveness_monitor(manager: Arc<CommunicationManager>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        // Sweep times follow the runtime clock from here on.
        let (started, started_at) = (Instant::now(), Utc::now());
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let elapsed = TimeDelta::from_std(started.elapsed()).unwrap_or(TimeDelta::zero());
            manager.sweep(started_at + elapsed).await;
        }
    })
}
