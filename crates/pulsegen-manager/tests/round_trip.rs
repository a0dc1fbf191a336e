//! Manager and agent wired together in-process through channel targets.

use pulsegen_agent::{Agent, AgentConfig, ChannelTarget, MemoryDocument};
use pulsegen_core::{
    ConnectionStatus, StatusKind, THEME_SCRIPT_ID, THEME_STYLE_ID, THEMED_BODY_CLASS, ThemePayload,
};
use pulsegen_manager::{CommunicationManager, ManagerEvent};
use tokio::sync::mpsc::UnboundedReceiver;

const APP_ORIGIN: &str = "https://pulsegen.app";

struct Harness {
    manager: CommunicationManager,
    id: String,
    agent: Agent<MemoryDocument>,
    to_agent: UnboundedReceiver<String>,
    to_manager: UnboundedReceiver<String>,
}

impl Harness {
    async fn new() -> Self {
        let manager = CommunicationManager::default();
        let (manager_side, to_agent) = ChannelTarget::pair("frame");
        let id = manager
            .register("https://crm.example.com", Box::new(manager_side))
            .await;

        let (agent_side, to_manager) = ChannelTarget::pair("parent");
        let agent = Agent::new(
            AgentConfig::default(),
            MemoryDocument::new("https://crm.example.com/contacts"),
            vec![Box::new(agent_side)],
        );

        Self {
            manager,
            id,
            agent,
            to_agent,
            to_manager,
        }
    }

    /// Move queued commands to the agent and its replies back to the manager.
    async fn pump(&mut self) -> Vec<ManagerEvent> {
        while let Ok(text) = self.to_agent.try_recv() {
            self.agent.handle_message(&text, APP_ORIGIN);
        }
        let mut events = Vec::new();
        while let Ok(text) = self.to_manager.try_recv() {
            events.extend(self.manager.handle_incoming(&self.id, &text).await);
        }
        events
    }
}

#[tokio::test]
async fn load_then_deploy_then_remove() {
    let mut h = Harness::new().await;

    h.agent.on_load();
    let events = h.pump().await;
    let [ManagerEvent::Status { report, .. }] = events.as_slice() else {
        panic!("expected a single ready status, got {events:?}");
    };
    assert_eq!(report.status, StatusKind::Ready);
    assert_eq!(report.url.as_deref(), Some("https://crm.example.com/contacts"));

    let theme = ThemePayload::new("Midnight", "body{background:#000}", "console.log(1)");
    let dispatch = h.manager.send_theme_update(&h.id, theme).await.unwrap();
    let events = h.pump().await;
    let [ManagerEvent::Status {
        correlation_id,
        report,
        ..
    }] = events.as_slice()
    else {
        panic!("expected a single success status, got {events:?}");
    };
    assert_eq!(correlation_id.as_deref(), Some(dispatch.correlation_id.as_str()));
    assert_eq!(report.status, StatusKind::Success);
    assert_eq!(report.theme.as_ref().unwrap().css, "body{background:#000}");

    let doc = h.agent.document();
    assert!(doc.element(THEME_STYLE_ID).is_some());
    assert!(doc.element(THEME_SCRIPT_ID).is_some());
    assert!(doc.has_body_class(THEMED_BODY_CLASS));

    h.manager.remove_theme(&h.id).await.unwrap();
    h.pump().await;
    assert_eq!(h.agent.document().head_len(), 0);
    assert!(h.agent.current_theme().is_none());
}

#[tokio::test]
async fn failed_injection_reaches_manager_as_error() {
    let mut h = Harness::new().await;
    h.agent
        .document_mut()
        .fail_next_insert("Content Security Policy blocked inline style");

    let dispatch = h
        .manager
        .send_theme_update(&h.id, ThemePayload::css_only("Blocked", "body{}"))
        .await
        .unwrap();
    let events = h.pump().await;

    let [ManagerEvent::Error {
        correlation_id,
        report,
        ..
    }] = events.as_slice()
    else {
        panic!("expected a single error, got {events:?}");
    };
    assert_eq!(correlation_id.as_deref(), Some(dispatch.correlation_id.as_str()));
    assert!(report.error.contains("Content Security Policy"));
    assert_eq!(report.theme.as_ref().map(|t| t.name.as_str()), Some("Blocked"));
    assert_eq!(h.agent.document().head_len(), 0);
}

#[tokio::test]
async fn status_poll_and_heartbeat_refresh_liveness() {
    let mut h = Harness::new().await;
    assert!(h.manager.connection(&h.id).await.unwrap().last_seen.is_none());

    h.manager.request_status(&h.id).await.unwrap();
    let events = h.pump().await;
    assert!(matches!(
        events.as_slice(),
        [ManagerEvent::Status { report, .. }] if report.status == StatusKind::Success && report.theme.is_none()
    ));
    let first = h.manager.connection(&h.id).await.unwrap().last_seen.unwrap();

    h.manager.send_heartbeat(&h.id).await.unwrap();
    let events = h.pump().await;
    assert!(matches!(events.as_slice(), [ManagerEvent::Heartbeat { .. }]));

    let connection = h.manager.connection(&h.id).await.unwrap();
    assert_eq!(connection.status, ConnectionStatus::Connected);
    assert!(connection.last_seen.unwrap() >= first);
}

#[tokio::test]
async fn agent_ignores_commands_relayed_from_untrusted_origin() {
    let mut h = Harness::new().await;
    h.manager
        .send_theme_update(&h.id, ThemePayload::css_only("T1", "body{}"))
        .await
        .unwrap();

    let text = h.to_agent.try_recv().unwrap();
    assert!(h.agent.handle_message(&text, "https://evil.example").is_none());
    assert!(h.to_manager.try_recv().is_err());
    assert_eq!(h.agent.document().head_len(), 0);
}
