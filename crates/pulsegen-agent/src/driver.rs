//! Runs an agent on a tokio task.
//!
//! The task owns the agent: it announces readiness, handles queued messages,
//! emits heartbeats on a fixed interval and disposes the agent on unload.

use crate::agent::Agent;
use crate::document::Document;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};

/// A `message` event waiting to be handled.
#[derive(Debug, Clone)]
struct Inbound {
    raw: String,
    origin: String,
}

/// Handle to a running agent.
pub struct AgentHandle<D> {
    inbound: mpsc::UnboundedSender<Inbound>,
    unload: oneshot::Sender<()>,
    task: JoinHandle<Agent<D>>,
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("agent task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Start `agent` on the current runtime.
pub fn spawn<D>(agent: Agent<D>) -> AgentHandle<D>
where
    D: Document + Send + 'static,
{
    let (inbound, inbound_rx) = mpsc::unbounded_channel();
    let (unload, unload_rx) = oneshot::channel();
    let task = tokio::spawn(run(agent, inbound_rx, unload_rx));
    AgentHandle {
        inbound,
        unload,
        task,
    }
}

impl<D> AgentHandle<D> {
    /// Queue a message received from `origin`. Returns false once the agent
    /// has stopped.
    pub fn deliver(&self, raw: impl Into<String>, origin: impl Into<String>) -> bool {
        self.inbound
            .send(Inbound {
                raw: raw.into(),
                origin: origin.into(),
            })
            .is_ok()
    }

    /// Stop the heartbeat, close the listener and dispose the agent.
    ///
    /// Messages queued before the call are handled first.
    pub async fn unload(self) -> Result<Agent<D>, DriverError> {
        let _ = self.unload.send(());
        Ok(self.task.await?)
    }
}

async fn run<D: Document>(
    mut agent: Agent<D>,
    mut inbound: mpsc::UnboundedReceiver<Inbound>,
    mut unload: oneshot::Receiver<()>,
) -> Agent<D> {
    agent.on_load();

    let period = agent.config().heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + period, period);

    loop {
        tokio::select! {
            biased;

            msg = inbound.recv() => match msg {
                Some(Inbound { raw, origin }) => {
                    agent.handle_message(&raw, &origin);
                }
                None => break,
            },

            _ = heartbeat.tick() => agent.heartbeat(),

            _ = &mut unload => break,
        }
    }

    inbound.close();
    agent.dispose();
    agent
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::document::MemoryDocument;
    use pulsegen_core::{ChannelTarget, Envelope, Message, MessageKind, THEME_STYLE_ID};
    use std::time::Duration;

    const EMBEDDER: &str = "http://localhost:3000";

    fn started() -> (
        AgentHandle<MemoryDocument>,
        mpsc::UnboundedReceiver<String>,
    ) {
        let (target, rx) = ChannelTarget::pair("parent");
        let agent = Agent::new(
            AgentConfig::default(),
            MemoryDocument::new("https://crm.example.com/"),
            vec![Box::new(target)],
        );
        (spawn(agent), rx)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<String>) -> Envelope {
        Envelope::parse(&rx.recv().await.unwrap()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn announces_ready_then_beats() {
        let (handle, mut rx) = started();
        assert_eq!(next(&mut rx).await.kind(), MessageKind::StatusResponse);

        tokio::time::sleep(Duration::from_secs(31)).await;
        let beat = next(&mut rx).await;
        assert!(matches!(beat.message, Message::Heartbeat(_)));

        handle.unload().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn unload_removes_applied_theme() {
        let (handle, mut rx) = started();
        next(&mut rx).await;

        let update = r#"{"type":"PG_THEME_UPDATE","data":{"name":"T1","css":"body{color:red}","js":""}}"#;
        assert!(handle.deliver(update, EMBEDDER));
        assert_eq!(next(&mut rx).await.kind(), MessageKind::StatusResponse);

        let agent = handle.unload().await.unwrap();
        assert!(agent.document().element(THEME_STYLE_ID).is_none());
        assert!(agent.current_theme().is_none());
        assert!(!agent.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn no_heartbeat_after_unload() {
        let (handle, mut rx) = started();
        next(&mut rx).await;
        handle.unload().await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        // The agent (and its target) are gone, so the channel is closed.
        assert!(rx.recv().await.is_none());
    }
}
