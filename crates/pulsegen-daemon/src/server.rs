//! WebSocket bridge between embedded pages and the manager.
//!
//! Each socket is one connection: the `Origin` of the handshake becomes its
//! URL, text frames from the page go to the manager, and commands from the
//! manager are written back as text frames.

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use pulsegen_core::{ChannelTarget, StatusKind, ThemePayload};
use pulsegen_manager::{CommunicationManager, ManagerEvent, run_liveness_monitor};
use std::fmt;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use crate::config::DaemonConfig;

/// Bind, start the liveness monitor and serve until the listener fails.
pub async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    let theme = match &config.theme {
        Some(theme) => Some(theme.load_payload().await?),
        None => None,
    };
    let manager = Arc::new(CommunicationManager::new(config.manager_config()));
    let _monitor = run_liveness_monitor(manager.clone(), config.sweep_interval());
    tokio::spawn(log_events(manager.clone()));

    let listener = TcpListener::bind(config.listen).await?;
    tracing::info!("Listening on ws://{}", listener.local_addr()?);
    serve(listener, manager, theme).await
}

/// Accept connections on `listener` forever.
///
/// `theme`, if set, is deployed to every page that reports ready.
pub async fn serve(
    listener: TcpListener,
    manager: Arc<CommunicationManager>,
    theme: Option<ThemePayload>,
) -> anyhow::Result<()> {
    let theme = Arc::new(theme);
    loop {
        let (stream, addr) = listener.accept().await?;
        let manager = manager.clone();
        let theme = theme.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, manager, theme).await {
                tracing::warn!("Connection error from {}: {}", addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    manager: Arc<CommunicationManager>,
    theme: Arc<Option<ThemePayload>>,
) -> anyhow::Result<()> {
    let mut origin = None;
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        origin = req
            .headers()
            .get("origin")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Ok::<_, ErrorResponse>(resp)
    })
    .await?;
    let (sink, stream) = ws.split();

    let url = origin.unwrap_or_else(|| format!("ws://{addr}"));
    tracing::debug!("New connection from {}", addr);
    relay(url, sink, stream, &manager, (*theme).as_ref()).await;
    tracing::debug!("Connection closed: {}", addr);
    Ok(())
}

/// Register a connection for `url` and relay frames until either side goes
/// away. The connection is always unregistered on return.
async fn relay<Si, St, E>(
    url: String,
    sink: Si,
    stream: St,
    manager: &CommunicationManager,
    theme: Option<&ThemePayload>,
) where
    Si: Sink<Message>,
    Si::Error: fmt::Display,
    St: Stream<Item = Result<Message, E>>,
    E: fmt::Display,
{
    let mut sink = pin!(sink);
    let mut stream = pin!(stream);

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = manager
        .register(url, Box::new(ChannelTarget::new("socket", tx)))
        .await;

    loop {
        tokio::select! {
            // Envelope from the page
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error on {}: {}", id, e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let event = manager.handle_incoming(&id, text.as_str()).await;
                        if let (Some(event), Some(theme)) = (event, theme) {
                            deploy_on_ready(manager, &event, theme).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }

            // Command from the manager
            text = rx.recv() => {
                let Some(text) = text else { break };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    tracing::warn!("Failed to write to {}: {}", id, e);
                    break;
                }
            }
        }
    }

    manager.unregister(&id).await;
}

async fn deploy_on_ready(manager: &CommunicationManager, event: &ManagerEvent, theme: &ThemePayload) {
    let ManagerEvent::Status {
        connection_id,
        report,
        ..
    } = event
    else {
        return;
    };
    if report.status != StatusKind::Ready {
        return;
    }
    match manager.send_theme_update(connection_id, theme.clone()).await {
        Ok(dispatch) => tracing::info!(
            "Deploying '{}' to {} ({})",
            theme.name,
            connection_id,
            dispatch.correlation_id
        ),
        Err(e) => tracing::warn!("Could not deploy '{}' to {}: {}", theme.name, connection_id, e),
    }
}

async fn log_events(manager: Arc<CommunicationManager>) {
    let mut events = manager.subscribe();
    loop {
        match events.recv().await {
            Ok(ManagerEvent::Status {
                connection_id,
                report,
                ..
            }) => tracing::info!(
                "{} reports {:?}{}",
                connection_id,
                report.status,
                report.message.map(|m| format!(": {m}")).unwrap_or_default()
            ),
            Ok(ManagerEvent::Error {
                connection_id,
                report,
                ..
            }) => tracing::warn!("{} failed: {}", connection_id, report.error),
            Ok(ManagerEvent::Heartbeat { connection_id, .. }) => {
                tracing::trace!("{} is alive", connection_id)
            }
            Ok(ManagerEvent::Disconnected { connection_id }) => {
                tracing::info!("{} disconnected", connection_id)
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::debug!("Event log skipped {} events", n)
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{sink, stream};
    use std::io;

    async fn first_connection(manager: &CommunicationManager) -> String {
        loop {
            if let Some(connection) = manager.get_connections().await.into_iter().next() {
                return connection.id;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn failed_write_unregisters() {
        let manager = CommunicationManager::default();
        let broken = sink::unfold((), |(), _: Message| async {
            Err::<(), _>(io::Error::from(io::ErrorKind::ConnectionReset))
        });
        let silent = stream::pending::<Result<Message, io::Error>>();

        let command = async {
            let id = first_connection(&manager).await;
            manager.remove_theme(&id).await.unwrap();
        };
        tokio::join!(
            relay("https://crm.example.com".to_string(), broken, silent, &manager, None),
            command
        );

        assert!(manager.get_connections().await.is_empty());
    }

    #[tokio::test]
    async fn ready_page_gets_theme_and_close_unregisters() {
        let manager = CommunicationManager::default();
        let theme = ThemePayload::css_only("Midnight", "body{}");
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<Message, io::Error>>();

        let writer = sink::unfold(out_tx, |tx, msg: Message| async move {
            tx.send(msg).map_err(|e| e.to_string())?;
            Ok::<_, String>(tx)
        });
        let reader = stream::unfold(in_rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });

        let page = async {
            let ready = r#"{"type":"PG_STATUS_RESPONSE","data":{"status":"ready"}}"#;
            in_tx.send(Ok(Message::Text(ready.into()))).unwrap();
            let Some(Message::Text(command)) = out_rx.recv().await else {
                panic!("expected a command frame");
            };
            assert!(command.as_str().contains("PG_THEME_UPDATE"));
            in_tx.send(Ok(Message::Close(None))).unwrap();
        };
        tokio::join!(
            relay(
                "https://crm.example.com".to_string(),
                writer,
                reader,
                &manager,
                Some(&theme),
            ),
            page
        );

        assert!(manager.get_connections().await.is_empty());
    }
}
