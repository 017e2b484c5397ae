//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use iot_link_common::config::SocketStreamConfig;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::frame::{ActionFrame, ReplyFrame};
use crate::kind::TransportKind;
use crate::pending::PendingReplies;
use crate::transport::Transport;
use crate::types::{ActionId, Outcome, Target};

type RelaySink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

struct RelayLink {
    sink: RelaySink,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    pending: Arc<PendingReplies>,
}

impl Drop for RelayLink {
    /// Waiters on a discarded link fail immediately instead of running into their timeout.
    fn drop(&mut self) {
        self.reader.abort();
        self.pending.abandon_all();
    }
}

/// Relay socket transport: one persistent WebSocket to the relay server shared by all actions.
///
/// The connection is opened on first use and reopened on the next send after it breaks.
pub struct SocketStreamTransport {
    relay_url: Option<String>,
    timeout: Duration,
    pending: Arc<PendingReplies>,
    link: Mutex<Option<RelayLink>>,
}

impl SocketStreamTransport {
    /// Build a transport for the configured relay.
    pub fn new(config: &SocketStreamConfig) -> Self {
        Self {
            relay_url: config.relay_url.clone(),
            timeout: config.timeout,
            pending: Arc::new(PendingReplies::new(TransportKind::SocketStream)),
            link: Mutex::new(None),
        }
    }

    async fn connect(&self) -> Result<RelayLink> {
        let url = self.relay_url.as_deref().ok_or_else(|| {
            TransportError::unavailable(TransportKind::SocketStream, "no relay url configured")
        })?;
        let (stream, _response) = tokio::time::timeout(self.timeout, connect_async(url))
            .await
            .map_err(|_| {
                TransportError::unavailable(TransportKind::SocketStream, "relay connect timed out")
            })??;
        info!(relay = url, "relay socket connected");

        let (sink, mut source) = stream.split();
        let alive = Arc::new(AtomicBool::new(true));
        let reader_alive = alive.clone();
        let pending = self.pending.clone();
        let reader = tokio::spawn(async move {
            while let Some(message) = source.next().await {
                match message {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ReplyFrame>(&text) {
                        Ok(frame) => {
                            pending.resolve(frame);
                        }
                        Err(err) => warn!(error = %err, "ignoring malformed relay frame"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(error = %err, "relay socket read failed");
                        break;
                    }
                }
            }
            reader_alive.store(false, Ordering::SeqCst);
            pending.abandon_all();
            debug!("relay socket reader finished");
        });

        Ok(RelayLink {
            sink,
            alive,
            reader,
            pending: self.pending.clone(),
        })
    }
}

#[async_trait]
impl Transport for SocketStreamTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::SocketStream
    }

    async fn send(
        &self,
        target: &Target,
        device_identifier: &str,
        payload: &serde_json::Value,
        action_id: ActionId,
    ) -> Result<ActionId> {
        let frame = ActionFrame::new(
            target.identifier.clone(),
            device_identifier,
            action_id,
            payload.clone(),
        );
        let text = serde_json::to_string(&frame)?;

        let mut guard = self.link.lock().await;
        let stale = guard
            .as_ref()
            .map_or(true, |link| !link.alive.load(Ordering::SeqCst));
        if stale {
            *guard = None;
            *guard = Some(self.connect().await?);
        }
        let Some(link) = guard.as_mut() else {
            return Err(TransportError::unavailable(
                TransportKind::SocketStream,
                "relay link missing",
            ));
        };

        self.pending.register(action_id);
        if let Err(err) = link.sink.send(Message::Text(text)).await {
            self.pending.forget(action_id);
            *guard = None;
            return Err(err.into());
        }
        debug!(box_identifier = %target.identifier, device = device_identifier, %action_id, "action relayed");
        Ok(action_id)
    }

    async fn await_outcome(
        &self,
        _target: &Target,
        _device_identifier: &str,
        action_id: ActionId,
    ) -> Result<Outcome> {
        let frame = self.pending.wait(action_id, self.timeout).await?;
        Ok(frame.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OutcomeStatus;
    use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
    use axum::routing::get;
    use axum::Router;
    use serde_json::json;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    async fn relay_loop(mut socket: WebSocket, status: OutcomeStatus) {
        while let Some(Ok(message)) = socket.recv().await {
            let AxumMessage::Text(text) = message else {
                continue;
            };
            let frame: ActionFrame = serde_json::from_str(&text).unwrap();
            let reply = serde_json::to_string(&frame.reply(status)).unwrap();
            if socket.send(AxumMessage::Text(reply)).await.is_err() {
                break;
            }
        }
    }

    async fn spawn_relay(status: OutcomeStatus) -> SocketAddr {
        let app = Router::new().route(
            "/websocket",
            get(move |ws: WebSocketUpgrade| async move {
                ws.on_upgrade(move |socket| relay_loop(socket, status))
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    async fn spawn_silent_relay() -> SocketAddr {
        let app = Router::new().route(
            "/websocket",
            get(|ws: WebSocketUpgrade| async move {
                ws.on_upgrade(|mut socket: WebSocket| async move {
                    while let Some(Ok(_)) = socket.recv().await {}
                })
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    fn transport_for(relay_url: Option<String>) -> SocketStreamTransport {
        SocketStreamTransport::new(&SocketStreamConfig {
            relay_url,
            timeout: Duration::from_secs(2),
        })
    }

    #[tokio::test]
    async fn relays_action_and_receives_reply() {
        let addr = spawn_relay(OutcomeStatus::Success).await;
        let transport = transport_for(Some(format!("ws://{addr}/websocket")));
        let target = Target::new(1, "127.0.0.1", "box-123");

        for _ in 0..2 {
            let action_id = ActionId::new();
            transport
                .send(&target, "printer", &json!({"foo": "bar"}), action_id)
                .await
                .unwrap();
            let outcome = transport
                .await_outcome(&target, "printer", action_id)
                .await
                .unwrap();
            assert!(outcome.is_success());
        }
    }

    #[tokio::test]
    async fn relay_disconnected_reply_is_passed_through() {
        let addr = spawn_relay(OutcomeStatus::Disconnected).await;
        let transport = transport_for(Some(format!("ws://{addr}/websocket")));
        let target = Target::new(1, "127.0.0.1", "box-123");
        let action_id = ActionId::new();
        transport
            .send(&target, "scale", &json!({}), action_id)
            .await
            .unwrap();
        let outcome = transport
            .await_outcome(&target, "scale", action_id)
            .await
            .unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Disconnected);
    }

    #[tokio::test]
    async fn missing_relay_url_is_unavailable() {
        let transport = transport_for(None);
        let target = Target::new(1, "127.0.0.1", "box-123");
        let err = transport
            .send(&target, "scale", &json!({}), ActionId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Unavailable {
                kind: TransportKind::SocketStream,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn unreachable_relay_fails_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let transport = transport_for(Some(format!("ws://{addr}/websocket")));
        let target = Target::new(1, "127.0.0.1", "box-123");
        assert!(transport
            .send(&target, "scale", &json!({}), ActionId::new())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn discarded_link_fails_waiters_immediately() {
        let addr = spawn_silent_relay().await;
        let transport = SocketStreamTransport::new(&SocketStreamConfig {
            relay_url: Some(format!("ws://{addr}/websocket")),
            timeout: Duration::from_secs(30),
        });
        let target = Target::new(1, "127.0.0.1", "box-123");
        let action_id = ActionId::new();
        transport
            .send(&target, "printer", &json!({}), action_id)
            .await
            .unwrap();

        transport.link.lock().await.take();
        let err = tokio::time::timeout(
            Duration::from_secs(1),
            transport.await_outcome(&target, "printer", action_id),
        )
        .await
        .expect("waiter should not run into its own timeout")
        .unwrap_err();
        assert!(matches!(err, TransportError::Unavailable { .. }));
    }
}
