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
use iot_link_common::config::PeerLinkConfig;
use once_cell::sync::OnceCell;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::frame::{ActionFrame, ReplyFrame};
use crate::kind::TransportKind;
use crate::pending::PendingReplies;
use crate::transport::Transport;
use crate::types::{ActionId, Outcome, Target};

const REPLY_CAPACITY: usize = 64;

/// Established peer data channel to one or more boxes.
///
/// Signalling and channel negotiation happen elsewhere; this is only the
/// message surface the peer-link transport needs.
#[async_trait]
pub trait DataChannel: Send + Sync + 'static {
    /// Push an action frame to the box with the given identifier.
    async fn send_frame(&self, identifier: &str, frame: ActionFrame) -> Result<()>;

    /// Subscribe to replies coming back over the channel.
    fn replies(&self) -> broadcast::Receiver<ReplyFrame>;
}

/// Peer-link transport routing replies from a [`DataChannel`] to pending actions.
pub struct PeerLinkTransport<C: DataChannel> {
    channel: Arc<C>,
    pending: Arc<PendingReplies>,
    timeout: Duration,
    router: OnceCell<JoinHandle<()>>,
}

impl<C: DataChannel> PeerLinkTransport<C> {
    /// Wrap a data channel.
    pub fn new(channel: Arc<C>, config: &PeerLinkConfig) -> Self {
        Self {
            channel,
            pending: Arc::new(PendingReplies::new(TransportKind::PeerLink)),
            timeout: config.timeout,
            router: OnceCell::new(),
        }
    }

    fn ensure_router(&self) {
        self.router.get_or_init(|| {
            let mut replies = self.channel.replies();
            let pending = self.pending.clone();
            tokio::spawn(async move {
                loop {
                    match replies.recv().await {
                        Ok(frame) => {
                            pending.resolve(frame);
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "peer link reply router lagged; replies dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            debug!("peer link reply stream closed");
                            pending.abandon_all();
                            break;
                        }
                    }
                }
            })
        });
    }
}

impl<C: DataChannel> Drop for PeerLinkTransport<C> {
    fn drop(&mut self) {
        if let Some(router) = self.router.get() {
            router.abort();
        }
    }
}

#[async_trait]
impl<C: DataChannel> Transport for PeerLinkTransport<C> {
    fn kind(&self) -> TransportKind {
        TransportKind::PeerLink
    }

    async fn send(
        &self,
        target: &Target,
        device_identifier: &str,
        payload: &serde_json::Value,
        action_id: ActionId,
    ) -> Result<ActionId> {
        self.ensure_router();
        self.pending.register(action_id);
        let frame = ActionFrame::new(
            target.identifier.clone(),
            device_identifier,
            action_id,
            payload.clone(),
        );
        if let Err(err) = self.channel.send_frame(&target.identifier, frame).await {
            self.pending.forget(action_id);
            return Err(err);
        }
        debug!(box_identifier = %target.identifier, device = device_identifier, %action_id, "action pushed over peer link");
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

/// In-process [`DataChannel`] whose far end is a [`LoopbackPeer`].
#[derive(Debug)]
pub struct LoopbackChannel {
    requests: mpsc::UnboundedSender<(String, ActionFrame)>,
    replies: broadcast::Sender<ReplyFrame>,
    open: Arc<AtomicBool>,
}

/// Box side of a [`LoopbackChannel`].
#[derive(Debug)]
pub struct LoopbackPeer {
    requests: mpsc::UnboundedReceiver<(String, ActionFrame)>,
    replies: broadcast::Sender<ReplyFrame>,
    open: Arc<AtomicBool>,
}

impl LoopbackChannel {
    /// Create a connected channel and peer pair.
    pub fn pair() -> (LoopbackChannel, LoopbackPeer) {
        let (req_tx, req_rx) = mpsc::unbounded_channel();
        let (reply_tx, _) = broadcast::channel(REPLY_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));
        (
            LoopbackChannel {
                requests: req_tx,
                replies: reply_tx.clone(),
                open: open.clone(),
            },
            LoopbackPeer {
                requests: req_rx,
                replies: reply_tx,
                open,
            },
        )
    }

    /// Mark the channel closed; further sends are rejected.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Whether the channel still accepts frames.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst) && !self.requests.is_closed()
    }
}

#[async_trait]
impl DataChannel for LoopbackChannel {
    async fn send_frame(&self, identifier: &str, frame: ActionFrame) -> Result<()> {
        if !self.is_open() {
            return Err(TransportError::unavailable(
                TransportKind::PeerLink,
                "data channel closed",
            ));
        }
        self.requests
            .send((identifier.to_owned(), frame))
            .map_err(|_| TransportError::unavailable(TransportKind::PeerLink, "peer went away"))
    }

    fn replies(&self) -> broadcast::Receiver<ReplyFrame> {
        self.replies.subscribe()
    }
}

impl LoopbackPeer {
    /// Receive the next action addressed to this peer.
    pub async fn next_request(&mut self) -> Option<(String, ActionFrame)> {
        self.requests.recv().await
    }

    /// Send a reply back to the channel owner.
    pub fn reply(&self, frame: ReplyFrame) {
        if self.replies.send(frame).is_err() {
            debug!("loopback reply had no subscribers");
        }
    }

    /// Close the channel from the box side.
    pub fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }

    /// Answer every incoming action with `respond` until the channel owner goes away.
    pub fn serve<F>(mut self, respond: F) -> JoinHandle<()>
    where
        F: Fn(&ActionFrame) -> Option<ReplyFrame> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some((_identifier, frame)) = self.next_request().await {
                if let Some(reply) = respond(&frame) {
                    self.reply(reply);
                }
            }
        })
    }
}
