//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{Result, TransportError};
use crate::frame::ReplyFrame;
use crate::kind::TransportKind;
use crate::types::ActionId;

#[derive(Debug)]
struct Slot {
    tx: Option<oneshot::Sender<ReplyFrame>>,
    rx: Option<oneshot::Receiver<ReplyFrame>>,
}

/// Table of actions waiting for a reply on a channel that answers out of band.
///
/// Slots are registered when the action is sent so that a reply racing ahead of
/// `await_outcome` is kept until someone waits for it. Each slot resolves once.
#[derive(Debug)]
pub struct PendingReplies {
    kind: TransportKind,
    slots: Mutex<HashMap<ActionId, Slot>>,
}

impl PendingReplies {
    /// Create an empty table for the given transport.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Register interest in the reply to `action_id`. Re-registering replaces the old slot.
    pub fn register(&self, action_id: ActionId) {
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(
            action_id,
            Slot {
                tx: Some(tx),
                rx: Some(rx),
            },
        );
    }

    /// Drop a registration, e.g. after the send itself failed.
    pub fn forget(&self, action_id: ActionId) {
        self.slots.lock().remove(&action_id);
    }

    /// Route a reply to its waiter. Returns false for unknown or already answered actions.
    pub fn resolve(&self, frame: ReplyFrame) -> bool {
        let mut slots = self.slots.lock();
        let Some(slot) = slots.get_mut(&frame.action_id) else {
            debug!(transport = %self.kind, action_id = %frame.action_id, "reply for unknown action dropped");
            return false;
        };
        let Some(tx) = slot.tx.take() else {
            debug!(transport = %self.kind, action_id = %frame.action_id, "duplicate reply dropped");
            return false;
        };
        tx.send(frame).is_ok()
    }

    /// Wait up to `timeout` for the reply to `action_id`.
    pub async fn wait(&self, action_id: ActionId, timeout: Duration) -> Result<ReplyFrame> {
        let rx = {
            let mut slots = self.slots.lock();
            slots
                .get_mut(&action_id)
                .and_then(|slot| slot.rx.take())
                .ok_or(TransportError::UnknownAction(action_id))?
        };

        let result = tokio::time::timeout(timeout, rx).await;
        self.forget(action_id);
        match result {
            Ok(Ok(frame)) => Ok(frame),
            Ok(Err(_)) => Err(TransportError::unavailable(
                self.kind,
                "channel closed before the reply arrived",
            )),
            Err(_) => Err(TransportError::Timeout {
                kind: self.kind,
                action_id,
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Fail every outstanding waiter, used when the underlying channel goes away.
    pub fn abandon_all(&self) {
        let mut slots = self.slots.lock();
        for slot in slots.values_mut() {
            slot.tx.take();
        }
    }

    /// Number of registered actions.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }
}
