//! ---
//! iot_section: "09-testing"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Scripted collaborators for cascade tests."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
//! Test doubles for the cascade: transports whose behaviour is scripted per
//! call, a notifier that records every message, and a record store that
//! counts lookups.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iot_link_cascade::{
    BoxRecord, NotificationKind, Notifier, NotifyOptions, RecordStore, RecordStoreError,
};
use iot_link_transport::{
    ActionId, BoxId, Outcome, Target, Transport, TransportError, TransportKind,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::debug;

/// How a [`ScriptedTransport`] treats one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Accept the action and answer with a success outcome.
    Deliver,
    /// Accept the action and answer `disconnected`.
    Disconnect,
    /// Reject the action at send time.
    FailSend,
    /// Accept the action, then fail while waiting for the answer.
    FailAwait,
}

/// Transport double driven by a queue of [`Step`]s with a fallback default.
#[derive(Debug)]
pub struct ScriptedTransport {
    kind: TransportKind,
    default_step: Mutex<Step>,
    script: Mutex<VecDeque<Step>>,
    in_flight: Mutex<HashMap<ActionId, Step>>,
    delay: Mutex<Duration>,
    sends: AtomicUsize,
    awaits: AtomicUsize,
    sent: Mutex<Vec<(Target, String, Value, ActionId)>>,
}

impl ScriptedTransport {
    /// Transport that delivers every action until told otherwise.
    pub fn new(kind: TransportKind) -> Arc<Self> {
        Self::with_default(kind, Step::Deliver)
    }

    pub fn with_default(kind: TransportKind, step: Step) -> Arc<Self> {
        Arc::new(Self {
            kind,
            default_step: Mutex::new(step),
            script: Mutex::new(VecDeque::new()),
            in_flight: Mutex::new(HashMap::new()),
            delay: Mutex::new(Duration::ZERO),
            sends: AtomicUsize::new(0),
            awaits: AtomicUsize::new(0),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Change the behaviour used once the script queue is empty.
    pub fn set_default(&self, step: Step) {
        *self.default_step.lock() = step;
    }

    /// Queue a one-shot behaviour for the next action.
    pub fn push(&self, step: Step) {
        self.script.lock().push_back(step);
    }

    /// Hold every answer back for `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn await_count(&self) -> usize {
        self.awaits.load(Ordering::SeqCst)
    }

    /// Action ids seen by `send`, oldest first.
    pub fn action_ids(&self) -> Vec<ActionId> {
        self.sent.lock().iter().map(|(_, _, _, id)| *id).collect()
    }

    /// Targets seen by `send`, oldest first.
    pub fn targets(&self) -> Vec<Target> {
        self.sent
            .lock()
            .iter()
            .map(|(target, _, _, _)| target.clone())
            .collect()
    }

    /// Payloads seen by `send`, oldest first.
    pub fn payloads(&self) -> Vec<Value> {
        self.sent
            .lock()
            .iter()
            .map(|(_, _, payload, _)| payload.clone())
            .collect()
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .pop_front()
            .unwrap_or(*self.default_step.lock())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn send(
        &self,
        target: &Target,
        device_identifier: &str,
        payload: &Value,
        action_id: ActionId,
    ) -> iot_link_transport::Result<ActionId> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().push((
            target.clone(),
            device_identifier.to_owned(),
            payload.clone(),
            action_id,
        ));
        let step = self.next_step();
        debug!(transport = %self.kind, ?step, %action_id, "scripted send");
        if step == Step::FailSend {
            return Err(TransportError::unavailable(self.kind, "scripted send failure"));
        }
        self.in_flight.lock().insert(action_id, step);
        Ok(action_id)
    }

    async fn await_outcome(
        &self,
        _target: &Target,
        device_identifier: &str,
        action_id: ActionId,
    ) -> iot_link_transport::Result<Outcome> {
        self.awaits.fetch_add(1, Ordering::SeqCst);
        let step = self
            .in_flight
            .lock()
            .remove(&action_id)
            .ok_or(TransportError::UnknownAction(action_id))?;
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match step {
            Step::Deliver => Ok(Outcome::success(device_identifier)
                .with_result(json!({ "via": self.kind.as_str() }))),
            Step::Disconnect => Ok(Outcome::disconnected(device_identifier)),
            Step::FailAwait | Step::FailSend => Err(TransportError::Timeout {
                kind: self.kind,
                action_id,
                timeout_ms: delay.as_millis() as u64,
            }),
        }
    }
}

/// One message captured by [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub options: NotifyOptions,
}

/// Notifier that keeps every message for later assertions.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn all(&self) -> Vec<Notification> {
        self.messages.lock().clone()
    }

    /// Messages of one severity.
    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.messages
            .lock()
            .iter()
            .filter(|notification| notification.options.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.messages.lock().clear();
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, options: NotifyOptions) {
        self.messages.lock().push(Notification {
            message: message.to_owned(),
            options,
        });
    }
}

/// In-memory record store that counts lookups per box.
#[derive(Debug, Default)]
pub struct CountingRecordStore {
    records: Mutex<HashMap<BoxId, BoxRecord>>,
    lookups: Mutex<HashMap<BoxId, usize>>,
    delay: Mutex<Duration>,
}

impl CountingRecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store seeded with one box.
    pub fn with_box(box_id: BoxId, ip: &str, identifier: &str) -> Arc<Self> {
        let store = Self::new();
        store.insert(box_id, ip, identifier);
        store
    }

    pub fn insert(&self, box_id: BoxId, ip: &str, identifier: &str) {
        self.records.lock().insert(
            box_id,
            BoxRecord {
                ip: ip.to_owned(),
                identifier: identifier.to_owned(),
            },
        );
    }

    /// Slow every lookup down by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn lookups(&self, box_id: BoxId) -> usize {
        self.lookups.lock().get(&box_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl RecordStore for CountingRecordStore {
    async fn lookup(&self, box_id: BoxId) -> Result<BoxRecord, RecordStoreError> {
        *self.lookups.lock().entry(box_id).or_insert(0) += 1;
        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.records
            .lock()
            .get(&box_id)
            .cloned()
            .ok_or(RecordStoreError::NotFound(box_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_queue_runs_before_default() {
        let transport = ScriptedTransport::with_default(TransportKind::LongPoll, Step::Disconnect);
        transport.push(Step::FailSend);
        let target = Target::new(1, "127.0.0.1", "box-1");

        assert!(transport
            .send(&target, "printer", &json!({}), ActionId::new())
            .await
            .is_err());

        let action_id = ActionId::new();
        transport
            .send(&target, "printer", &json!({}), action_id)
            .await
            .unwrap();
        let outcome = transport
            .await_outcome(&target, "printer", action_id)
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert_eq!(transport.send_count(), 2);
        assert_eq!(transport.await_count(), 1);
    }

    #[tokio::test]
    async fn counting_store_tracks_lookups() {
        let store = CountingRecordStore::with_box(1, "10.0.0.1", "box-1");
        store.lookup(1).await.unwrap();
        assert!(store.lookup(2).await.is_err());
        assert_eq!(store.lookups(1), 1);
        assert_eq!(store.lookups(2), 1);
    }
}
