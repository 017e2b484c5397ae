//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::collections::HashMap;
use std::sync::Arc;

use iot_link_common::config::{CascadeConfig, ModePreference};
use iot_link_transport::{ActionId, BoxId, Outcome, Target, Tier, Transport, TransportKind};
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::failure_memory::FailureMemory;
use crate::metrics::CascadeMetrics;
use crate::mode::ModeController;
use crate::notify::{Notifier, NotifyOptions, TracingNotifier};
use crate::record_store::{RecordStore, TargetCache};
use crate::report::{
    Attempt, AttemptVerdict, CascadeError, CascadeReport, Resolution, SkipReason,
};
use crate::status::{ConnectionStatus, RunTicket, StatusSnapshot, StatusTracker};
use crate::target::BoxRef;

const NOTIFY_TITLE: &str = "IoT Box";

/// One action addressed to one device behind a box.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub box_ref: BoxRef,
    pub device_identifier: String,
    pub payload: Value,
    /// Identity shared by every transport attempt. Generated when absent.
    pub action_id: Option<ActionId>,
}

impl ActionRequest {
    pub fn new(box_ref: impl Into<BoxRef>, device_identifier: impl Into<String>, payload: Value) -> Self {
        Self {
            box_ref: box_ref.into(),
            device_identifier: device_identifier.into(),
            payload,
            action_id: None,
        }
    }

    pub fn with_action_id(mut self, action_id: ActionId) -> Self {
        self.action_id = Some(action_id);
        self
    }
}

/// Assembles a [`Dispatcher`] from its collaborators.
pub struct DispatcherBuilder {
    store: Arc<dyn RecordStore>,
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
    cascade: CascadeConfig,
    notifier: Option<Arc<dyn Notifier>>,
    metrics: Option<CascadeMetrics>,
    memory: Option<Arc<FailureMemory>>,
}

impl DispatcherBuilder {
    /// Install an adapter; a later adapter of the same kind replaces the earlier one.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transports.insert(transport.kind(), transport);
        self
    }

    pub fn cascade_config(mut self, config: CascadeConfig) -> Self {
        self.cascade = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn metrics(mut self, metrics: Option<CascadeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Share failure memory with another dispatcher instead of owning a fresh one.
    pub fn failure_memory(mut self, memory: Arc<FailureMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> Dispatcher {
        let memory = self
            .memory
            .unwrap_or_else(|| Arc::new(FailureMemory::new(self.cascade.cooldown)));
        Dispatcher {
            targets: TargetCache::new(self.store),
            transports: self.transports,
            memory,
            status: StatusTracker::new(ConnectionStatus::Offline),
            mode: ModeController::new(&self.cascade),
            notifier: self
                .notifier
                .unwrap_or_else(|| Arc::new(TracingNotifier) as Arc<dyn Notifier>),
            metrics: self.metrics,
        }
    }
}

/// Sends actions to IoT boxes over the first transport that gets through.
///
/// Stages run strictly one after another. Genuine failures (send error, await
/// error, `disconnected` answer) stamp failure memory; skipped stages do not.
/// The first successful outcome ends the run and sets the connection status
/// from the winning transport's tier. A run that exhausts every stage sets it
/// to offline.
pub struct Dispatcher {
    targets: TargetCache,
    transports: HashMap<TransportKind, Arc<dyn Transport>>,
    memory: Arc<FailureMemory>,
    status: StatusTracker,
    mode: ModeController,
    notifier: Arc<dyn Notifier>,
    metrics: Option<CascadeMetrics>,
}

impl Dispatcher {
    pub fn builder(store: Arc<dyn RecordStore>) -> DispatcherBuilder {
        DispatcherBuilder {
            store,
            transports: HashMap::new(),
            cascade: CascadeConfig::default(),
            notifier: None,
            metrics: None,
            memory: None,
        }
    }

    /// Send an action and report the outcome through exactly one of the callbacks.
    pub async fn action<S, F>(
        &self,
        box_ref: impl Into<BoxRef>,
        device_identifier: impl Into<String>,
        payload: Value,
        on_success: S,
        on_failure: F,
    ) where
        S: FnOnce(Outcome),
        F: FnOnce(Outcome),
    {
        let request = ActionRequest::new(box_ref, device_identifier, payload);
        self.dispatch(request, on_success, on_failure).await;
    }

    /// Like [`Dispatcher::action`] but takes a prepared request and hands back the run report.
    pub async fn dispatch<S, F>(
        &self,
        request: ActionRequest,
        on_success: S,
        on_failure: F,
    ) -> CascadeReport
    where
        S: FnOnce(Outcome),
        F: FnOnce(Outcome),
    {
        let report = self.execute(request).await;
        match &report.resolution {
            Resolution::Delivered { outcome, .. } => on_success(outcome.clone()),
            Resolution::Failed { outcome, .. } => on_failure(outcome.clone()),
        }
        report
    }

    /// Run the cascade for one request. Never fails; failures are described in the report.
    pub async fn execute(&self, request: ActionRequest) -> CascadeReport {
        let action_id = request.action_id.unwrap_or_default();
        let span = info_span!(
            "cascade",
            %action_id,
            box_ref = %request.box_ref,
            device = %request.device_identifier,
        );
        self.run(request, action_id).instrument(span).await
    }

    async fn run(&self, request: ActionRequest, action_id: ActionId) -> CascadeReport {
        let started = Instant::now();
        let device = request.device_identifier.as_str();

        let box_id = match request.box_ref.normalize() {
            Ok(box_id) => box_id,
            Err(err) => {
                warn!(error = %err, "rejecting action with invalid box reference");
                return rejected(action_id, None, device, err.into(), started);
            }
        };
        let target = match self.targets.resolve(box_id).await {
            Ok(target) => target,
            Err(err) => {
                warn!(box_id, error = %err, "box lookup failed");
                return rejected(action_id, Some(box_id), device, err.into(), started);
            }
        };

        let ticket = self.status.begin_run();
        let mut attempts = Vec::with_capacity(TransportKind::ALL.len());
        let mut last_disconnect = None;

        for stage in self.mode.plan() {
            let stage_started = Instant::now();
            let verdict = match self.skip_reason(stage.skip, stage.kind, box_id) {
                Some(reason) => {
                    debug!(transport = %stage.kind, reason = reason.as_str(), "stage skipped");
                    AttemptVerdict::Skipped { reason }
                }
                None => {
                    let (verdict, outcome) = self
                        .attempt(stage.kind, &target, device, &request.payload, action_id)
                        .await;
                    if verdict.is_failure() {
                        self.memory.record_failure(box_id, stage.kind);
                    }
                    if let Some(outcome) = outcome {
                        if outcome.is_success() {
                            self.record_attempt(&mut attempts, stage.kind, verdict, stage_started);
                            return self.delivered(
                                action_id, box_id, &target, stage.kind, outcome, attempts, started,
                            );
                        }
                        last_disconnect = Some(outcome);
                    }
                    verdict
                }
            };
            self.record_attempt(&mut attempts, stage.kind, verdict, stage_started);
        }

        self.exhausted(action_id, box_id, &target, device, ticket, attempts, last_disconnect, started)
    }

    fn skip_reason(
        &self,
        planned: Option<SkipReason>,
        kind: TransportKind,
        box_id: BoxId,
    ) -> Option<SkipReason> {
        if planned.is_some() {
            return planned;
        }
        if !self.transports.contains_key(&kind) {
            return Some(SkipReason::Unconfigured);
        }
        if self.memory.is_recently_failed(box_id, kind) {
            return Some(SkipReason::Cooldown);
        }
        None
    }

    async fn attempt(
        &self,
        kind: TransportKind,
        target: &Target,
        device: &str,
        payload: &Value,
        action_id: ActionId,
    ) -> (AttemptVerdict, Option<Outcome>) {
        let Some(transport) = self.transports.get(&kind) else {
            return (
                AttemptVerdict::Skipped {
                    reason: SkipReason::Unconfigured,
                },
                None,
            );
        };

        if let Err(err) = transport.send(target, device, payload, action_id).await {
            warn!(transport = %kind, error = %err, "send failed; moving to next transport");
            return (
                AttemptVerdict::SendFailed {
                    error: err.to_string(),
                },
                None,
            );
        }

        match transport.await_outcome(target, device, action_id).await {
            Ok(outcome) if outcome.is_success() => (AttemptVerdict::Delivered, Some(outcome)),
            Ok(outcome) => {
                warn!(transport = %kind, "device reported disconnected; moving to next transport");
                (AttemptVerdict::Disconnected, Some(outcome))
            }
            Err(err) => {
                warn!(transport = %kind, error = %err, "no outcome; moving to next transport");
                (
                    AttemptVerdict::AwaitFailed {
                        error: err.to_string(),
                    },
                    None,
                )
            }
        }
    }

    fn record_attempt(
        &self,
        attempts: &mut Vec<Attempt>,
        kind: TransportKind,
        verdict: AttemptVerdict,
        stage_started: Instant,
    ) {
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(kind, &verdict);
        }
        attempts.push(Attempt {
            kind,
            verdict,
            elapsed: stage_started.elapsed(),
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn delivered(
        &self,
        action_id: ActionId,
        box_id: BoxId,
        target: &Target,
        via: TransportKind,
        outcome: Outcome,
        attempts: Vec<Attempt>,
        started: Instant,
    ) -> CascadeReport {
        let tier = via.tier();
        let previous = self.status.record_success(tier);
        let status = ConnectionStatus::for_tier(tier);
        info!(box_id, transport = %via, %status, "action delivered");

        let local_failed = attempts
            .iter()
            .any(|attempt| attempt.kind.tier() == Tier::Local && attempt.verdict.is_failure());
        if tier == Tier::Remote && local_failed && previous != ConnectionStatus::Online {
            self.notifier.notify(
                &format!(
                    "IoT box {} is not reachable on the local network; using the remote connection.",
                    target.identifier
                ),
                NotifyOptions::warning().with_title(NOTIFY_TITLE),
            );
        }

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_resolution(status, elapsed);
        }
        CascadeReport {
            action_id,
            box_id: Some(box_id),
            attempts,
            resolution: Resolution::Delivered { via, outcome },
            status: Some(status),
            elapsed,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn exhausted(
        &self,
        action_id: ActionId,
        box_id: BoxId,
        target: &Target,
        device: &str,
        ticket: RunTicket,
        attempts: Vec<Attempt>,
        last_disconnect: Option<Outcome>,
        started: Instant,
    ) -> CascadeReport {
        let attempted = attempts
            .iter()
            .filter(|attempt| attempt.verdict.is_failure())
            .count();
        warn!(box_id, attempted, "all transports exhausted");

        let status = if self.status.record_exhausted(ticket) {
            self.notifier.notify(
                &format!("IoT box {} is unreachable.", target.identifier),
                NotifyOptions::danger().with_title(NOTIFY_TITLE),
            );
            Some(ConnectionStatus::Offline)
        } else {
            debug!(box_id, "a concurrent run succeeded; keeping connection status");
            None
        };

        let elapsed = started.elapsed();
        if let Some(metrics) = &self.metrics {
            metrics.record_resolution(ConnectionStatus::Offline, elapsed);
        }
        CascadeReport {
            action_id,
            box_id: Some(box_id),
            attempts,
            resolution: Resolution::Failed {
                error: CascadeError::AllTransportsExhausted { attempted },
                outcome: last_disconnect.unwrap_or_else(|| Outcome::disconnected(device)),
            },
            status,
            elapsed,
        }
    }

    /// Force the other tier for subsequent actions and forget every recorded failure.
    ///
    /// The direction follows the tier currently in effect, so a box that fell
    /// back to the relay returns to the local tier. The connection status
    /// jumps to the nominal status of the new tier.
    pub fn toggle_mode(&self, ip: &str) -> ModePreference {
        let preference = self.mode.toggle(self.status.current(), &self.memory);
        let tier = match preference {
            ModePreference::Local => Tier::Local,
            ModePreference::Remote => Tier::Remote,
        };
        self.status.force(ConnectionStatus::for_tier(tier));
        if let Some(metrics) = &self.metrics {
            metrics.record_toggle(preference);
        }
        info!(ip, preference = preference.as_str(), "mode switched by user");
        self.notifier.notify(
            &format!(
                "Connection to IoT box {ip} now prefers the {} tier.",
                preference.as_str()
            ),
            NotifyOptions::info().with_title(NOTIFY_TITLE),
        );
        preference
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.current()
    }

    pub fn status_snapshot(&self) -> StatusSnapshot {
        self.status.snapshot()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.subscribe()
    }

    pub fn mode_preference(&self) -> ModePreference {
        self.mode.preference()
    }

    /// When `kind` last failed towards `box_id`.
    pub fn last_failure(&self, box_id: BoxId, kind: TransportKind) -> Option<Instant> {
        self.memory.last_failure(box_id, kind)
    }

    pub fn is_recently_failed(&self, box_id: BoxId, kind: TransportKind) -> bool {
        self.memory.is_recently_failed(box_id, kind)
    }

    /// Resolved target for a box, if it has been looked up already.
    pub fn cached_target(&self, box_id: BoxId) -> Option<Target> {
        self.targets.cached(box_id)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.transports.keys().copied().collect();
        kinds.sort();
        f.debug_struct("Dispatcher")
            .field("transports", &kinds)
            .field("preference", &self.mode.preference())
            .field("status", &self.status.current())
            .finish_non_exhaustive()
    }
}

fn rejected(
    action_id: ActionId,
    box_id: Option<BoxId>,
    device: &str,
    error: CascadeError,
    started: Instant,
) -> CascadeReport {
    CascadeReport {
        action_id,
        box_id,
        attempts: Vec::new(),
        resolution: Resolution::Failed {
            error,
            outcome: Outcome::disconnected(device),
        },
        status: None,
        elapsed: started.elapsed(),
    }
}
