//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::time::Duration;

use iot_link_transport::{ActionId, BoxId, Outcome, TransportKind};
use thiserror::Error;

use crate::record_store::RecordStoreError;
use crate::status::ConnectionStatus;
use crate::target::TargetError;

/// Why a stage was passed over without touching its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    /// The transport failed towards this box within its cooldown window.
    Cooldown,
    /// No adapter of this kind is installed.
    Unconfigured,
    /// Local-tier transports are switched off.
    LocalTierDisabled,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Cooldown => "cooldown",
            SkipReason::Unconfigured => "unconfigured",
            SkipReason::LocalTierDisabled => "local_tier_disabled",
        }
    }
}

/// What happened at one stage of a cascade run.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptVerdict {
    Skipped { reason: SkipReason },
    /// The transport rejected the action outright.
    SendFailed { error: String },
    /// The action went out but waiting for the answer failed.
    AwaitFailed { error: String },
    /// The device answered with a `disconnected` outcome.
    Disconnected,
    Delivered,
}

impl AttemptVerdict {
    /// Label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            AttemptVerdict::Skipped { .. } => "skipped",
            AttemptVerdict::SendFailed { .. } => "send_failed",
            AttemptVerdict::AwaitFailed { .. } => "await_failed",
            AttemptVerdict::Disconnected => "disconnected",
            AttemptVerdict::Delivered => "delivered",
        }
    }

    /// Whether the transport was actually exercised and failed.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AttemptVerdict::SendFailed { .. }
                | AttemptVerdict::AwaitFailed { .. }
                | AttemptVerdict::Disconnected
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub kind: TransportKind,
    pub verdict: AttemptVerdict,
    pub elapsed: Duration,
}

/// Terminal failure of a cascade run.
#[derive(Debug, Clone, Error)]
pub enum CascadeError {
    #[error("invalid target: {0}")]
    InvalidTarget(#[from] TargetError),
    #[error("target lookup failed: {0}")]
    Lookup(#[from] RecordStoreError),
    #[error("all transports exhausted after {attempted} attempt(s)")]
    AllTransportsExhausted { attempted: usize },
}

#[derive(Debug, Clone)]
pub enum Resolution {
    /// A transport delivered a successful outcome.
    Delivered { via: TransportKind, outcome: Outcome },
    /// No transport delivered; `outcome` is what the failure callback receives.
    Failed { error: CascadeError, outcome: Outcome },
}

/// Full account of one cascade run.
#[derive(Debug, Clone)]
pub struct CascadeReport {
    pub action_id: ActionId,
    /// Normalized box id, absent when the reference was invalid.
    pub box_id: Option<BoxId>,
    pub attempts: Vec<Attempt>,
    pub resolution: Resolution,
    /// Connection status written by this run, if any.
    pub status: Option<ConnectionStatus>,
    pub elapsed: Duration,
}

impl CascadeReport {
    pub fn is_success(&self) -> bool {
        matches!(self.resolution, Resolution::Delivered { .. })
    }

    /// Transport that won the run.
    pub fn winner(&self) -> Option<TransportKind> {
        match &self.resolution {
            Resolution::Delivered { via, .. } => Some(*via),
            Resolution::Failed { .. } => None,
        }
    }

    /// Outcome handed to the caller's callback.
    pub fn outcome(&self) -> &Outcome {
        match &self.resolution {
            Resolution::Delivered { outcome, .. } | Resolution::Failed { outcome, .. } => outcome,
        }
    }

    pub fn error(&self) -> Option<&CascadeError> {
        match &self.resolution {
            Resolution::Failed { error, .. } => Some(error),
            Resolution::Delivered { .. } => None,
        }
    }

    /// Verdict recorded for `kind`, if the run reached that stage.
    pub fn verdict(&self, kind: TransportKind) -> Option<&AttemptVerdict> {
        self.attempts
            .iter()
            .find(|attempt| attempt.kind == kind)
            .map(|attempt| &attempt.verdict)
    }

    /// Whether `kind` was exercised (not skipped) during the run.
    pub fn attempted(&self, kind: TransportKind) -> bool {
        self.verdict(kind)
            .is_some_and(|verdict| !matches!(verdict, AttemptVerdict::Skipped { .. }))
    }
}
