//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use iot_link_common::config::{CascadeConfig, ModePreference};
use iot_link_transport::{Tier, TransportKind};
use parking_lot::RwLock;
use tracing::info;

use crate::failure_memory::FailureMemory;
use crate::report::SkipReason;
use crate::status::ConnectionStatus;

const LOCAL_FIRST: [TransportKind; 3] = [
    TransportKind::PeerLink,
    TransportKind::LongPoll,
    TransportKind::SocketStream,
];

const REMOTE_FIRST: [TransportKind; 3] = [
    TransportKind::SocketStream,
    TransportKind::PeerLink,
    TransportKind::LongPoll,
];

/// One entry of a cascade plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedStage {
    pub kind: TransportKind,
    /// Set when the stage is skipped before any cooldown check.
    pub skip: Option<SkipReason>,
}

/// Holds the user's preferred tier and turns it into a transport order.
#[derive(Debug)]
pub struct ModeController {
    preference: RwLock<ModePreference>,
    local_tier_enabled: bool,
}

impl ModeController {
    pub fn new(config: &CascadeConfig) -> Self {
        Self {
            preference: RwLock::new(config.prefer),
            local_tier_enabled: config.local_tier_enabled,
        }
    }

    /// Currently preferred tier.
    pub fn preference(&self) -> ModePreference {
        *self.preference.read()
    }

    /// Switch away from the tier that `current` reports and wipe `memory`.
    ///
    /// An `online` box goes back to the local tier and a `local` box goes
    /// remote, whichever preference produced that status. While `offline`
    /// the stored preference is flipped. Returns the new preference.
    pub fn toggle(&self, current: ConnectionStatus, memory: &FailureMemory) -> ModePreference {
        let next = {
            let mut preference = self.preference.write();
            *preference = match current {
                ConnectionStatus::Online => ModePreference::Local,
                ConnectionStatus::Local => ModePreference::Remote,
                ConnectionStatus::Offline => preference.toggled(),
            };
            *preference
        };
        memory.clear_all();
        info!(preference = next.as_str(), "transport mode toggled");
        next
    }

    /// Transport order for the next run under the current preference.
    pub fn plan(&self) -> Vec<PlannedStage> {
        let order = match self.preference() {
            ModePreference::Local => LOCAL_FIRST,
            ModePreference::Remote => REMOTE_FIRST,
        };
        order
            .into_iter()
            .map(|kind| PlannedStage {
                kind,
                skip: (!self.local_tier_enabled && kind.tier() == Tier::Local)
                    .then_some(SkipReason::LocalTierDisabled),
            })
            .collect()
    }
}
