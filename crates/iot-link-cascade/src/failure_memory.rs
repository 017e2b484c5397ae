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
use std::time::Duration;

use iot_link_common::config::CooldownConfig;
use iot_link_transport::{BoxId, TransportKind};
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Last-failure timestamps per (box, transport kind) with a cooldown window per kind.
///
/// A transport whose latest genuine failure is younger than its window is
/// skipped by the cascade. Skips never write here.
#[derive(Debug)]
pub struct FailureMemory {
    cooldown: CooldownConfig,
    entries: Mutex<HashMap<(BoxId, TransportKind), Instant>>,
}

impl FailureMemory {
    /// Empty memory using the given windows.
    pub fn new(cooldown: CooldownConfig) -> Self {
        Self {
            cooldown,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cooldown window applied to a transport kind.
    pub fn cooldown(&self, kind: TransportKind) -> Duration {
        match kind {
            TransportKind::PeerLink => self.cooldown.peer_link,
            TransportKind::LongPoll => self.cooldown.long_poll,
            TransportKind::SocketStream => self.cooldown.socket_stream,
        }
    }

    /// Stamp a failure of `kind` towards `box_id` at the current instant.
    pub fn record_failure(&self, box_id: BoxId, kind: TransportKind) {
        self.entries.lock().insert((box_id, kind), Instant::now());
        debug!(box_id, transport = %kind, "failure recorded");
    }

    /// True while the latest failure is inside the cooldown window.
    pub fn is_recently_failed(&self, box_id: BoxId, kind: TransportKind) -> bool {
        let window = self.cooldown(kind);
        if window.is_zero() {
            return false;
        }
        self.last_failure(box_id, kind)
            .is_some_and(|stamp| stamp.elapsed() < window)
    }

    /// Latest failure instant, if one is recorded.
    pub fn last_failure(&self, box_id: BoxId, kind: TransportKind) -> Option<Instant> {
        self.entries.lock().get(&(box_id, kind)).copied()
    }

    /// Forget the failure of one transport towards one box.
    pub fn clear(&self, box_id: BoxId, kind: TransportKind) {
        self.entries.lock().remove(&(box_id, kind));
    }

    /// Forget every recorded failure.
    pub fn clear_all(&self) {
        let mut entries = self.entries.lock();
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "failure memory cleared");
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl Default for FailureMemory {
    fn default() -> Self {
        Self::new(CooldownConfig::default())
    }
}
