//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::fmt;

use chrono::{DateTime, Utc};
use iot_link_transport::Tier;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::info;

/// Connection quality as last observed by the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// A local-tier transport served the last action.
    Local,
    /// Only the remote tier could reach the box.
    Online,
    /// No transport reached the box.
    Offline,
}

impl ConnectionStatus {
    /// Status reported when a transport of `tier` wins.
    pub fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Local => ConnectionStatus::Local,
            Tier::Remote => ConnectionStatus::Online,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Local => "local",
            ConnectionStatus::Online => "online",
            ConnectionStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status value together with the wall-clock time it was set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub changed_at: DateTime<Utc>,
}

impl StatusSnapshot {
    fn now(status: ConnectionStatus) -> Self {
        Self {
            status,
            changed_at: Utc::now(),
        }
    }
}

/// Identifies one cascade run for ordering status writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RunTicket(u64);

#[derive(Debug)]
struct Ledger {
    clock: u64,
    last_success: u64,
}

/// Single owner of the connection status.
///
/// Writes are serialized. A run that exhausts every transport only turns the
/// status offline when no other run has succeeded since it began, so a slow
/// failing request cannot hide a concurrent success.
#[derive(Debug)]
pub struct StatusTracker {
    ledger: Mutex<Ledger>,
    sender: watch::Sender<StatusSnapshot>,
}

impl StatusTracker {
    /// Tracker starting from `initial`.
    pub fn new(initial: ConnectionStatus) -> Self {
        let (sender, _) = watch::channel(StatusSnapshot::now(initial));
        Self {
            ledger: Mutex::new(Ledger {
                clock: 0,
                last_success: 0,
            }),
            sender,
        }
    }

    /// Mark the start of a cascade run.
    pub fn begin_run(&self) -> RunTicket {
        let mut ledger = self.ledger.lock();
        ledger.clock += 1;
        RunTicket(ledger.clock)
    }

    /// Record that a transport of `tier` won. Returns the status it replaced.
    pub fn record_success(&self, tier: Tier) -> ConnectionStatus {
        self.stamp(ConnectionStatus::for_tier(tier))
    }

    /// Record that the run holding `ticket` exhausted every transport.
    ///
    /// Returns whether the status was switched to offline.
    pub fn record_exhausted(&self, ticket: RunTicket) -> bool {
        let mut ledger = self.ledger.lock();
        if ledger.last_success > ticket.0 {
            return false;
        }
        ledger.clock += 1;
        let previous = self
            .sender
            .send_replace(StatusSnapshot::now(ConnectionStatus::Offline));
        if previous.status != ConnectionStatus::Offline {
            info!(from = %previous.status, to = "offline", "connection status changed");
        }
        true
    }

    /// Overwrite the status, counting as a success for ordering purposes.
    pub fn force(&self, status: ConnectionStatus) -> ConnectionStatus {
        self.stamp(status)
    }

    fn stamp(&self, status: ConnectionStatus) -> ConnectionStatus {
        let mut ledger = self.ledger.lock();
        ledger.clock += 1;
        ledger.last_success = ledger.clock;
        let previous = self.sender.send_replace(StatusSnapshot::now(status));
        if previous.status != status {
            info!(from = %previous.status, to = %status, "connection status changed");
        }
        previous.status
    }

    /// Current status.
    pub fn current(&self) -> ConnectionStatus {
        self.sender.borrow().status
    }

    /// Current status with its change time.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.sender.borrow().clone()
    }

    /// Receive every status change.
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.sender.subscribe()
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(ConnectionStatus::Offline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiers_map_to_status() {
        assert_eq!(ConnectionStatus::for_tier(Tier::Local), ConnectionStatus::Local);
        assert_eq!(ConnectionStatus::for_tier(Tier::Remote), ConnectionStatus::Online);
        assert_eq!(
            serde_json::to_string(&ConnectionStatus::Offline).unwrap(),
            "\"offline\""
        );
    }

    #[test]
    fn success_then_exhaustion_goes_offline() {
        let tracker = StatusTracker::default();
        tracker.begin_run();
        assert_eq!(tracker.record_success(Tier::Local), ConnectionStatus::Offline);
        assert_eq!(tracker.current(), ConnectionStatus::Local);

        let second = tracker.begin_run();
        assert!(tracker.record_exhausted(second));
        assert_eq!(tracker.current(), ConnectionStatus::Offline);
    }

    #[test]
    fn overlapping_success_wins_over_older_failure() {
        let tracker = StatusTracker::default();
        let slow = tracker.begin_run();
        tracker.begin_run();
        tracker.record_success(Tier::Remote);

        assert!(!tracker.record_exhausted(slow));
        assert_eq!(tracker.current(), ConnectionStatus::Online);
    }

    #[tokio::test]
    async fn subscribers_observe_changes() {
        let tracker = StatusTracker::default();
        let mut rx = tracker.subscribe();
        tracker.force(ConnectionStatus::Online);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().status, ConnectionStatus::Online);
    }
}
