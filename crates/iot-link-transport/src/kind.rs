//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};

/// Transport kinds known to the cascade, in default priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// In-process peer data channel to the box.
    PeerLink,
    /// HTTP long polling against the box's own address.
    LongPoll,
    /// Persistent socket through the relay server.
    SocketStream,
}

impl TransportKind {
    /// All kinds in default priority order.
    pub const ALL: [TransportKind; 3] = [
        TransportKind::PeerLink,
        TransportKind::LongPoll,
        TransportKind::SocketStream,
    ];

    /// Locality tier the kind belongs to.
    pub fn tier(&self) -> Tier {
        match self {
            TransportKind::PeerLink | TransportKind::LongPoll => Tier::Local,
            TransportKind::SocketStream => Tier::Remote,
        }
    }

    /// Static label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::PeerLink => "peer_link",
            TransportKind::LongPoll => "long_poll",
            TransportKind::SocketStream => "socket_stream",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Grouping of transports by locality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Reached on the same network as the box.
    Local,
    /// Reached through the relay server.
    Remote,
}
