//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
//! Transport layer for IoT Link.
//!
//! Every channel that can carry an action to an IoT box implements the
//! [`Transport`] trait: a `send` that hands the action to the channel and an
//! `await_outcome` that resolves exactly once with the device's answer. The
//! cascade in `iot-link-cascade` decides which of them is tried and when.
#![warn(missing_docs)]

pub mod adapters;
pub mod error;
pub mod frame;
pub mod kind;
pub mod pending;
pub mod transport;
pub mod types;

pub use adapters::{
    DataChannel, LongPollTransport, LoopbackChannel, LoopbackPeer, PeerLinkTransport,
    SocketStreamTransport,
};
pub use error::{Result, TransportError};
pub use frame::{ActionFrame, ReplyFrame, ACTION_MESSAGE_TYPE};
pub use kind::{Tier, TransportKind};
pub use pending::PendingReplies;
pub use transport::Transport;
pub use types::{ActionId, BoxId, Outcome, OutcomeStatus, Target};
