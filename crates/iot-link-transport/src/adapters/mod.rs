//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
//! Concrete transports, one per cascade stage.

pub mod long_poll;
pub mod peer_link;
pub mod socket_stream;

pub use long_poll::LongPollTransport;
pub use peer_link::{DataChannel, LoopbackChannel, LoopbackPeer, PeerLinkTransport};
pub use socket_stream::SocketStreamTransport;
