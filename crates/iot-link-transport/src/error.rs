//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use thiserror::Error;

use crate::kind::TransportKind;
use crate::types::ActionId;

/// Failures raised by a transport while sending an action or waiting for its outcome.
///
/// Every variant is non-fatal for the cascade: it moves on to the next stage.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The channel rejected the attempt outright (closed, unconfigured, refused).
    #[error("{kind} transport unavailable: {reason}")]
    Unavailable {
        /// Transport that refused the attempt.
        kind: TransportKind,
        /// Human readable cause.
        reason: String,
    },

    /// No reply arrived within the adapter's own bound.
    #[error("{kind} transport timed out after {timeout_ms}ms waiting for action {action_id}")]
    Timeout {
        /// Transport that gave up.
        kind: TransportKind,
        /// Action whose reply never arrived.
        action_id: ActionId,
        /// Configured bound in milliseconds.
        timeout_ms: u64,
    },

    /// `await_outcome` was called for an action that was never sent on this transport.
    #[error("no pending send for action {0}")]
    UnknownAction(ActionId),

    /// The endpoint derived from the target could not be built.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// HTTP failure from the long-poll adapter.
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket failure from the relay adapter.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TransportError {
    /// Shorthand for [`TransportError::Unavailable`].
    pub fn unavailable(kind: TransportKind, reason: impl Into<String>) -> Self {
        TransportError::Unavailable {
            kind,
            reason: reason.into(),
        }
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;
