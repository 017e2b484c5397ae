//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::types::{ActionId, Outcome, OutcomeStatus};

/// Message type tag carried by every action frame.
pub const ACTION_MESSAGE_TYPE: &str = "iot_action";

/// Action request as it travels over the peer link and the relay socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionFrame {
    /// Box identifier used for routing.
    pub identifier: String,
    /// Device on the box the action is addressed to.
    pub device_identifier: String,
    /// Identity shared across every attempt of the action.
    pub action_id: ActionId,
    /// Opaque action payload.
    pub payload: serde_json::Value,
    /// Always [`ACTION_MESSAGE_TYPE`].
    pub message_type: String,
}

impl ActionFrame {
    /// Build an action frame.
    pub fn new(
        identifier: impl Into<String>,
        device_identifier: impl Into<String>,
        action_id: ActionId,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            device_identifier: device_identifier.into(),
            action_id,
            payload,
            message_type: ACTION_MESSAGE_TYPE.to_owned(),
        }
    }

    /// Reply to this frame with the given status.
    pub fn reply(&self, status: OutcomeStatus) -> ReplyFrame {
        ReplyFrame {
            action_id: self.action_id,
            device_identifier: self.device_identifier.clone(),
            status,
            result: None,
        }
    }
}

/// Device answer to an [`ActionFrame`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyFrame {
    /// Action being answered.
    pub action_id: ActionId,
    /// Device that answered.
    pub device_identifier: String,
    /// Success or disconnected.
    pub status: OutcomeStatus,
    /// Optional device-specific result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl From<ReplyFrame> for Outcome {
    fn from(frame: ReplyFrame) -> Self {
        Outcome {
            status: frame.status,
            device_identifier: frame.device_identifier,
            result: frame.result,
        }
    }
}
