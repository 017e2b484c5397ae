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
use uuid::Uuid;

/// Numeric record id of an IoT box.
pub type BoxId = u64;

/// Identity shared by every transport attempt of one action so the box can deduplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(Uuid);

impl ActionId {
    /// Generate a fresh random action id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for ActionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// A box whose network identity has been resolved from the record store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Record id of the box.
    pub box_id: BoxId,
    /// Address of the box on its local network (long polling).
    pub ip: String,
    /// Stable identifier of the box (peer link and relay routing).
    pub identifier: String,
}

impl Target {
    /// Construct a resolved target.
    pub fn new(box_id: BoxId, ip: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            box_id,
            ip: ip.into(),
            identifier: identifier.into(),
        }
    }
}

/// Device answer carried by an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The device executed the action.
    Success,
    /// The message reached the channel but the device did not answer normally.
    Disconnected,
}

/// Result of one action as reported by the device (or synthesised on failure).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    /// Success or disconnected.
    pub status: OutcomeStatus,
    /// Device the action was addressed to.
    pub device_identifier: String,
    /// Optional device-specific result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

impl Outcome {
    /// Successful outcome without a result payload.
    pub fn success(device_identifier: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Success,
            device_identifier: device_identifier.into(),
            result: None,
        }
    }

    /// Disconnected outcome.
    pub fn disconnected(device_identifier: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::Disconnected,
            device_identifier: device_identifier.into(),
            result: None,
        }
    }

    /// Attach a result payload.
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    /// True when the device executed the action.
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}
