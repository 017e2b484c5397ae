//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use async_trait::async_trait;

use crate::error::Result;
use crate::kind::TransportKind;
use crate::types::{ActionId, Outcome, Target};

/// Uniform capability implemented by every channel to an IoT box.
///
/// `send` hands the action to the channel and returns as soon as the channel
/// accepted it; an error means the channel is unusable right now. The answer is
/// collected separately through `await_outcome`, which resolves exactly once and
/// is bounded by the adapter's own timeout.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Which stage of the cascade this transport serves.
    fn kind(&self) -> TransportKind;

    /// Hand an action to the channel.
    async fn send(
        &self,
        target: &Target,
        device_identifier: &str,
        payload: &serde_json::Value,
        action_id: ActionId,
    ) -> Result<ActionId>;

    /// Wait for the device's answer to a previously sent action.
    async fn await_outcome(
        &self,
        target: &Target,
        device_identifier: &str,
        action_id: ActionId,
    ) -> Result<Outcome>;
}
