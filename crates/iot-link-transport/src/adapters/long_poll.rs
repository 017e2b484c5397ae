//! ---
//! iot_section: "02-transport-adapters"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport implementations for reaching IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use iot_link_common::config::LongPollConfig;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use url::Url;

use crate::error::{Result, TransportError};
use crate::frame::ReplyFrame;
use crate::kind::TransportKind;
use crate::transport::Transport;
use crate::types::{ActionId, Outcome, Target};

#[derive(Debug, Serialize)]
struct ActionRequest<'a> {
    params: ActionParams<'a>,
}

#[derive(Debug, Serialize)]
struct ActionParams<'a> {
    device_identifier: &'a str,
    action_id: ActionId,
    data: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
struct EventRequest<'a> {
    params: EventParams<'a>,
}

#[derive(Debug, Serialize)]
struct EventParams<'a> {
    listener: Listener<'a>,
}

#[derive(Debug, Serialize)]
struct Listener<'a> {
    device_identifier: &'a str,
    action_id: ActionId,
}

/// Body returned by the event endpoint; `null` means the poll window elapsed quietly.
#[derive(Debug, Deserialize)]
struct EventResponse {
    #[serde(default)]
    result: Option<ReplyFrame>,
}

/// HTTP long-polling transport talking directly to the box's own web server.
#[derive(Debug, Clone)]
pub struct LongPollTransport {
    client: Client,
    config: LongPollConfig,
}

impl LongPollTransport {
    /// Build a transport with its own HTTP client bounded by the configured timeout.
    pub fn new(config: LongPollConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, target: &Target, path: &str) -> Result<Url> {
        let raw = format!(
            "{}://{}:{}{}",
            self.config.scheme, target.ip, self.config.port, path
        );
        Url::parse(&raw).map_err(|err| TransportError::InvalidEndpoint(format!("{raw}: {err}")))
    }
}

#[async_trait]
impl Transport for LongPollTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::LongPoll
    }

    async fn send(
        &self,
        target: &Target,
        device_identifier: &str,
        payload: &serde_json::Value,
        action_id: ActionId,
    ) -> Result<ActionId> {
        let url = self.endpoint(target, &self.config.action_path)?;
        let body = ActionRequest {
            params: ActionParams {
                device_identifier,
                action_id,
                data: payload,
            },
        };
        self.client
            .post(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        debug!(ip = %target.ip, device = device_identifier, %action_id, "action posted to box");
        Ok(action_id)
    }

    async fn await_outcome(
        &self,
        target: &Target,
        device_identifier: &str,
        action_id: ActionId,
    ) -> Result<Outcome> {
        let url = self.endpoint(target, &self.config.event_path)?;
        let deadline = Instant::now() + self.config.timeout;
        let body = EventRequest {
            params: EventParams {
                listener: Listener {
                    device_identifier,
                    action_id,
                },
            },
        };

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout {
                    kind: TransportKind::LongPoll,
                    action_id,
                    timeout_ms: self.config.timeout.as_millis() as u64,
                });
            }

            let response = self
                .client
                .post(url.clone())
                .timeout(remaining.max(Duration::from_millis(1)))
                .json(&body)
                .send()
                .await;
            let response = match response {
                Ok(response) => response.error_for_status()?,
                Err(err) if err.is_timeout() => continue,
                Err(err) => return Err(err.into()),
            };

            let event: EventResponse = response.json().await?;
            match event.result {
                Some(frame) if frame.action_id == action_id => return Ok(frame.into()),
                Some(frame) => {
                    debug!(expected = %action_id, received = %frame.action_id, "ignoring event for another action");
                }
                None => {}
            }
        }
    }
}
