//! ---
//! iot_section: "05-cli"
//! iot_subsection: "binary"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Control CLI for operators sending actions to IoT boxes."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, ValueEnum};
use iot_link_cascade::{
    ActionRequest, BoxRef, CascadeMetrics, CascadeReport, Dispatcher, Resolution,
    StaticRecordStore,
};
use iot_link_common::config::{AppConfig, ModePreference};
use iot_link_common::logging::init_tracing;
use iot_link_metrics::{new_registry, render_text};
use iot_link_transport::{ActionId, LongPollTransport, SocketStreamTransport};
use serde_json::Value;
use tokio::runtime::Runtime;
use tracing::info;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliPreference {
    Local,
    Remote,
}

impl From<CliPreference> for ModePreference {
    fn from(value: CliPreference) -> Self {
        match value {
            CliPreference::Local => ModePreference::Local,
            CliPreference::Remote => ModePreference::Remote,
        }
    }
}

#[derive(Debug, Args)]
pub struct ActionOptions {
    /// Box record id, either `7` or `[7]`.
    #[arg(value_name = "BOX")]
    pub box_ref: BoxRef,
    /// Device identifier behind the box.
    #[arg(value_name = "DEVICE")]
    pub device: String,
    /// JSON payload handed to the device.
    #[arg(value_name = "PAYLOAD", default_value = "{}")]
    pub payload: String,
    /// Reuse a caller-chosen action id instead of generating one.
    #[arg(long, value_name = "UUID")]
    pub action_id: Option<ActionId>,
    /// Override the configured preferred tier.
    #[arg(long, value_enum)]
    pub prefer: Option<CliPreference>,
    /// Send the action this many times, one cascade per send.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
    /// Print cascade metrics after the runs.
    #[arg(long)]
    pub metrics: bool,
}

pub fn run(config: &AppConfig, options: ActionOptions) -> Result<()> {
    init_tracing("iot-linkctl", &config.logging)?;
    let payload: Value = serde_json::from_str(&options.payload)
        .with_context(|| format!("payload '{}' is not valid JSON", options.payload))?;

    let mut cascade = config.cascade.clone();
    if let Some(prefer) = options.prefer {
        cascade.prefer = prefer.into();
    }

    let registry = new_registry();
    let metrics = if options.metrics || config.metrics.enabled {
        Some(CascadeMetrics::new(registry.clone())?)
    } else {
        None
    };

    let runtime = Runtime::new()?;
    let failures = runtime.block_on(async {
        let store = StaticRecordStore::from_config(config)?;
        let long_poll = LongPollTransport::new(config.transports.long_poll.clone())?;
        let relay = SocketStreamTransport::new(&config.transports.socket_stream);
        let dispatcher = Dispatcher::builder(Arc::new(store))
            .transport(Arc::new(long_poll))
            .transport(Arc::new(relay))
            .cascade_config(cascade)
            .metrics(metrics)
            .build();
        info!(dispatcher = ?dispatcher, "dispatcher ready");

        let mut failures = 0u32;
        for _ in 0..options.repeat.max(1) {
            let mut request =
                ActionRequest::new(options.box_ref.clone(), options.device.clone(), payload.clone());
            if let Some(action_id) = options.action_id {
                request = request.with_action_id(action_id);
            }
            let report = dispatcher.execute(request).await;
            if !report.is_success() {
                failures += 1;
            }
            render_report(&report)?;
        }
        println!("connection status: {}", dispatcher.connection_status());
        Ok::<_, anyhow::Error>(failures)
    })?;

    if options.metrics {
        print!("{}", render_text(&registry)?);
    }
    if failures > 0 {
        return Err(anyhow!("{} of {} action(s) failed", failures, options.repeat.max(1)));
    }
    Ok(())
}

fn render_report(report: &CascadeReport) -> Result<()> {
    for attempt in &report.attempts {
        println!(
            "  {:<14} {:<13} {:>6}ms",
            attempt.kind.as_str(),
            attempt.verdict.label(),
            attempt.elapsed.as_millis()
        );
    }
    match &report.resolution {
        Resolution::Delivered { via, outcome } => println!(
            "action {} delivered via {}: {}",
            report.action_id,
            via,
            serde_json::to_string(outcome)?
        ),
        Resolution::Failed { error, outcome } => println!(
            "action {} failed ({}): {}",
            report.action_id,
            error,
            serde_json::to_string(outcome)?
        ),
    }
    Ok(())
}
