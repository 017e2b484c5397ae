//! ---
//! iot_section: "04-cascade"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Transport cascade, failure memory and connection status."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::time::Duration;

use anyhow::Result;
use iot_link_common::config::ModePreference;
use iot_link_metrics::{latency_buckets, SharedRegistry};
use iot_link_transport::TransportKind;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

use crate::report::AttemptVerdict;
use crate::status::ConnectionStatus;

/// Metrics published by the cascade dispatcher.
#[derive(Clone)]
pub struct CascadeMetrics {
    registry: SharedRegistry,
    attempts_total: IntCounterVec,
    resolutions_total: IntCounterVec,
    duration_seconds: Histogram,
    mode_toggles_total: IntCounterVec,
}

impl CascadeMetrics {
    /// Register the cascade metric family against the provided registry.
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let attempts_total = IntCounterVec::new(
            Opts::new(
                "iot_link_cascade_attempts_total",
                "Cascade stages by transport and verdict",
            ),
            &["transport", "verdict"],
        )?;
        registry.register(Box::new(attempts_total.clone()))?;

        let resolutions_total = IntCounterVec::new(
            Opts::new(
                "iot_link_cascade_resolutions_total",
                "Cascade runs by resulting connection status",
            ),
            &["status"],
        )?;
        registry.register(Box::new(resolutions_total.clone()))?;

        let duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "iot_link_cascade_duration_seconds",
                "Wall time from target resolution to the final verdict of a cascade run",
            )
            .buckets(latency_buckets()?),
        )?;
        registry.register(Box::new(duration_seconds.clone()))?;

        let mode_toggles_total = IntCounterVec::new(
            Opts::new(
                "iot_link_mode_toggles_total",
                "Manual transport mode toggles by resulting preference",
            ),
            &["preference"],
        )?;
        registry.register(Box::new(mode_toggles_total.clone()))?;

        Ok(Self {
            registry,
            attempts_total,
            resolutions_total,
            duration_seconds,
            mode_toggles_total,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_attempt(&self, kind: TransportKind, verdict: &AttemptVerdict) {
        self.attempts_total
            .with_label_values(&[kind.as_str(), verdict.label()])
            .inc();
    }

    pub fn record_resolution(&self, status: ConnectionStatus, elapsed: Duration) {
        self.resolutions_total
            .with_label_values(&[status.as_str()])
            .inc();
        self.duration_seconds.observe(elapsed.as_secs_f64());
    }

    pub fn record_toggle(&self, preference: ModePreference) {
        self.mode_toggles_total
            .with_label_values(&[preference.as_str()])
            .inc();
    }
}

impl std::fmt::Debug for CascadeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CascadeMetrics").finish_non_exhaustive()
    }
}
