//! ---
//! iot_section: "01-core-functionality"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Shared primitives and utilities for the core runtime."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
//! Core shared primitives for the IoT Link workspace.
//! This crate exposes configuration loading and logging bootstrap
//! utilities consumed across the workspace.

pub mod config;
pub mod logging;

pub use config::{
    AppConfig, BoxConfig, CascadeConfig, CooldownConfig, LoggingConfig, LongPollConfig,
    MetricsConfig, ModePreference, PeerLinkConfig, SocketStreamConfig, TransportsConfig,
};
pub use logging::{init_tracing, LogFormat};
