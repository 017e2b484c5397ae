//! ---
//! iot_section: "01-core-functionality"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Tracing bootstrap for the link service and its CLI."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use anyhow::Result;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::daily;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

/// Service specific filter directive, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "IOT_LINK_LOG";
const FALLBACK_DIRECTIVE: &str = "info";

static WRITER_GUARDS: OnceCell<(WorkerGuard, WorkerGuard)> = OnceCell::new();

/// Console output format. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Filter directive in precedence order: `IOT_LINK_LOG`, `RUST_LOG`, the
/// `[logging] filter` key, then `info`.
fn directive(lookup: impl Fn(&str) -> Option<String>, configured: Option<&str>) -> String {
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(&lookup)
        .chain(configured.map(str::to_owned))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| FALLBACK_DIRECTIVE.to_owned())
}

/// Install the global subscriber: console logs on stderr, JSON lines in a
/// daily file `<directory>/<prefix>.log`.
///
/// Stdout stays free for command output. Calling this again after a
/// subscriber is installed only re-creates the log directory.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory)?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);

    let wanted = directive(|key| std::env::var(key).ok(), config.filter.as_deref());
    let (filter, rejected) = match EnvFilter::try_new(&wanted) {
        Ok(filter) => (filter, None),
        Err(err) => (EnvFilter::new(FALLBACK_DIRECTIVE), Some(err)),
    };

    let (file_writer, file_guard) =
        tracing_appender::non_blocking(daily(&config.directory, format!("{prefix}.log")));
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stderr());

    let console = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_writer(console_writer);
    let console = match config.format {
        LogFormat::StructuredJson => console.with_target(false).json().boxed(),
        LogFormat::Pretty => console.with_target(true).boxed(),
    };
    let file = fmt::layer()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .json()
        .with_writer(file_writer)
        .boxed();

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .is_ok();
    if !installed {
        return Ok(());
    }
    let _ = WRITER_GUARDS.set((file_guard, console_guard));

    if let Some(err) = rejected {
        warn!(directive = %wanted, error = %err, "invalid log filter; using {FALLBACK_DIRECTIVE}");
    }
    info!(service = service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn service_variable_wins_over_rust_log_and_config() {
        let lookup = env(&[(LOG_ENV, "debug"), ("RUST_LOG", "warn")]);
        assert_eq!(directive(lookup, Some("error")), "debug");
    }

    #[test]
    fn blank_variables_fall_through_to_config_then_info() {
        let configured = Some("iot_link_cascade=trace");
        assert_eq!(directive(env(&[(LOG_ENV, " ")]), configured), "iot_link_cascade=trace");
        assert_eq!(directive(env(&[]), None), "info");
    }

    #[test]
    fn init_creates_log_directory_and_tolerates_reinit() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoggingConfig {
            directory: dir.path().join("logs"),
            format: LogFormat::Pretty,
            file_prefix: Some("unit".into()),
            filter: Some("not a [valid directive".into()),
        };
        init_tracing("iot-link-test", &config).unwrap();
        assert!(config.directory.is_dir());
        init_tracing("iot-link-test", &config).unwrap();
    }

    #[test]
    fn log_format_uses_kebab_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            format: LogFormat,
        }
        let parsed: Wrapper = toml::from_str("format = \"structured-json\"").unwrap();
        assert_eq!(parsed.format, LogFormat::StructuredJson);
    }
}
