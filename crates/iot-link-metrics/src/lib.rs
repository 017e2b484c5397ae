//! ---
//! iot_section: "03-observability"
//! iot_subsection: "module"
//! iot_type: "source"
//! iot_scope: "code"
//! iot_description: "Metrics collection and export utilities."
//! iot_version: "v0.0.0-prealpha"
//! iot_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use prometheus::{Registry, TextEncoder};

/// Shared registry type used across crates.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every metric family in the registry using the Prometheus text format.
pub fn render_text(registry: &Registry) -> Result<String> {
    let families = registry.gather();
    TextEncoder::new()
        .encode_to_string(&families)
        .context("failed to encode metrics")
}

/// Standard latency buckets (1ms doubling up to ~32s).
pub fn latency_buckets() -> Result<Vec<f64>> {
    prometheus::exponential_buckets(0.001, 2.0, 16).context("failed to construct histogram buckets")
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{IntCounter, Opts};

    #[test]
    fn render_includes_registered_counter() {
        let registry = new_registry();
        let counter = IntCounter::with_opts(Opts::new("iot_link_test_total", "demo")).unwrap();
        registry.register(Box::new(counter.clone())).unwrap();
        counter.inc();

        let body = render_text(&registry).unwrap();
        assert!(body.contains("iot_link_test_total 1"));
    }

    #[test]
    fn latency_buckets_are_increasing() {
        let buckets = latency_buckets().unwrap();
        assert_eq!(buckets.len(), 16);
        assert!(buckets.windows(2).all(|pair| pair[0] < pair[1]));
    }
}
