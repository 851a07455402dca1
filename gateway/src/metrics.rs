//! Prometheus metrics
//!
//! Every counter the pipeline reports lives in a `Store` owning its own
//! registry, so the name prefix is applied once at construction and
//! tests can build stores freely without colliding registrations.

use std::collections::HashMap;

use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

use crate::error::GatewayError;

/// All gateway metrics.
pub struct Store {
    registry: Registry,

    /// Events accepted into the pipeline
    pub events_sent: IntCounter,

    /// Events discarded for exceeding maxEventAgeSeconds
    pub events_discarded: IntCounter,

    /// Errors surfaced by the watch stream
    pub watch_errors: IntCounter,

    /// Per-send sink failures (errors, timeouts, panics)
    pub send_errors: IntCounter,

    /// Metadata lookups served from the cache
    pub read_cache_hits: IntCounter,

    /// Metadata lookups that went to the apiserver
    pub read_cache_misses: IntCounter,

    /// Kind-to-resource mappings served from the cache
    pub mapping_cache_hits: IntCounter,

    /// Kind-to-resource mappings resolved through discovery
    pub mapping_cache_misses: IntCounter,

    build_info: IntGauge,
}

fn counter(registry: &Registry, prefix: &str, name: &str, help: &str) -> Result<IntCounter, prometheus::Error> {
    let c = IntCounter::with_opts(Opts::new(format!("{prefix}{name}"), help))?;
    registry.register(Box::new(c.clone()))?;
    Ok(c)
}

impl Store {
    /// Build a store with every metric registered under `prefix`.
    pub fn new(prefix: &str) -> Result<Self, GatewayError> {
        let registry = Registry::new();

        let build_labels = HashMap::from([
            ("version".to_string(), env!("CARGO_PKG_VERSION").to_string()),
            (
                "revision".to_string(),
                option_env!("GIT_COMMIT").unwrap_or("unknown").to_string(),
            ),
            (
                "rustc".to_string(),
                option_env!("RUSTC_VERSION").unwrap_or("unknown").to_string(),
            ),
            ("os".to_string(), std::env::consts::OS.to_string()),
            ("arch".to_string(), std::env::consts::ARCH.to_string()),
        ]);

        let build = || -> Result<Store, prometheus::Error> {
            let build_info = IntGauge::with_opts(
                Opts::new(
                    format!("{prefix}build_info"),
                    "A metric with a constant '1' value labeled by the build's version, revision and toolchain",
                )
                .const_labels(build_labels.clone()),
            )?;
            registry.register(Box::new(build_info.clone()))?;
            build_info.set(1);

            Ok(Store {
                events_sent: counter(
                    &registry,
                    prefix,
                    "events_sent",
                    "The total number of events processed",
                )?,
                events_discarded: counter(
                    &registry,
                    prefix,
                    "events_discarded",
                    "The total number of events discarded for being older than maxEventAgeSeconds",
                )?,
                watch_errors: counter(
                    &registry,
                    prefix,
                    "watch_errors",
                    "The total number of errors received from the watch stream",
                )?,
                send_errors: counter(
                    &registry,
                    prefix,
                    "send_event_errors",
                    "The total number of send event errors",
                )?,
                read_cache_hits: counter(
                    &registry,
                    prefix,
                    "kube_api_read_cache_hits",
                    "The total number of object metadata lookups served from cache",
                )?,
                read_cache_misses: counter(
                    &registry,
                    prefix,
                    "kube_api_read_cache_misses",
                    "The total number of object metadata lookups served from kube-apiserver",
                )?,
                mapping_cache_hits: counter(
                    &registry,
                    prefix,
                    "kube_api_mapping_cache_hits",
                    "The total number of resource mapping lookups served from cache",
                )?,
                mapping_cache_misses: counter(
                    &registry,
                    prefix,
                    "kube_api_mapping_cache_misses",
                    "The total number of resource mapping lookups served from kube-apiserver",
                )?,
                build_info,
                registry: registry.clone(),
            })
        };

        build().map_err(|e| GatewayError::Metrics(e.to_string()))
    }

    /// Encode every registered metric in the Prometheus text format.
    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_ok() {
            String::from_utf8(buffer).unwrap_or_default()
        } else {
            String::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_store_applies_prefix() {
        let store = Store::new("event_exporter_").unwrap();
        store.events_sent.inc();
        store.send_errors.inc();

        let text = store.gather();
        assert!(text.contains("event_exporter_events_sent 1"));
        assert!(text.contains("event_exporter_send_event_errors 1"));
        assert!(text.contains("event_exporter_build_info"));
        assert!(text.contains("event_exporter_kube_api_read_cache_misses 0"));
    }

    #[test]
    fn test_empty_prefix() {
        let store = Store::new("").unwrap();
        store.events_discarded.inc();
        let text = store.gather();
        assert!(text.contains("events_discarded 1"));
        assert!(text.contains("watch_errors 0"));
    }

    #[test]
    fn test_independent_stores_do_not_collide() {
        let a = Store::new("a_").unwrap();
        let b = Store::new("a_").unwrap();
        a.events_sent.inc();
        assert!(b.gather().contains("a_events_sent 0"));
    }
}
