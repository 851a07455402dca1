//! Configuration
//!
//! A YAML document describing the routing tree, the receivers and the
//! cache/watch knobs. `validate` applies defaults, enforces the config
//! invariants and precompiles every rule pattern; nothing starts until
//! it passes.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ConfigError;
use crate::kube::WatcherConfig;
use crate::route::Route;
use crate::sinks::ReceiverConfig;

pub const DEFAULT_CACHE_SIZE: usize = 1024;
pub const DEFAULT_MAPPING_CACHE_SIZE: usize = DEFAULT_CACHE_SIZE / 4;

const DEFAULT_CACHE_TTL: &str = "12h";
const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

// Cluster client defaults.
const DEFAULT_KUBE_QPS: f32 = 5.0;
const DEFAULT_KUBE_BURST: u32 = 10;

const DEFAULT_MAX_EVENT_AGE_SECONDS: i64 = 5;

const METRICS_PREFIX_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9_:]*_$";

/// Top-level gateway configuration. Unknown keys are tolerated so
/// configs carrying sections handled elsewhere still parse.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub log_level: String,
    pub log_format: String,
    pub cluster_name: Option<String>,
    pub namespace: Option<String>,
    pub metrics_name_prefix: String,

    /// Deprecated alias for maxEventAgeSeconds.
    pub throttle_period: i64,

    /// Maximum age of events to process, compared against the event's
    /// series observation, last timestamp or event time.
    pub max_event_age_seconds: i64,

    pub cache_size: usize,
    pub mapping_cache_size: usize,
    pub kube_burst: u32,
    pub kube_qps: f32,

    /// How long involved-object metadata stays fresh, e.g. "12h".
    pub cache_ttl: String,

    /// Skip metadata lookups entirely and forward bare references.
    pub omit_lookup: bool,

    pub route: Route,
    pub receivers: Vec<ReceiverConfig>,

    #[serde(skip)]
    cache_ttl_duration: Duration,
}

impl Config {
    /// Read and parse a YAML config file. Validation is separate so the
    /// caller can initialize logging from the parsed values first.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Apply defaults, enforce invariants and precompile every rule
    /// pattern. Startup aborts on any error.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.set_defaults();
        self.validate_max_event_age()?;
        self.validate_metrics_name_prefix()?;
        self.validate_cache_ttl()?;
        self.validate_receivers()?;
        self.route.compile_patterns()?;
        Ok(())
    }

    fn set_defaults(&mut self) {
        if self.cache_size == 0 {
            self.cache_size = DEFAULT_CACHE_SIZE;
            debug!(cache_size = self.cache_size, "setting config.cacheSize (default)");
        }

        if self.mapping_cache_size > 0 {
            debug!(mapping_cache_size = self.mapping_cache_size, "setting config.mappingCacheSize from config");
        } else {
            self.mapping_cache_size = mapping_cache_size_fallback(
                std::env::var("MAPPING_CACHE_SIZE").ok().as_deref(),
                self.cache_size,
            );
        }

        if self.kube_burst == 0 {
            self.kube_burst = DEFAULT_KUBE_BURST;
            debug!(kube_burst = self.kube_burst, "setting config.kubeBurst (default)");
        }

        if self.kube_qps == 0.0 {
            self.kube_qps = DEFAULT_KUBE_QPS;
            debug!(kube_qps = self.kube_qps, "setting config.kubeQPS (default)");
        }

        if self.cache_ttl.is_empty() {
            self.cache_ttl = DEFAULT_CACHE_TTL.to_string();
            debug!(cache_ttl = %self.cache_ttl, "setting config.cacheTTL (default)");
        }
    }

    fn validate_max_event_age(&mut self) -> Result<(), ConfigError> {
        if self.throttle_period != 0 && self.max_event_age_seconds != 0 {
            return Err(ConfigError::BothAgeSettings);
        }

        if self.throttle_period != 0 {
            warn!("config.throttlePeriod is deprecated, consider using config.maxEventAgeSeconds instead");
            self.max_event_age_seconds = self.throttle_period;
        }

        if self.max_event_age_seconds == 0 {
            self.max_event_age_seconds = DEFAULT_MAX_EVENT_AGE_SECONDS;
        }
        info!(max_event_age_seconds = self.max_event_age_seconds, "config.maxEventAgeSeconds");
        Ok(())
    }

    fn validate_metrics_name_prefix(&self) -> Result<(), ConfigError> {
        if self.metrics_name_prefix.is_empty() {
            warn!("metrics name prefix is empty, setting config.metricsNamePrefix is recommended");
            return Ok(());
        }

        // https://prometheus.io/docs/concepts/data_model/#metric-names-and-labels
        let valid = Regex::new(METRICS_PREFIX_PATTERN)
            .map(|re| re.is_match(&self.metrics_name_prefix))
            .unwrap_or(false);
        if !valid {
            return Err(ConfigError::InvalidMetricsPrefix {
                prefix: self.metrics_name_prefix.clone(),
            });
        }
        info!(prefix = %self.metrics_name_prefix, "config.metricsNamePrefix");
        Ok(())
    }

    fn validate_cache_ttl(&mut self) -> Result<(), ConfigError> {
        let parsed = humantime::parse_duration(&self.cache_ttl).map_err(|source| {
            ConfigError::InvalidCacheTtl {
                value: self.cache_ttl.clone(),
                source,
            }
        })?;

        if parsed.is_zero() || parsed > MAX_CACHE_TTL {
            return Err(ConfigError::CacheTtlOutOfRange {
                value: self.cache_ttl.clone(),
            });
        }

        self.cache_ttl_duration = parsed;
        debug!(cache_ttl = ?parsed, "config.cacheTTL");
        Ok(())
    }

    /// Receiver names must be unique, and every receiver a match rule
    /// dispatches to must exist.
    fn validate_receivers(&self) -> Result<(), ConfigError> {
        let mut names = HashSet::new();
        for receiver in &self.receivers {
            if !names.insert(receiver.name.as_str()) {
                return Err(ConfigError::DuplicateReceiver {
                    name: receiver.name.clone(),
                });
            }
        }

        let mut missing = None;
        self.route.visit_match_rules(&mut |rule| {
            if missing.is_none() && !rule.receiver.is_empty() && !names.contains(rule.receiver.as_str()) {
                missing = Some(rule.receiver.clone());
            }
        });

        match missing {
            Some(receiver) => Err(ConfigError::UnknownReceiver { receiver }),
            None => Ok(()),
        }
    }

    /// The parsed cacheTTL. Populated by `validate`.
    pub fn cache_ttl_duration(&self) -> Duration {
        self.cache_ttl_duration
    }

    /// Watcher knobs derived from this (validated) config.
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            namespace: self.namespace.clone(),
            max_event_age_seconds: self.max_event_age_seconds,
            cache_size: self.cache_size,
            mapping_cache_size: self.mapping_cache_size,
            cache_ttl: self.cache_ttl_duration,
            kube_qps: self.kube_qps,
            kube_burst: self.kube_burst,
            omit_lookup: self.omit_lookup,
            cluster_name: self.cluster_name.clone(),
        }
    }
}

/// Resolve the mapping cache size when the config leaves it unset: a
/// positive MAPPING_CACHE_SIZE env value wins; anything else falls back
/// to max(256, cacheSize/4) with a warning for malformed values.
fn mapping_cache_size_fallback(env_value: Option<&str>, cache_size: usize) -> usize {
    if let Some(raw) = env_value {
        match raw.parse::<usize>() {
            Ok(parsed) if parsed > 0 => {
                debug!(mapping_cache_size = parsed, "using MAPPING_CACHE_SIZE from environment");
                return parsed;
            }
            _ => {
                warn!(value = %raw, "invalid MAPPING_CACHE_SIZE value; expected positive integer");
            }
        }
    }
    DEFAULT_MAPPING_CACHE_SIZE.max(cache_size / 4)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn validated(yaml: &str) -> Result<Config, ConfigError> {
        let mut config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_empty_config_gets_defaults() {
        let config = validated("{}").unwrap();
        assert_eq!(config.cache_size, 1024);
        assert_eq!(config.mapping_cache_size, 256);
        assert_eq!(config.kube_burst, 10);
        assert_eq!(config.kube_qps, 5.0);
        assert_eq!(config.max_event_age_seconds, 5);
        assert_eq!(config.cache_ttl, "12h");
        assert_eq!(config.cache_ttl_duration(), Duration::from_secs(12 * 60 * 60));
    }

    #[test]
    fn test_mapping_cache_scales_with_cache_size() {
        let config = validated("cacheSize: 4096").unwrap();
        assert_eq!(config.mapping_cache_size, 1024);
    }

    #[test]
    fn test_mapping_cache_size_fallback() {
        assert_eq!(mapping_cache_size_fallback(Some("512"), 1024), 512);
        assert_eq!(mapping_cache_size_fallback(Some("0"), 1024), 256);
        assert_eq!(mapping_cache_size_fallback(Some("-3"), 1024), 256);
        assert_eq!(mapping_cache_size_fallback(Some("lots"), 1024), 256);
        assert_eq!(mapping_cache_size_fallback(None, 1024), 256);
        assert_eq!(mapping_cache_size_fallback(None, 8192), 2048);
    }

    #[test]
    fn test_both_age_settings_rejected() {
        let err = validated("throttlePeriod: 10\nmaxEventAgeSeconds: 5").unwrap_err();
        assert!(matches!(err, ConfigError::BothAgeSettings));
    }

    #[test]
    fn test_throttle_period_promoted_with_deprecation() {
        let config = validated("throttlePeriod: 30").unwrap();
        assert_eq!(config.max_event_age_seconds, 30);
    }

    #[test]
    fn test_metrics_prefix_validation() {
        assert!(validated("metricsNamePrefix: test_").is_ok());
        assert!(validated("metricsNamePrefix: event_exporter_").is_ok());

        let err = validated("metricsNamePrefix: __reserved_").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMetricsPrefix { .. }));

        let err = validated("metricsNamePrefix: 13245_test_").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMetricsPrefix { .. }));

        // Missing trailing underscore
        assert!(validated("metricsNamePrefix: test").is_err());
    }

    #[test]
    fn test_cache_ttl_bounds() {
        assert!(validated("cacheTTL: 1h").is_ok());
        assert!(validated("cacheTTL: 30days").is_ok());

        let err = validated("cacheTTL: 31days").unwrap_err();
        assert!(matches!(err, ConfigError::CacheTtlOutOfRange { .. }));

        let err = validated("cacheTTL: 0s").unwrap_err();
        assert!(matches!(err, ConfigError::CacheTtlOutOfRange { .. }));

        let err = validated("cacheTTL: bogus").unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_invalid_regex_rejects_config() {
        let yaml = r#"
route:
  match:
    - apiVersion: "[invalid"
"#;
        let err = validated(yaml).unwrap_err();
        assert!(err.to_string().contains("regex"));
        assert!(err.to_string().contains("[invalid"));
    }

    #[test]
    fn test_nested_route_patterns_compiled() {
        let yaml = r#"
receivers:
  - name: dump
    stdout: {}
route:
  drop:
    - type: Normal
  routes:
    - match:
        - namespace: "kube-sys.+"
          receiver: dump
"#;
        let config = validated(yaml).unwrap();

        let mut all_compiled = true;
        config.route.visit_rules(&mut |rule| all_compiled &= rule.is_compiled());
        assert!(all_compiled);
    }

    #[test]
    fn test_duplicate_receiver_rejected() {
        let yaml = r#"
receivers:
  - name: dump
    stdout: {}
  - name: dump
    inMemory: {}
"#;
        let err = validated(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateReceiver { .. }));
    }

    #[test]
    fn test_unknown_receiver_rejected() {
        let yaml = r#"
receivers:
  - name: dump
    stdout: {}
route:
  routes:
    - match:
        - namespace: kube-system
          receiver: elastic
"#;
        let err = validated(yaml).unwrap_err();
        assert!(err.to_string().contains("elastic"));
    }

    #[test]
    fn test_full_config_shape() {
        let yaml = r#"
logLevel: debug
logFormat: json
clusterName: prod
namespace: ""
metricsNamePrefix: event_exporter_
maxEventAgeSeconds: 10
cacheSize: 2048
kubeQPS: 20.5
kubeBurst: 50
cacheTTL: 6h
omitLookup: false
leaderElection:
  enabled: false
route:
  drop:
    - type: Normal
  match:
    - receiver: alerts
  routes:
    - match:
        - namespace: kube-system
          receiver: dump
receivers:
  - name: alerts
    webhook:
      endpoint: "http://alerts.svc:3000/events"
      headers:
        X-Cluster: "{{ .clusterName }}"
  - name: dump
    file:
      path: /tmp/events.log
      layout:
        reason: "{{ .reason }}"
"#;
        let config = validated(yaml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.cluster_name.as_deref(), Some("prod"));
        assert_eq!(config.cache_size, 2048);
        assert_eq!(config.kube_qps, 20.5);
        assert_eq!(config.max_event_age_seconds, 10);
        assert_eq!(config.receivers.len(), 2);
        assert_eq!(config.route.match_.len(), 1);
        assert_eq!(config.route.routes.len(), 1);

        let wc = config.watcher_config();
        assert_eq!(wc.cache_size, 2048);
        assert_eq!(wc.cache_ttl, Duration::from_secs(6 * 60 * 60));
        assert_eq!(wc.cluster_name.as_deref(), Some("prod"));
    }
}
