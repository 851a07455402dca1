//! Error types for the gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Top-level error type for the gateway binary
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Kubernetes client error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Sink construction or delivery error
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// Metrics registration error
    #[error("metrics error: {0}")]
    Metrics(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to decode YAML
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Both the deprecated throttlePeriod and maxEventAgeSeconds are set
    #[error("cannot set both throttlePeriod (deprecated) and maxEventAgeSeconds")]
    BothAgeSettings,

    /// metricsNamePrefix does not satisfy the Prometheus naming rules
    #[error("metricsNamePrefix '{prefix}' must match ^[a-zA-Z][a-zA-Z0-9_:]*_$")]
    InvalidMetricsPrefix { prefix: String },

    /// cacheTTL could not be parsed as a duration
    #[error("invalid cacheTTL '{value}': {source}")]
    InvalidCacheTtl {
        value: String,
        #[source]
        source: humantime::DurationError,
    },

    /// cacheTTL out of the accepted range
    #[error("cacheTTL '{value}' must be positive and not exceed 30 days")]
    CacheTtlOutOfRange { value: String },

    /// A rule carries a regex that does not compile
    #[error("invalid regex pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Two receivers share a name
    #[error("duplicate receiver name '{name}'")]
    DuplicateReceiver { name: String },

    /// A match rule names a receiver that is not configured
    #[error("rule references unknown receiver '{receiver}'")]
    UnknownReceiver { receiver: String },
}

/// Errors raised by sinks while sending or constructing
#[derive(Error, Debug)]
pub enum SinkError {
    /// Sink construction failed
    #[error("initialization failed: {0}")]
    Init(String),

    /// Payload serialization or layout rendering failed
    #[error("serialization failed: {0}")]
    Serialize(String),

    /// The destination rejected the payload
    #[error("destination returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Connection-level failure
    #[error("connection error: {0}")]
    Connection(String),

    /// IO error (file sinks)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by the object metadata lookup path
#[derive(Error, Debug)]
pub enum LookupError {
    /// The involved object no longer exists
    #[error("object not found")]
    NotFound,

    /// Discovery could not resolve the kind to a resource
    #[error("discovery failed for {gvk}: {message}")]
    Discovery { gvk: String, message: String },

    /// Any other apiserver failure
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),
}

impl LookupError {
    /// True when the underlying condition is a 404 from the apiserver.
    pub fn is_not_found(&self) -> bool {
        match self {
            LookupError::NotFound => true,
            LookupError::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_names_pattern() {
        let err = ConfigError::Regex {
            pattern: "[invalid".to_string(),
            source: regex::Regex::new("[invalid").unwrap_err(),
        };
        assert!(err.to_string().contains("[invalid"));
        assert!(err.to_string().contains("regex"));
    }

    #[test]
    fn test_lookup_error_not_found() {
        assert!(LookupError::NotFound.is_not_found());
        let err = LookupError::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "pods \"missing\" not found".into(),
            reason: "NotFound".into(),
            code: 404,
        }));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_lookup_error_other_kube_error_is_not_not_found() {
        let err = LookupError::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".into(),
            message: "forbidden".into(),
            reason: "Forbidden".into(),
            code: 403,
        }));
        assert!(!err.is_not_found());
    }
}
