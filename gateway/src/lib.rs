//! kube-event-gateway
//!
//! Watches a Kubernetes cluster's Event stream and fans each qualifying
//! event out to configured receivers, after enriching it with cached
//! metadata about the involved object and walking a rule tree to decide
//! who sees it.
//!
//! ```text
//! Watcher ──► Metadata Cache ──► Route Tree ──► Registry ──► Sinks (fan-out)
//! ```
//!
//! The watcher, the per-send dispatch tasks and the metrics server each
//! run on their own tokio tasks; a single shutdown signal winds them
//! down in order.

#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::panic)]

pub mod config;
pub mod error;
pub mod event;
pub mod kube;
pub mod layout;
pub mod metrics;
pub mod metrics_server;
pub mod registry;
pub mod route;
pub mod rule;
pub mod sinks;

pub use crate::config::Config;
pub use crate::error::{ConfigError, GatewayError, LookupError, Result, SinkError};
pub use crate::event::{EnhancedEvent, EnhancedObjectReference, ObjectMetadata};
pub use crate::kube::{EventHandler, EventWatcher, ObjectMetadataCache, WatcherConfig, WatcherHandle};
pub use crate::metrics::Store;
pub use crate::metrics_server::MetricsServer;
pub use crate::registry::ReceiverRegistry;
pub use crate::route::{EventDispatch, Route};
pub use crate::rule::Rule;
pub use crate::sinks::{ReceiverConfig, Sink, SinkTypeConfig};
