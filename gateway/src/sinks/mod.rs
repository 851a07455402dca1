//! Sinks
//!
//! A sink is the transport behind a receiver: it takes an enhanced
//! event and delivers it somewhere. The registry only sees the
//! send/close contract; everything transport-specific lives in the
//! individual modules.
//!
//! Sink configs decode as one tagged variant per kind, and
//! construction is centralized in [`SinkTypeConfig::build`], so adding
//! a sink kind is one enum arm plus one constructor.

pub mod file;
pub mod in_memory;
pub mod stdout;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::layout::render_layout;

pub use file::{FileConfig, FileSink};
pub use in_memory::{InMemoryConfig, InMemorySink};
pub use stdout::{StdoutConfig, StdoutSink};
pub use webhook::{WebhookConfig, WebhookSink};

/// The capability a receiver's transport exposes.
///
/// A send may block on I/O; the registry isolates it on its own task
/// with a deadline. Errors are counted and logged by the registry, not
/// retried - sinks that need retry own it themselves.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError>;

    /// Flush buffers and release transport resources.
    async fn close(&self) {}
}

/// Encode an event for delivery: through the receiver's layout when one
/// is configured, else the canonical JSON encoding.
pub fn serialize_event(layout: Option<&Value>, event: &EnhancedEvent) -> Result<Vec<u8>, SinkError> {
    let value = match layout {
        Some(layout) => render_layout(layout, event).map_err(|e| SinkError::Serialize(e.to_string()))?,
        None => event.to_json(),
    };
    serde_json::to_vec(&value).map_err(|e| SinkError::Serialize(e.to_string()))
}

/// One configured receiver: a unique name plus exactly one sink kind.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiverConfig {
    pub name: String,

    #[serde(flatten)]
    pub sink: SinkTypeConfig,
}

/// Tagged sink configuration, one variant per transport kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SinkTypeConfig {
    Webhook(WebhookConfig),
    Stdout(StdoutConfig),
    File(FileConfig),
    InMemory(InMemoryConfig),
}

impl SinkTypeConfig {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Webhook(_) => "webhook",
            Self::Stdout(_) => "stdout",
            Self::File(_) => "file",
            Self::InMemory(_) => "inMemory",
        }
    }

    /// Construct the sink for this config.
    pub fn build(&self) -> Result<Arc<dyn Sink>, SinkError> {
        match self {
            Self::Webhook(cfg) => Ok(Arc::new(WebhookSink::new(cfg.clone())?)),
            Self::Stdout(cfg) => Ok(Arc::new(StdoutSink::new(cfg.clone()))),
            Self::File(cfg) => Ok(Arc::new(FileSink::new(cfg.clone())?)),
            Self::InMemory(_) => Ok(Arc::new(InMemorySink::new())),
        }
    }
}
