//! Stdout sink
//!
//! Writes one JSON line per event. Useful for development and for
//! piping into log shippers that tail container output.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use serde_json::Value;

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::sinks::{serialize_event, Sink};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StdoutConfig {
    #[serde(default)]
    pub layout: Option<Value>,
}

pub struct StdoutSink {
    cfg: StdoutConfig,
    written: AtomicU64,
}

impl StdoutSink {
    pub fn new(cfg: StdoutConfig) -> Self {
        Self {
            cfg,
            written: AtomicU64::new(0),
        }
    }

    /// Total events written (used by tests and shutdown logging).
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }
}

#[async_trait::async_trait]
impl Sink for StdoutSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let mut line = serialize_event(self.cfg.layout.as_ref(), event)?;
        line.push(b'\n');

        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&line)?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
