//! HTTP webhook sink
//!
//! POSTs each event as JSON to a configured endpoint. Header values may
//! themselves be templates rendered against the event; a value that
//! fails to render is sent literally.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::layout::render_template;
use crate::sinks::{serialize_event, Sink};

const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookConfig {
    pub endpoint: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub layout: Option<Value>,
}

/// Generic HTTP webhook sink.
pub struct WebhookSink {
    cfg: WebhookConfig,
    client: Client,
}

impl WebhookSink {
    pub fn new(cfg: WebhookConfig) -> Result<Self, SinkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .build()
            .map_err(|e| SinkError::Init(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { cfg, client })
    }
}

#[async_trait::async_trait]
impl Sink for WebhookSink {
    async fn send(&self, event: &EnhancedEvent) -> Result<(), SinkError> {
        let body = serialize_event(self.cfg.layout.as_ref(), event)?;

        let mut request = self
            .client
            .post(&self.cfg.endpoint)
            .header("Content-Type", "application/json")
            .body(body);

        if !self.cfg.headers.is_empty() {
            let context = event.to_json();
            for (name, value) in &self.cfg.headers {
                match render_template(value, &context) {
                    Ok(rendered) => request = request.header(name, rendered),
                    Err(e) => {
                        debug!(header = %name, error = %e, "header template failed, sending literal value");
                        request = request.header(name, value);
                    }
                }
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| SinkError::Connection(format!("failed to reach {}: {e}", self.cfg.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(endpoint = %self.cfg.endpoint, status = %status, "webhook delivered");
        Ok(())
    }
}
