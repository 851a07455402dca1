//! Receiver registry
//!
//! Owns the named sink instances and dispatches events to them. The
//! map is populated before ingestion starts and read-only afterwards.
//! Every send runs on its own task with a deadline, so a slow, failing
//! or panicking sink never backs up event ingestion and never takes
//! the process down. Errors are counted and logged, not retried -
//! sinks own their retry policy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::error::SinkError;
use crate::event::EnhancedEvent;
use crate::metrics::Store;
use crate::route::EventDispatch;
use crate::sinks::{ReceiverConfig, Sink};

/// Default deadline for a single sink send.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on waiting for in-flight sends during shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ReceiverRegistry {
    sinks: HashMap<String, Arc<dyn Sink>>,
    metrics: Arc<Store>,
    send_timeout: Duration,
    in_flight: Arc<AtomicUsize>,
    drained: Arc<Notify>,
}

impl ReceiverRegistry {
    pub fn new(metrics: Arc<Store>) -> Self {
        Self {
            sinks: HashMap::new(),
            metrics,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            in_flight: Arc::new(AtomicUsize::new(0)),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Build every receiver from config. Construction is centralized so
    /// a bad receiver fails startup, not its first event.
    pub fn from_configs(configs: &[ReceiverConfig], metrics: Arc<Store>) -> Result<Self, SinkError> {
        let mut registry = Self::new(metrics);
        for config in configs {
            let sink = config.sink.build()?;
            info!(receiver = %config.name, kind = config.sink.type_name(), "registered receiver");
            registry.register(&config.name, sink);
        }
        Ok(registry)
    }

    /// Install a named sink. Names are unique; config validation
    /// rejects duplicates before this is reached.
    pub fn register(&mut self, name: &str, sink: Arc<dyn Sink>) {
        self.sinks.insert(name.to_string(), sink);
    }

    pub fn has_receiver(&self, name: &str) -> bool {
        self.sinks.contains_key(name)
    }

    pub fn receiver_count(&self) -> usize {
        self.sinks.len()
    }

    /// Override the per-send deadline.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Wait for in-flight dispatches to finish (bounded), then release
    /// every sink's transport resources.
    pub async fn close(&self) {
        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(
                    in_flight = self.in_flight.load(Ordering::SeqCst),
                    "timed out waiting for in-flight sends"
                );
                break;
            }
            let _ = tokio::time::timeout(Duration::from_millis(50), self.drained.notified()).await;
        }

        for (name, sink) in &self.sinks {
            sink.close().await;
            debug!(receiver = %name, "closed receiver");
        }
    }
}

impl EventDispatch for ReceiverRegistry {
    /// Hand the event to the named sink on an independent task. The
    /// caller returns immediately.
    fn send_event(&self, receiver: &str, event: &EnhancedEvent) {
        let Some(sink) = self.sinks.get(receiver) else {
            self.metrics.send_errors.inc();
            error!(receiver, "send requested for unknown receiver");
            return;
        };

        let sink = Arc::clone(sink);
        let event = event.clone();
        let receiver = receiver.to_string();
        let metrics = Arc::clone(&self.metrics);
        let in_flight = Arc::clone(&self.in_flight);
        let drained = Arc::clone(&self.drained);
        let timeout = self.send_timeout;

        in_flight.fetch_add(1, Ordering::SeqCst);
        tokio::spawn(async move {
            // The actual send runs on a nested task so a panicking sink
            // surfaces as a join error here instead of unwinding further.
            let attempt =
                tokio::spawn(async move { tokio::time::timeout(timeout, sink.send(&event)).await });

            match attempt.await {
                Ok(Ok(Ok(()))) => {
                    debug!(receiver = %receiver, "event delivered");
                }
                Ok(Ok(Err(e))) => {
                    metrics.send_errors.inc();
                    error!(receiver = %receiver, error = %e, "failed to send event");
                }
                Ok(Err(_)) => {
                    metrics.send_errors.inc();
                    error!(receiver = %receiver, timeout = ?timeout, "send timed out");
                }
                Err(join_err) => {
                    metrics.send_errors.inc();
                    if join_err.is_panic() {
                        error!(receiver = %receiver, "sink panicked during send");
                    } else {
                        error!(receiver = %receiver, "send task cancelled");
                    }
                }
            }

            if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
                drained.notify_waiters();
            }
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::sinks::InMemorySink;
    use async_trait::async_trait;

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        async fn send(&self, _event: &EnhancedEvent) -> Result<(), SinkError> {
            Err(SinkError::Connection("refused".into()))
        }
    }

    struct PanickingSink;

    #[async_trait]
    impl Sink for PanickingSink {
        async fn send(&self, _event: &EnhancedEvent) -> Result<(), SinkError> {
            panic!("sink exploded");
        }
    }

    struct SlowSink;

    #[async_trait]
    impl Sink for SlowSink {
        async fn send(&self, _event: &EnhancedEvent) -> Result<(), SinkError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn registry() -> ReceiverRegistry {
        ReceiverRegistry::new(Arc::new(Store::new("test_registry_").unwrap()))
    }

    #[tokio::test]
    async fn test_send_reaches_sink() {
        let mut reg = registry();
        let sink = Arc::new(InMemorySink::new());
        reg.register("mem", Arc::clone(&sink) as Arc<dyn Sink>);

        let mut ev = EnhancedEvent::default();
        ev.reason = "BackOff".into();
        reg.send_event("mem", &ev);
        reg.close().await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].reason, "BackOff");
        assert_eq!(reg.metrics.send_errors.get(), 0);
    }

    #[tokio::test]
    async fn test_unknown_receiver_counts_error() {
        let reg = registry();
        reg.send_event("nope", &EnhancedEvent::default());
        assert_eq!(reg.metrics.send_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_sink_error_counted_and_contained() {
        let mut reg = registry();
        reg.register("bad", Arc::new(FailingSink));
        let sink = Arc::new(InMemorySink::new());
        reg.register("good", Arc::clone(&sink) as Arc<dyn Sink>);

        let ev = EnhancedEvent::default();
        reg.send_event("bad", &ev);
        reg.send_event("good", &ev);
        reg.close().await;

        assert_eq!(reg.metrics.send_errors.get(), 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_sink_panic_does_not_crash() {
        let mut reg = registry();
        reg.register("boom", Arc::new(PanickingSink));

        reg.send_event("boom", &EnhancedEvent::default());
        reg.close().await;

        assert_eq!(reg.metrics.send_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_slow_sink_hits_deadline_without_blocking_caller() {
        let mut reg = registry();
        reg = reg.with_send_timeout(Duration::from_millis(50));
        reg.register("slow", Arc::new(SlowSink));

        let start = Instant::now();
        reg.send_event("slow", &EnhancedEvent::default());
        // The caller is not blocked by the sink's sleep.
        assert!(start.elapsed() < Duration::from_millis(20));

        reg.close().await;
        assert_eq!(reg.metrics.send_errors.get(), 1);
    }

    #[tokio::test]
    async fn test_from_configs_builds_receivers() {
        let yaml = r#"
- name: dump
  stdout: {}
- name: mem
  inMemory: {}
"#;
        let configs: Vec<ReceiverConfig> = serde_yaml::from_str(yaml).unwrap();
        let reg =
            ReceiverRegistry::from_configs(&configs, Arc::new(Store::new("test_from_cfg_").unwrap()))
                .unwrap();
        assert_eq!(reg.receiver_count(), 2);
        assert!(reg.has_receiver("dump"));
        assert!(reg.has_receiver("mem"));
        assert!(!reg.has_receiver("other"));
    }
}
