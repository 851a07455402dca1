//! Event watcher
//!
//! Watches `v1.Event` objects (optionally scoped to one namespace) and
//! drives each added or updated event through the pipeline: age gate,
//! metadata enrichment, hand-off to the routing handler. Deletes are
//! ignored - an Event's deletion carries no export semantics.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Event as CoreEvent;
use kube::api::Api;
use kube::runtime::watcher::{self, Event as WatchEvent};
use kube::runtime::WatchStreamExt;
use kube::Client;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::event::{effective_timestamp, EnhancedEvent};
use crate::kube::cache::{KubeObjectFetcher, ObjectFetcher, ObjectMetadataCache};
use crate::metrics::Store;

/// Callback invoked with each enhanced event.
pub type EventHandler = Arc<dyn Fn(EnhancedEvent) + Send + Sync>;

/// Knobs for the watcher, taken from validated configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub namespace: Option<String>,
    pub max_event_age_seconds: i64,
    pub cache_size: usize,
    pub mapping_cache_size: usize,
    pub cache_ttl: Duration,
    pub kube_qps: f32,
    pub kube_burst: u32,
    pub omit_lookup: bool,
    pub cluster_name: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum AgeVerdict {
    Fresh,
    /// Historical event seen during the initial list; dropped quietly.
    DiscardSilent,
    /// Late event that arrived after startup; dropped with a warning.
    DiscardWarn,
}

fn age_verdict(
    timestamp: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    startup_at: DateTime<Utc>,
    max_age: chrono::Duration,
) -> AgeVerdict {
    let Some(timestamp) = timestamp else {
        return AgeVerdict::DiscardSilent;
    };
    if now - timestamp <= max_age {
        return AgeVerdict::Fresh;
    }
    if timestamp > startup_at {
        AgeVerdict::DiscardWarn
    } else {
        AgeVerdict::DiscardSilent
    }
}

/// The enrichment pipeline an observed event runs through. Split from
/// the watch loop so the logic is testable without a cluster.
pub struct EventPipeline {
    metadata_cache: ObjectMetadataCache,
    metrics: Arc<Store>,
    max_event_age: chrono::Duration,
    omit_lookup: bool,
    cluster_name: Option<String>,
    startup_at: DateTime<Utc>,
    handler: EventHandler,
}

impl EventPipeline {
    fn is_discarded(&self, event: &CoreEvent) -> bool {
        match age_verdict(
            effective_timestamp(event),
            Utc::now(),
            self.startup_at,
            self.max_event_age,
        ) {
            AgeVerdict::Fresh => false,
            AgeVerdict::DiscardSilent => true,
            AgeVerdict::DiscardWarn => {
                warn!(
                    namespace = event.metadata.namespace.as_deref().unwrap_or(""),
                    name = event.metadata.name.as_deref().unwrap_or(""),
                    "event discarded as being older than maxEventAgeSeconds"
                );
                self.metrics.events_discarded.inc();
                true
            }
        }
    }

    /// Run one raw event through the pipeline.
    pub async fn process(&self, event: &CoreEvent) {
        if self.is_discarded(event) {
            return;
        }

        debug!(
            message = event.message.as_deref().unwrap_or(""),
            namespace = event.metadata.namespace.as_deref().unwrap_or(""),
            reason = event.reason.as_deref().unwrap_or(""),
            involved_object = event.involved_object.name.as_deref().unwrap_or(""),
            "received event"
        );
        self.metrics.events_sent.inc();

        // The watch stream owns its objects; from_core deep-copies and
        // strips managed fields.
        let mut enhanced = EnhancedEvent::from_core(event, self.cluster_name.clone());

        if !self.omit_lookup {
            match self.metadata_cache.lookup(&event.involved_object).await {
                Ok(metadata) => enhanced.involved_object.enrich(metadata),
                Err(e) if e.is_not_found() => {
                    enhanced.involved_object.deleted = true;
                    error!(error = %e, "object not found, likely deleted");
                }
                Err(e) => {
                    error!(error = %e, "failed to get object metadata");
                }
            }
        }

        (self.handler)(enhanced);
    }
}

/// Watches the cluster's event stream and feeds the pipeline.
pub struct EventWatcher {
    client: Client,
    namespace: Option<String>,
    pipeline: EventPipeline,
    metrics: Arc<Store>,
}

impl EventWatcher {
    pub fn new(client: Client, config: WatcherConfig, metrics: Arc<Store>, handler: EventHandler) -> Self {
        let fetcher: Arc<dyn ObjectFetcher> = Arc::new(KubeObjectFetcher::new(
            client.clone(),
            config.mapping_cache_size,
            config.kube_qps,
            config.kube_burst,
            Arc::clone(&metrics),
        ));
        Self::with_fetcher(client, config, metrics, handler, fetcher)
    }

    /// Construction seam used by tests to stub the apiserver.
    pub fn with_fetcher(
        client: Client,
        config: WatcherConfig,
        metrics: Arc<Store>,
        handler: EventHandler,
        fetcher: Arc<dyn ObjectFetcher>,
    ) -> Self {
        let pipeline = EventPipeline {
            metadata_cache: ObjectMetadataCache::new(
                config.cache_size,
                config.cache_ttl,
                fetcher,
                Arc::clone(&metrics),
            ),
            metrics: Arc::clone(&metrics),
            max_event_age: chrono::Duration::seconds(config.max_event_age_seconds),
            omit_lookup: config.omit_lookup,
            cluster_name: config.cluster_name,
            startup_at: Utc::now(),
            handler,
        };

        Self {
            client,
            namespace: config.namespace,
            pipeline,
            metrics,
        }
    }

    /// Override the startup epoch (tests inject a fixed clock; the
    /// production instantiation reads wall-clock once at construction).
    pub fn with_startup_at(mut self, startup_at: DateTime<Utc>) -> Self {
        self.pipeline.startup_at = startup_at;
        self
    }

    /// Start watching on a background task.
    pub fn spawn(self) -> WatcherHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        WatcherHandle { stop: stop_tx, task }
    }

    async fn run(self, mut stop: oneshot::Receiver<()>) {
        let api: Api<CoreEvent> = match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => Api::namespaced(self.client.clone(), ns),
            _ => Api::all(self.client.clone()),
        };

        info!(namespace = ?self.namespace, "event watcher starting");

        // The watcher machinery owns restart and exponential backoff;
        // errors still surface through the stream so they can be counted.
        let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
        tokio::pin!(stream);

        loop {
            tokio::select! {
                _ = &mut stop => {
                    info!("event watcher stopping");
                    break;
                }
                item = stream.next() => match item {
                    Some(Ok(WatchEvent::Apply(event))) | Some(Ok(WatchEvent::InitApply(event))) => {
                        self.pipeline.process(&event).await;
                    }
                    // Deletes are ignored; Init/InitDone mark relist phases.
                    Some(Ok(WatchEvent::Delete(_)))
                    | Some(Ok(WatchEvent::Init))
                    | Some(Ok(WatchEvent::InitDone)) => {}
                    Some(Err(e)) => {
                        self.metrics.watch_errors.inc();
                        warn!(error = %e, "watch stream error");
                    }
                    None => {
                        warn!("watch stream ended");
                        break;
                    }
                }
            }
        }
    }
}

/// Handle for stopping a spawned watcher.
pub struct WatcherHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal the watcher to stop and wait for its task to exit.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.task.await;
    }
}
