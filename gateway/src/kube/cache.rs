//! Object metadata cache
//!
//! Sits in front of the apiserver and turns an involved-object
//! reference into its labels, annotations and owner references without
//! stampeding the cluster. The primary cache is keyed by UID alone -
//! the resource version changes on every mutation and would defeat
//! caching - with TTL governing freshness. A secondary cache remembers
//! kind-to-resource mappings resolved through discovery.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::api::{Api, DynamicObject};
use kube::core::GroupVersionKind;
use kube::discovery::{oneshot, ApiResource, Scope};
use kube::Client;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::LookupError;
use crate::event::ObjectMetadata;
use crate::kube::ratelimit::RateGate;
use crate::kube::twoq::TwoQueueCache;
use crate::metrics::Store;

/// Fetch seam behind the cache. The production implementation talks to
/// the apiserver; tests count calls.
#[async_trait]
pub trait ObjectFetcher: Send + Sync {
    async fn fetch(&self, reference: &ObjectReference) -> Result<ObjectMetadata, LookupError>;
}

#[derive(Clone)]
struct CachedMetadata {
    fetched_at: Instant,
    metadata: ObjectMetadata,
}

/// UID-keyed TTL cache of involved-object metadata.
pub struct ObjectMetadataCache {
    cache: Mutex<TwoQueueCache<String, CachedMetadata>>,
    ttl: Duration,
    fetcher: Arc<dyn ObjectFetcher>,
    metrics: Arc<Store>,
}

impl ObjectMetadataCache {
    pub fn new(size: usize, ttl: Duration, fetcher: Arc<dyn ObjectFetcher>, metrics: Arc<Store>) -> Self {
        Self {
            cache: Mutex::new(TwoQueueCache::new(size)),
            ttl,
            fetcher,
            metrics,
        }
    }

    /// Return cached metadata when fresh, otherwise fetch and cache.
    ///
    /// Not-found is surfaced without caching so the caller can mark the
    /// involved object deleted; the next event about the same UID will
    /// retry.
    pub async fn lookup(&self, reference: &ObjectReference) -> Result<ObjectMetadata, LookupError> {
        let key = reference.uid.clone().unwrap_or_default();

        {
            let mut cache = self.cache.lock();
            if let Some(entry) = cache.get(&key) {
                if entry.fetched_at.elapsed() < self.ttl {
                    self.metrics.read_cache_hits.inc();
                    return Ok(entry.metadata);
                }
                cache.remove(&key);
            }
        }

        let metadata = self.fetcher.fetch(reference).await?;
        self.cache.lock().add(
            key,
            CachedMetadata {
                fetched_at: Instant::now(),
                metadata: metadata.clone(),
            },
        );
        Ok(metadata)
    }
}

/// Split an apiVersion into (group, version). A single token is the
/// core group: empty group, that token as version.
pub(crate) fn split_api_version(api_version: &str) -> (&str, &str) {
    match api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", api_version),
    }
}

/// Fetcher backed by the dynamic API, with a mapping cache over
/// discovery and a rate gate on everything that goes to the wire.
pub struct KubeObjectFetcher {
    client: Client,
    mapping_cache: Mutex<TwoQueueCache<String, (ApiResource, bool)>>,
    gate: RateGate,
    metrics: Arc<Store>,
}

impl KubeObjectFetcher {
    pub fn new(client: Client, mapping_cache_size: usize, qps: f32, burst: u32, metrics: Arc<Store>) -> Self {
        Self {
            client,
            mapping_cache: Mutex::new(TwoQueueCache::new(mapping_cache_size)),
            gate: RateGate::new(qps, burst),
            metrics,
        }
    }

    async fn resolve_resource(&self, reference: &ObjectReference) -> Result<(ApiResource, bool), LookupError> {
        let api_version = reference.api_version.as_deref().unwrap_or("");
        let (group, version) = split_api_version(api_version);
        let kind = reference.kind.as_deref().unwrap_or("");
        let mapping_key = format!("{group}|{version}|{kind}");

        if let Some(mapped) = self.mapping_cache.lock().get(&mapping_key) {
            self.metrics.mapping_cache_hits.inc();
            debug!(key = %mapping_key, "mapping cache hit");
            return Ok(mapped);
        }

        // Discovery errors are not cached; the next event retries.
        self.gate.acquire().await;
        let gvk = GroupVersionKind::gvk(group, version, kind);
        let (resource, capabilities) =
            oneshot::pinned_kind(&self.client, &gvk)
                .await
                .map_err(|e| LookupError::Discovery {
                    gvk: format!("{group}/{version}/{kind}"),
                    message: e.to_string(),
                })?;
        self.metrics.mapping_cache_misses.inc();

        let namespaced = matches!(capabilities.scope, Scope::Namespaced);
        self.mapping_cache
            .lock()
            .add(mapping_key, (resource.clone(), namespaced));
        Ok((resource, namespaced))
    }
}

#[async_trait]
impl ObjectFetcher for KubeObjectFetcher {
    async fn fetch(&self, reference: &ObjectReference) -> Result<ObjectMetadata, LookupError> {
        let (resource, namespaced) = self.resolve_resource(reference).await?;

        let api: Api<DynamicObject> = if namespaced {
            match reference.namespace.as_deref() {
                Some(ns) if !ns.is_empty() => Api::namespaced_with(self.client.clone(), ns, &resource),
                _ => Api::all_with(self.client.clone(), &resource),
            }
        } else {
            Api::all_with(self.client.clone(), &resource)
        };

        let name = match reference.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => return Err(LookupError::NotFound),
        };

        self.gate.acquire().await;
        let result = api.get(name).await;
        self.metrics.read_cache_misses.inc();

        let item = result.map_err(|e| match &e {
            kube::Error::Api(resp) if resp.code == 404 => LookupError::NotFound,
            _ => LookupError::Kube(e),
        })?;

        Ok(ObjectMetadata {
            labels: item.metadata.labels.clone().unwrap_or_default(),
            annotations: item.metadata.annotations.clone().unwrap_or_default(),
            owner_references: item.metadata.owner_references.clone().unwrap_or_default(),
            deleted: item.metadata.deletion_timestamp.is_some(),
        })
    }
}
