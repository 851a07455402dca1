//! Cluster-facing plumbing: the event watcher, the object metadata
//! cache in front of the apiserver, and their supporting structures.

pub mod cache;
pub mod ratelimit;
pub mod twoq;
pub mod watcher;

pub use cache::{KubeObjectFetcher, ObjectFetcher, ObjectMetadataCache};
pub use ratelimit::RateGate;
pub use twoq::TwoQueueCache;
pub use watcher::{EventHandler, EventWatcher, WatcherConfig, WatcherHandle};
