//! Enhanced event model
//!
//! The `EnhancedEvent` is the unit of work through routing and delivery:
//! a cluster event deep-copied out of the watch stream, joined with the
//! cached metadata of its involved object. Produced by the watcher,
//! consumed read-only by the route engine and the sinks.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{Event as CoreEvent, EventSeries, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use serde::Serialize;

/// Metadata of an involved object, as fetched from the apiserver.
///
/// `deleted` is set when the object carries a deletion timestamp, or by
/// the watcher when the lookup reported not-found.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    pub deleted: bool,
}

/// The event's involved object, joined with its cached metadata.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedObjectReference {
    #[serde(flatten)]
    pub reference: ObjectReference,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub owner_references: Vec<OwnerReference>,

    pub deleted: bool,
}

impl EnhancedObjectReference {
    /// Attach fetched metadata to the bare reference.
    pub fn enrich(&mut self, metadata: ObjectMetadata) {
        self.labels = metadata.labels;
        self.annotations = metadata.annotations;
        self.owner_references = metadata.owner_references;
        self.deleted = metadata.deleted;
    }
}

/// A cluster event enriched with involved-object metadata.
///
/// Field names serialize the way the apiserver spells them, so the
/// downstream payload reads like the original event plus the enriched
/// `involvedObject`. Managed fields are never carried.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedEvent {
    pub metadata: ObjectMeta,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    pub message: String,
    pub reason: String,

    #[serde(rename = "type")]
    pub type_: String,

    pub count: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_timestamp: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<Time>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_time: Option<k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<EventSeries>,

    pub source: EventSource,

    pub involved_object: EnhancedObjectReference,
}

impl EnhancedEvent {
    /// Deep-copy a raw event into an enhanced one.
    ///
    /// The watch stream owns its objects, so every field is cloned and
    /// `managedFields` is cleared before anything flows downstream. The
    /// involved object starts as a bare reference; the watcher enriches
    /// it afterwards.
    pub fn from_core(event: &CoreEvent, cluster_name: Option<String>) -> Self {
        let mut metadata = event.metadata.clone();
        metadata.managed_fields = None;

        Self {
            metadata,
            cluster_name,
            message: event.message.clone().unwrap_or_default(),
            reason: event.reason.clone().unwrap_or_default(),
            type_: event.type_.clone().unwrap_or_default(),
            count: event.count.unwrap_or_default(),
            first_timestamp: event.first_timestamp.clone(),
            last_timestamp: event.last_timestamp.clone(),
            event_time: event.event_time.clone(),
            series: event.series.clone(),
            source: event.source.clone().unwrap_or_default(),
            involved_object: EnhancedObjectReference {
                reference: event.involved_object.clone(),
                ..Default::default()
            },
        }
    }

    /// The event's own namespace (empty for cluster-scoped events).
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or("")
    }

    /// The event's UID, used by sinks that need a stable partition key.
    pub fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or("")
    }

    /// Canonical JSON encoding used by sinks when no layout is set.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// The timestamp an event is judged by: the series' last observation if
/// present, else the last occurrence, else the event time.
pub fn effective_timestamp(event: &CoreEvent) -> Option<DateTime<Utc>> {
    if let Some(series) = &event.series {
        if let Some(observed) = &series.last_observed_time {
            return Some(observed.0);
        }
    }
    if let Some(last) = &event.last_timestamp {
        return Some(last.0);
    }
    event.event_time.as_ref().map(|t| t.0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn core_event() -> CoreEvent {
        CoreEvent {
            metadata: ObjectMeta {
                name: Some("pod-event".into()),
                namespace: Some("default".into()),
                uid: Some("11111111-2222-3333-4444-555555555555".into()),
                ..Default::default()
            },
            message: Some("Back-off restarting failed container".into()),
            reason: Some("BackOff".into()),
            type_: Some("Warning".into()),
            count: Some(3),
            involved_object: ObjectReference {
                api_version: Some("v1".into()),
                kind: Some("Pod".into()),
                name: Some("web-0".into()),
                namespace: Some("default".into()),
                uid: Some("aaaa".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_from_core_copies_fields() {
        let ev = EnhancedEvent::from_core(&core_event(), Some("prod".into()));
        assert_eq!(ev.message, "Back-off restarting failed container");
        assert_eq!(ev.reason, "BackOff");
        assert_eq!(ev.type_, "Warning");
        assert_eq!(ev.count, 3);
        assert_eq!(ev.namespace(), "default");
        assert_eq!(ev.cluster_name.as_deref(), Some("prod"));
        assert_eq!(ev.involved_object.reference.kind.as_deref(), Some("Pod"));
        assert!(!ev.involved_object.deleted);
    }

    #[test]
    fn test_from_core_clears_managed_fields() {
        let mut raw = core_event();
        raw.metadata.managed_fields = Some(vec![Default::default()]);
        let ev = EnhancedEvent::from_core(&raw, None);
        assert!(ev.metadata.managed_fields.is_none());
    }

    #[test]
    fn test_effective_timestamp_prefers_series() {
        let mut raw = core_event();
        raw.last_timestamp = Some(Time(ts(100)));
        raw.series = Some(EventSeries {
            count: Some(5),
            last_observed_time: Some(MicroTime(ts(200))),
        });
        assert_eq!(effective_timestamp(&raw), Some(ts(200)));
    }

    #[test]
    fn test_effective_timestamp_falls_back_to_last_then_event_time() {
        let mut raw = core_event();
        raw.last_timestamp = Some(Time(ts(100)));
        raw.event_time = Some(MicroTime(ts(50)));
        assert_eq!(effective_timestamp(&raw), Some(ts(100)));

        raw.last_timestamp = None;
        assert_eq!(effective_timestamp(&raw), Some(ts(50)));

        raw.event_time = None;
        assert_eq!(effective_timestamp(&raw), None);
    }

    #[test]
    fn test_serializes_enriched_involved_object() {
        let mut ev = EnhancedEvent::from_core(&core_event(), None);
        ev.involved_object.enrich(ObjectMetadata {
            labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
            annotations: BTreeMap::new(),
            owner_references: Vec::new(),
            deleted: true,
        });

        let json = ev.to_json();
        assert_eq!(json["involvedObject"]["kind"], "Pod");
        assert_eq!(json["involvedObject"]["labels"]["app"], "web");
        assert_eq!(json["involvedObject"]["deleted"], true);
        assert_eq!(json["type"], "Warning");
        // managed fields never appear in the payload
        assert!(json["metadata"].get("managedFields").is_none());
    }
}
