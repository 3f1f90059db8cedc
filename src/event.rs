//! Partitioned event types.
//!
//! A [`PartitionedEvent`] is the unit the store versions: a stable id, an
//! opaque version token, and the capability to derive its own bucket path
//! from its attributes. The store never inspects attribute semantics - it
//! only consumes the ordered label sequence the event produces.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of one independently-updated collection of entities.
///
/// Endpoints are independent namespaces: entity ids are unique only within
/// an endpoint, and no ordering is implied across endpoints.
pub type EndpointId = u64;

/// Capability contract every event variant supplies to the store.
///
/// `bucket_path` must be a pure function of the event's attributes (same
/// attributes, same path) so re-deriving a path after reload is consistent,
/// and must produce at least one label.
pub trait PartitionedEvent: Send + Sync {
    /// Stable entity id, unique within an endpoint.
    fn id(&self) -> &str;

    /// Opaque version token; equal tokens mean "considered identical".
    fn version(&self) -> &str;

    /// Ordered bucket labels, root to leaf, derived from the attributes.
    fn bucket_path(&self) -> Vec<String>;
}

/// The persistence form of an event: what the backend stores and what the
/// in-memory event set holds.
///
/// `bucket_path` is captured at add time so relocation can remove the old
/// leaf without re-deriving the previous attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: String,
    pub version: String,
    pub bucket_path: Vec<String>,
}

/// Event partitioned by a timestamp attribute into year/month/day buckets.
#[derive(Debug, Clone)]
pub struct DatePartitionedEvent {
    id: String,
    version: String,
    attributes: BTreeMap<String, String>,
    date: DateTime<Utc>,
}

impl DatePartitionedEvent {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        attribute_name: &str,
        date: DateTime<Utc>,
    ) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(attribute_name.to_string(), date.to_rfc3339());
        Self {
            id: id.into(),
            version: version.into(),
            attributes,
            date,
        }
    }

    /// Replace the version token (e.g. after the entity's content changed).
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

impl PartitionedEvent for DatePartitionedEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn bucket_path(&self) -> Vec<String> {
        vec![
            self.date.format("%Y").to_string(),
            self.date.format("%m").to_string(),
            self.date.format("%d").to_string(),
        ]
    }
}

/// Event partitioned by a fixed-length prefix of a string attribute.
#[derive(Debug, Clone)]
pub struct PrefixPartitionedEvent {
    id: String,
    version: String,
    attributes: BTreeMap<String, String>,
    attribute_name: String,
    prefix_len: usize,
}

impl PrefixPartitionedEvent {
    pub fn new(
        id: impl Into<String>,
        version: impl Into<String>,
        attribute_name: &str,
        attribute_value: impl Into<String>,
        prefix_len: usize,
    ) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(attribute_name.to_string(), attribute_value.into());
        Self {
            id: id.into(),
            version: version.into(),
            attributes,
            attribute_name: attribute_name.to_string(),
            prefix_len,
        }
    }

    /// Replace the version token.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

impl PartitionedEvent for PrefixPartitionedEvent {
    fn id(&self) -> &str {
        &self.id
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn bucket_path(&self) -> Vec<String> {
        let value = self
            .attributes
            .get(&self.attribute_name)
            .map(String::as_str)
            .unwrap_or_default();
        vec![value.chars().take(self.prefix_len).collect()]
    }
}
