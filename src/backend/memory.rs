use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

use super::traits::{BackendError, EventBackend};
use crate::event::{EndpointId, StoredEvent};
use crate::tree::BucketDigest;

/// In-process reference backend.
///
/// Events and digests live in per-endpoint ordered maps inside a concurrent
/// endpoint map; `load_events` therefore returns a deterministic (id-sorted)
/// snapshot, which keeps hydration reproducible in tests.
pub struct InMemoryBackend {
    events: DashMap<EndpointId, BTreeMap<String, StoredEvent>>,
    digests: DashMap<EndpointId, BTreeMap<String, BucketDigest>>,
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
            digests: DashMap::new(),
        }
    }

    /// Number of events held for an endpoint.
    #[must_use]
    pub fn event_count(&self, endpoint: EndpointId) -> usize {
        self.events.get(&endpoint).map_or(0, |set| set.len())
    }

    /// Drop all state for every endpoint.
    pub fn clear(&self) {
        self.events.clear();
        self.digests.clear();
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBackend for InMemoryBackend {
    async fn put_event(
        &self,
        endpoint: EndpointId,
        event: &StoredEvent,
    ) -> Result<(), BackendError> {
        self.events
            .entry(endpoint)
            .or_default()
            .insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn delete_event(&self, endpoint: EndpointId, id: &str) -> Result<(), BackendError> {
        if let Some(mut set) = self.events.get_mut(&endpoint) {
            set.remove(id);
        }
        Ok(())
    }

    async fn load_events(&self, endpoint: EndpointId) -> Result<Vec<StoredEvent>, BackendError> {
        Ok(self
            .events
            .get(&endpoint)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn put_digests(
        &self,
        endpoint: EndpointId,
        digests: &[BucketDigest],
    ) -> Result<(), BackendError> {
        let mut set = self.digests.entry(endpoint).or_default();
        for digest in digests {
            set.insert(digest.path.clone(), digest.clone());
        }
        Ok(())
    }

    async fn load_digests(&self, endpoint: EndpointId) -> Result<Vec<BucketDigest>, BackendError> {
        Ok(self
            .digests
            .get(&endpoint)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default())
    }
}
