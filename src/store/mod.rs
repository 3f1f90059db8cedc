// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Version store orchestrator.
//!
//! The [`VersionStore`] owns one event set and two digest trees per
//! endpoint and ties the components together: event validation, backend
//! persistence with retry, bucket-tree maintenance, and dirty-cache
//! invalidation.
//!
//! # Per-endpoint state
//!
//! ```text
//! endpoint ── events      (id -> StoredEvent, authoritative in-memory set)
//!          ├─ entity tree (id-hash buckets; comparators + entity_id_digests)
//!          └─ user tree   (attribute buckets; user_defined_digests)
//! ```
//!
//! Endpoints are created implicitly on first write and are fully
//! independent: each lives behind its own lock, so writers feeding
//! different endpoints never contend. Within one endpoint, writes are
//! linearized by the write lock, and a digest query recomputes dirty nodes
//! under the same lock so it always observes a consistent snapshot.

mod compare;

pub use compare::EntityDifference;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::traits::{BackendError, EventBackend};
use crate::config::VersionStoreConfig;
use crate::event::{EndpointId, PartitionedEvent, StoredEvent};
use crate::metrics::{self, LatencyTimer};
use crate::retry::{retry, RetryConfig};
use crate::tree::bucket_tree::{
    empty_tree_digest, entity_bucket_path, join_path, PATH_SEPARATOR,
};
use crate::tree::{BucketDigest, BucketTree, DigestCache};

#[derive(Error, Debug)]
pub enum StoreError {
    /// The event failed validation; the store was not touched.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// The durable backend failed after retries; distinct from logic errors
    /// so callers can retry the whole operation.
    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),
}

/// Everything the store tracks for one endpoint.
#[derive(Default)]
struct EndpointState {
    /// Authoritative in-memory event set, id -> event.
    events: HashMap<String, StoredEvent>,
    /// Tree bucketed by id hash; identical `(id, version)` sets produce
    /// identical digests on every endpoint.
    entity_tree: BucketTree,
    entity_cache: DigestCache,
    /// Tree bucketed by each event's own attribute hierarchy.
    user_tree: BucketTree,
    user_cache: DigestCache,
}

impl EndpointState {
    fn upsert(&mut self, event: StoredEvent) {
        let leaf = self.entity_tree.insert_leaf(
            &entity_bucket_path(&event.id),
            &event.id,
            &event.version,
        );
        self.entity_cache.invalidate_leaf_path(&leaf);

        // Relocate in the user-defined tree if the attributes moved the event.
        if let Some(prev) = self.events.get(&event.id) {
            if prev.bucket_path != event.bucket_path {
                debug!(
                    id = %event.id,
                    from = %leaf_path(&prev.bucket_path, &event.id),
                    to = %leaf_path(&event.bucket_path, &event.id),
                    "Relocating event leaf"
                );
                let old_leaf = leaf_path(&prev.bucket_path, &event.id);
                let removal = self.user_tree.remove_leaf(&prev.bucket_path, &event.id);
                debug_assert!(removal.removed, "event set and user tree out of step");
                self.user_cache.invalidate_removed(&old_leaf, &removal.pruned);
            }
        }
        let leaf = self
            .user_tree
            .insert_leaf(&event.bucket_path, &event.id, &event.version);
        self.user_cache.invalidate_leaf_path(&leaf);

        self.events.insert(event.id.clone(), event);
    }

    fn delete(&mut self, id: &str) -> bool {
        let Some(prev) = self.events.remove(id) else {
            return false;
        };

        let entity_path = entity_bucket_path(id);
        let removal = self.entity_tree.remove_leaf(&entity_path, id);
        debug_assert!(removal.removed, "event set and entity tree out of step");
        self.entity_cache
            .invalidate_removed(&leaf_path(&entity_path, id), &removal.pruned);

        let removal = self.user_tree.remove_leaf(&prev.bucket_path, id);
        debug_assert!(removal.removed, "event set and user tree out of step");
        self.user_cache
            .invalidate_removed(&leaf_path(&prev.bucket_path, id), &removal.pruned);

        true
    }
}

/// Full path of a leaf: its bucket path plus the id as terminal label.
fn leaf_path(bucket_path: &[String], id: &str) -> String {
    let mut path = String::new();
    for label in bucket_path {
        path = join_path(&path, label);
    }
    join_path(&path, id)
}

/// Merkle-tree-backed version store.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use chrono::Utc;
/// use version_store::{
///     DatePartitionedEvent, InMemoryBackend, VersionStore, VersionStoreConfig,
/// };
///
/// # #[tokio::main]
/// # async fn main() {
/// let store = VersionStore::new(
///     VersionStoreConfig::default(),
///     Arc::new(InMemoryBackend::new()),
/// );
///
/// let event = DatePartitionedEvent::new("order-1", "v1", "transactionDate", Utc::now());
/// store.add_event(1, &event).await.expect("add failed");
///
/// let digests = store.entity_id_digests(1).await.expect("digest query failed");
/// println!("root digest: {}", digests[""].digest);
/// # }
/// ```
pub struct VersionStore {
    config: VersionStoreConfig,
    backend: Arc<dyn EventBackend>,
    endpoints: DashMap<EndpointId, Arc<RwLock<EndpointState>>>,
}

impl VersionStore {
    /// Create a store over the given backend.
    pub fn new(config: VersionStoreConfig, backend: Arc<dyn EventBackend>) -> Self {
        Self {
            config,
            backend,
            endpoints: DashMap::new(),
        }
    }

    /// Convenience constructor: default config over an in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(
            VersionStoreConfig::default(),
            Arc::new(crate::backend::memory::InMemoryBackend::new()),
        )
    }

    /// Add or replace an event on an endpoint.
    ///
    /// Acts as an upsert: an existing event with the same id is replaced,
    /// relocating its leaf if the attributes changed its bucket path.
    #[instrument(skip(self, event), fields(id = %event.id()))]
    pub async fn add_event(
        &self,
        endpoint: EndpointId,
        event: &dyn PartitionedEvent,
    ) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("add_event");

        let stored = match self.validate(event) {
            Ok(stored) => stored,
            Err(err) => {
                metrics::record_operation("add_event", "invalid");
                return Err(err);
            }
        };

        let retry_config = self.retry_config();
        if let Err(err) = retry("put_event", &retry_config, || {
            self.backend.put_event(endpoint, &stored)
        })
        .await
        {
            metrics::record_operation("add_event", "backend_error");
            metrics::record_backend_error("put_event");
            return Err(err.into());
        }

        let state = self.endpoint(endpoint);
        let count = {
            let mut state = state.write();
            state.upsert(stored);
            state.events.len()
        };
        metrics::set_endpoint_events(endpoint, count);
        metrics::record_operation("add_event", "success");
        Ok(())
    }

    /// Delete an event if present. Deleting an absent event (or from an
    /// unknown endpoint) is a no-op, not an error.
    #[instrument(skip(self))]
    pub async fn delete_event(&self, endpoint: EndpointId, id: &str) -> Result<(), StoreError> {
        let _timer = LatencyTimer::new("delete_event");

        let retry_config = self.retry_config();
        if let Err(err) = retry("delete_event", &retry_config, || {
            self.backend.delete_event(endpoint, id)
        })
        .await
        {
            metrics::record_operation("delete_event", "backend_error");
            metrics::record_backend_error("delete_event");
            return Err(err.into());
        }

        if let Some(state) = self.lookup(endpoint) {
            let (removed, count) = {
                let mut state = state.write();
                (state.delete(id), state.events.len())
            };
            if removed {
                debug!(endpoint, id, "Deleted event");
            }
            metrics::set_endpoint_events(endpoint, count);
        }
        metrics::record_operation("delete_event", "success");
        Ok(())
    }

    /// Digest of every node in the endpoint's entity-id tree, root (`""`)
    /// included, keyed by path.
    ///
    /// Recomputes only nodes dirtied since the last query, children before
    /// parents. An unknown endpoint yields just the fixed empty-tree root
    /// digest.
    #[instrument(skip(self))]
    pub async fn entity_id_digests(
        &self,
        endpoint: EndpointId,
    ) -> Result<BTreeMap<String, BucketDigest>, StoreError> {
        let _timer = LatencyTimer::new("digests");

        let Some(state) = self.lookup(endpoint) else {
            return Ok(Self::empty_digest_map());
        };
        let (digests, recomputed) = {
            let mut state = state.write();
            let state = &mut *state;
            let outcome = state.entity_cache.refresh(&state.entity_tree);
            (outcome.digests, outcome.recomputed)
        };
        metrics::record_digest_recompute("entity_id", recomputed);
        debug!(endpoint, recomputed, nodes = digests.len(), "Refreshed entity-id digests");

        self.persist_digests_best_effort(endpoint, &digests, recomputed)
            .await;
        Ok(digests)
    }

    /// Digest of every node in the endpoint's user-defined (attribute) tree.
    ///
    /// Unlike [`entity_id_digests`](Self::entity_id_digests), this view
    /// follows each event's own hierarchy, so it only agrees across
    /// endpoints that partition the same way.
    #[instrument(skip(self))]
    pub async fn user_defined_digests(
        &self,
        endpoint: EndpointId,
    ) -> Result<BTreeMap<String, BucketDigest>, StoreError> {
        let _timer = LatencyTimer::new("digests");

        let Some(state) = self.lookup(endpoint) else {
            return Ok(Self::empty_digest_map());
        };
        let (digests, recomputed) = {
            let mut state = state.write();
            let state = &mut *state;
            let outcome = state.user_cache.refresh(&state.user_tree);
            (outcome.digests, outcome.recomputed)
        };
        metrics::record_digest_recompute("user_defined", recomputed);
        Ok(digests)
    }

    /// Rebuild an endpoint's state from the backend's event set.
    ///
    /// Replaces any in-memory state for the endpoint wholesale; the digest
    /// caches start cold and rebuild on the next query. A failed load leaves
    /// existing state untouched, so a retry re-attempts the same work.
    #[instrument(skip(self))]
    pub async fn hydrate(&self, endpoint: EndpointId) -> Result<usize, StoreError> {
        let events = retry("load_events", &self.retry_config(), || {
            self.backend.load_events(endpoint)
        })
        .await
        .map_err(|err| {
            metrics::record_backend_error("load_events");
            StoreError::from(err)
        })?;

        let mut state = EndpointState::default();
        for stored in events {
            self.validate_stored(&stored)?;
            state.upsert(stored);
        }
        let count = state.events.len();
        self.endpoints
            .insert(endpoint, Arc::new(RwLock::new(state)));

        metrics::set_endpoint_events(endpoint, count);
        info!(endpoint, events = count, "Hydrated endpoint from backend");
        Ok(count)
    }

    /// Number of events currently held for an endpoint.
    #[must_use]
    pub fn event_count(&self, endpoint: EndpointId) -> usize {
        self.lookup(endpoint)
            .map_or(0, |state| state.read().events.len())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn endpoint(&self, endpoint: EndpointId) -> Arc<RwLock<EndpointState>> {
        self.endpoints.entry(endpoint).or_default().value().clone()
    }

    fn lookup(&self, endpoint: EndpointId) -> Option<Arc<RwLock<EndpointState>>> {
        self.endpoints
            .get(&endpoint)
            .map(|entry| Arc::clone(entry.value()))
    }

    fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(self.config.retry_initial_ms),
            max_delay: Duration::from_millis(self.config.retry_max_ms),
            factor: 2.0,
            max_retries: Some(self.config.backend_retries),
        }
    }

    fn validate(&self, event: &dyn PartitionedEvent) -> Result<StoredEvent, StoreError> {
        let stored = StoredEvent {
            id: event.id().to_string(),
            version: event.version().to_string(),
            bucket_path: event.bucket_path(),
        };
        self.validate_stored(&stored)?;
        Ok(stored)
    }

    fn validate_stored(&self, event: &StoredEvent) -> Result<(), StoreError> {
        if event.id.is_empty() {
            return Err(StoreError::InvalidEvent("empty id".to_string()));
        }
        if event.id.contains(PATH_SEPARATOR) {
            return Err(StoreError::InvalidEvent(format!(
                "id {:?} contains the path separator {:?}",
                event.id, PATH_SEPARATOR
            )));
        }
        if event.version.is_empty() {
            return Err(StoreError::InvalidEvent("empty version".to_string()));
        }
        if event.bucket_path.is_empty() {
            return Err(StoreError::InvalidEvent("empty bucket path".to_string()));
        }
        if event.bucket_path.len() > self.config.max_bucket_depth {
            return Err(StoreError::InvalidEvent(format!(
                "bucket path depth {} exceeds limit {}",
                event.bucket_path.len(),
                self.config.max_bucket_depth
            )));
        }
        for label in &event.bucket_path {
            if label.is_empty() {
                return Err(StoreError::InvalidEvent("empty bucket label".to_string()));
            }
            if label.contains(PATH_SEPARATOR) {
                return Err(StoreError::InvalidEvent(format!(
                    "bucket label {:?} contains the path separator {:?}",
                    label, PATH_SEPARATOR
                )));
            }
        }
        Ok(())
    }

    fn empty_digest_map() -> BTreeMap<String, BucketDigest> {
        let mut digests = BTreeMap::new();
        digests.insert(
            String::new(),
            BucketDigest::new(String::new(), empty_tree_digest()),
        );
        digests
    }

    /// Persist refreshed digests when configured; failures are logged, not
    /// surfaced, since persisted digests are rebuildable from the event set.
    async fn persist_digests_best_effort(
        &self,
        endpoint: EndpointId,
        digests: &BTreeMap<String, BucketDigest>,
        recomputed: usize,
    ) {
        if !self.config.persist_digests || recomputed == 0 {
            return;
        }
        let flat: Vec<BucketDigest> = digests.values().cloned().collect();
        if let Err(err) = self.backend.put_digests(endpoint, &flat).await {
            warn!(endpoint, error = %err, "Failed to persist digest entries");
        }
    }
}
