//! # Version Store
//!
//! A Merkle-tree-backed version store for detecting divergence between two
//! independently-updated collections of versioned entities (an "upstream"
//! and a "downstream" replica of the same logical dataset) without
//! transferring or comparing every entity on every check.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Version Store                         │
//! │  • add_event / delete_event, upsert semantics              │
//! │  • one event set + two digest trees per endpoint           │
//! │  • implicit endpoint creation on first write               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Bucket Trees + Digest Cache                 │
//! │  • entity-id tree: fixed id-hash buckets, endpoint-        │
//! │    agnostic digests for comparison                         │
//! │  • user-defined tree: each event's attribute hierarchy     │
//! │  • dirty-bit invalidation leaf-to-root, lazy recompute     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Event Backend                           │
//! │  • durable upsert/delete/load per endpoint                 │
//! │  • optional digest persistence (rebuildable cache)         │
//! │  • retried with backoff; failures surfaced distinctly      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use version_store::{
//!     DatePartitionedEvent, InMemoryBackend, VersionStore, VersionStoreConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = VersionStore::new(
//!         VersionStoreConfig::default(),
//!         Arc::new(InMemoryBackend::new()),
//!     );
//!
//!     // Two endpoints receiving the same logical entity
//!     let event = DatePartitionedEvent::new("order-1", "a1b2c3", "transactionDate", Utc::now());
//!     store.add_event(1, &event).await.expect("add failed");
//!     store.add_event(2, &event).await.expect("add failed");
//!
//!     // Equal root digests prove the endpoints are in sync
//!     let up = store.entity_id_digests(1).await.expect("digest query failed");
//!     let down = store.entity_id_digests(2).await.expect("digest query failed");
//!     assert_eq!(up[""].digest, down[""].digest);
//!
//!     // And both comparators agree there is nothing to report
//!     let diffs = store.incremental_comparison(1, 2).await.expect("comparison failed");
//!     assert!(diffs.is_empty());
//! }
//! ```
//!
//! ## Comparison strategies
//!
//! - **Flat**: O(n) entity-by-entity scan; the correctness baseline.
//! - **Incremental**: descends the digest trees only where digests
//!   disagree; equal roots finish in O(1) regardless of entity count.
//!
//! Both always return the same set of differences.
//!
//! ## Modules
//!
//! - [`store`]: The [`VersionStore`] orchestrator and the comparators
//! - [`tree`]: Bucket tree, digest primitives, and the dirty-bit cache
//! - [`event`]: The [`PartitionedEvent`] capability and shipped variants
//! - [`backend`]: Durable store boundary and the in-memory implementation
//! - [`retry`]: Backoff policy for backend I/O
//! - [`metrics`]: Instrumentation helpers

pub mod backend;
pub mod config;
pub mod event;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod tree;

pub use backend::{BackendError, EventBackend, InMemoryBackend};
pub use config::VersionStoreConfig;
pub use event::{
    DatePartitionedEvent, EndpointId, PartitionedEvent, PrefixPartitionedEvent, StoredEvent,
};
pub use metrics::LatencyTimer;
pub use retry::RetryConfig;
pub use store::{EntityDifference, StoreError, VersionStore};
pub use tree::{BucketDigest, BucketTree, DigestCache};
