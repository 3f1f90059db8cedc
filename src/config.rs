//! Configuration for the version store.
//!
//! # Example
//!
//! ```
//! use version_store::VersionStoreConfig;
//!
//! // Minimal config (uses defaults)
//! let config = VersionStoreConfig::default();
//! assert_eq!(config.max_bucket_depth, 16);
//! assert!(!config.persist_digests);
//!
//! // Full config
//! let config = VersionStoreConfig {
//!     persist_digests: true,
//!     backend_retries: 5,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

/// Configuration for the version store.
///
/// All fields have sensible defaults; a default-constructed config gives a
/// purely in-memory store with no digest persistence.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionStoreConfig {
    /// Persist recomputed entity-id digests to the backend after each
    /// refresh. Best-effort: a failed write is logged and the query still
    /// succeeds, since persisted digests are rebuildable from the event set.
    #[serde(default)]
    pub persist_digests: bool,

    /// Maximum bucket-path depth accepted from an event's hierarchy.
    #[serde(default = "default_max_bucket_depth")]
    pub max_bucket_depth: usize,

    /// Backend retry attempts per operation
    #[serde(default = "default_backend_retries")]
    pub backend_retries: usize,
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,
    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,
}

fn default_max_bucket_depth() -> usize {
    16
}
fn default_backend_retries() -> usize {
    3
}
fn default_retry_initial_ms() -> u64 {
    100
}
fn default_retry_max_ms() -> u64 {
    2000
}

impl Default for VersionStoreConfig {
    fn default() -> Self {
        Self {
            persist_digests: false,
            max_bucket_depth: default_max_bucket_depth(),
            backend_retries: default_backend_retries(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
        }
    }
}
