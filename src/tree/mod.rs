// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Merkle bucket tree and its digest cache.
//!
//! # Design
//!
//! Every endpoint owns two instances of the same structure:
//!
//! - the **entity-id tree**, bucketed by a fixed hash-prefix of each entity
//!   id, so endpoints holding identical `(id, version)` sets always agree on
//!   every digest no matter how their events partition by attributes;
//! - the **user-defined tree**, bucketed by each event's own attribute
//!   hierarchy (year/month/day, attribute prefix, ...).
//!
//! Digests are SHA-256: a leaf hashes its `(id, version)` pair, a bucket
//! hashes its children's sorted `(label, digest)` pairs. Two subtrees with
//! the same content therefore always produce the same digest, independent of
//! insertion order or mutation history.
//!
//! # Divergence protocol
//!
//! 1. Compare root digests. Equal roots prove identical trees - done.
//! 2. Otherwise compare the roots' children; recurse only into children
//!    whose digests disagree, and report one-sided subtrees wholesale.
//! 3. At leaves, differing versions for the same id are one difference.
//!
//! Best case O(1), worst case the cost of the flat entity-by-entity scan.

pub mod bucket_tree;
pub mod digest_cache;

pub use bucket_tree::{
    ancestor_paths, entity_bucket_path, join_path, parent_path, BucketNode, BucketTree,
    ChildEntry, LeafRemoval, NodeDigest,
};
pub use digest_cache::{DigestCache, RefreshOutcome};

use serde::{Deserialize, Serialize};

/// The digest of one tree node, addressed by its path from the root.
///
/// `path` is the `'.'`-joined label sequence (root = `""`); `digest` is the
/// node's hex-encoded SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketDigest {
    pub path: String,
    pub digest: String,
}

impl BucketDigest {
    pub fn new(path: String, digest: NodeDigest) -> Self {
        Self {
            path,
            digest: hex::encode(digest),
        }
    }
}
