// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Endpoint comparison: flat baseline and digest-guided incremental.
//!
//! Both comparators answer the same question - which entities differ
//! between two endpoints - and must return identical result sets. The flat
//! scan walks every id on both sides and is the correctness oracle; the
//! incremental walk descends the entity-id digest trees and skips every
//! subtree whose digests already agree:
//!
//! ```text
//! Upstream                              Downstream
//!     │                                      │
//!     ├──── root digests equal? ────────────►│  yes: done, provably in sync
//!     │                                      │
//!     ├──── compare children of root ───────►│  recurse only where digests
//!     │                                      │  disagree; one-sided subtrees
//!     │                                      │  are reported wholesale
//!     ▼                                      ▼
//!   leaf vs leaf: same id, differing version -> one difference
//! ```
//!
//! Each side's snapshot is taken under its own endpoint lock; a comparison
//! sees two independently-progressing endpoints, never a cross-endpoint
//! atomic view.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use super::{StoreError, VersionStore};
use crate::event::EndpointId;
use crate::metrics;
use crate::tree::bucket_tree::join_path;
use crate::tree::{BucketDigest, BucketTree, ChildEntry};

/// One entity whose versions disagree between two endpoints.
///
/// A side's version is `None` when the entity is absent there.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntityDifference {
    pub id: String,
    pub upstream_version: Option<String>,
    pub downstream_version: Option<String>,
}

impl EntityDifference {
    pub fn differing(id: String, upstream_version: String, downstream_version: String) -> Self {
        Self {
            id,
            upstream_version: Some(upstream_version),
            downstream_version: Some(downstream_version),
        }
    }

    pub fn upstream_only(id: String, version: String) -> Self {
        Self {
            id,
            upstream_version: Some(version),
            downstream_version: None,
        }
    }

    pub fn downstream_only(id: String, version: String) -> Self {
        Self {
            id,
            upstream_version: None,
            downstream_version: Some(version),
        }
    }
}

/// One endpoint's entity-id tree plus its refreshed digest map.
struct TreeSnapshot {
    tree: BucketTree,
    digests: BTreeMap<String, BucketDigest>,
}

impl TreeSnapshot {
    fn digest(&self, path: &str) -> &str {
        &self
            .digests
            .get(path)
            .expect("digest missing for a path present in the tree")
            .digest
    }
}

/// The `(id, version)` pairs under one child entry: the leaf itself, or
/// every leaf of a child bucket's subtree.
fn subtree_entities(
    tree: &BucketTree,
    child_path: &str,
    label: &str,
    entry: &ChildEntry,
) -> Vec<(String, String)> {
    match entry {
        ChildEntry::Leaf { version } => vec![(label.to_string(), version.clone())],
        ChildEntry::Bucket => tree.collect_leaves(child_path),
    }
}

impl VersionStore {
    /// Compare two endpoints entity by entity.
    ///
    /// O(n) in the total entity count; the result is ordered by id. This is
    /// the baseline that [`incremental_comparison`](Self::incremental_comparison)
    /// must match exactly.
    #[instrument(skip(self))]
    pub async fn flat_comparison(
        &self,
        upstream: EndpointId,
        downstream: EndpointId,
    ) -> Result<Vec<EntityDifference>, StoreError> {
        let up = self.version_snapshot(upstream);
        let down = self.version_snapshot(downstream);

        let mut diffs = Vec::new();
        for (id, up_version) in &up {
            match down.get(id) {
                Some(down_version) if down_version == up_version => {}
                Some(down_version) => diffs.push(EntityDifference::differing(
                    id.clone(),
                    up_version.clone(),
                    down_version.clone(),
                )),
                None => diffs.push(EntityDifference::upstream_only(
                    id.clone(),
                    up_version.clone(),
                )),
            }
        }
        for (id, down_version) in &down {
            if !up.contains_key(id) {
                diffs.push(EntityDifference::downstream_only(
                    id.clone(),
                    down_version.clone(),
                ));
            }
        }

        diffs.sort_by(|a, b| a.id.cmp(&b.id));
        metrics::record_comparison("flat", diffs.len());
        Ok(diffs)
    }

    /// Compare two endpoints by walking their digest trees.
    ///
    /// Produces the same result set as
    /// [`flat_comparison`](Self::flat_comparison) but skips every subtree
    /// whose digests agree: equal root digests finish in O(1) regardless of
    /// entity count.
    #[instrument(skip(self))]
    pub async fn incremental_comparison(
        &self,
        upstream: EndpointId,
        downstream: EndpointId,
    ) -> Result<Vec<EntityDifference>, StoreError> {
        let up = self.digest_snapshot(upstream).await?;
        let down = self.digest_snapshot(downstream).await?;

        if up.digest("") == down.digest("") {
            debug!("Root digests agree; endpoints are in sync");
            metrics::record_comparison("incremental", 0);
            return Ok(Vec::new());
        }

        let mut diffs = Vec::new();
        let mut work = vec![String::new()];
        while let Some(path) = work.pop() {
            let up_children = &up
                .tree
                .node(&path)
                .expect("divergent bucket missing from upstream tree")
                .children;
            let down_children = &down
                .tree
                .node(&path)
                .expect("divergent bucket missing from downstream tree")
                .children;

            let labels: BTreeSet<&str> = up_children
                .keys()
                .map(String::as_str)
                .chain(down_children.keys().map(String::as_str))
                .collect();

            for label in labels {
                let child_path = join_path(&path, label);
                match (up_children.get(label), down_children.get(label)) {
                    (Some(up_entry), Some(down_entry)) => {
                        if up.digest(&child_path) == down.digest(&child_path) {
                            continue;
                        }
                        match (up_entry, down_entry) {
                            (ChildEntry::Bucket, ChildEntry::Bucket) => work.push(child_path),
                            (
                                ChildEntry::Leaf {
                                    version: up_version,
                                },
                                ChildEntry::Leaf {
                                    version: down_version,
                                },
                            ) => diffs.push(EntityDifference::differing(
                                label.to_string(),
                                up_version.clone(),
                                down_version.clone(),
                            )),
                            // A leaf on one side sharing a label with a
                            // bucket on the other: nothing to pair up, both
                            // subtrees are one-sided.
                            (up_entry, down_entry) => {
                                for (id, version) in
                                    subtree_entities(&up.tree, &child_path, label, up_entry)
                                {
                                    diffs.push(EntityDifference::upstream_only(id, version));
                                }
                                for (id, version) in
                                    subtree_entities(&down.tree, &child_path, label, down_entry)
                                {
                                    diffs.push(EntityDifference::downstream_only(id, version));
                                }
                            }
                        }
                    }
                    (Some(up_entry), None) => {
                        for (id, version) in
                            subtree_entities(&up.tree, &child_path, label, up_entry)
                        {
                            diffs.push(EntityDifference::upstream_only(id, version));
                        }
                    }
                    (None, Some(down_entry)) => {
                        for (id, version) in
                            subtree_entities(&down.tree, &child_path, label, down_entry)
                        {
                            diffs.push(EntityDifference::downstream_only(id, version));
                        }
                    }
                    (None, None) => unreachable!("label came from the union of both maps"),
                }
            }
        }

        diffs.sort_by(|a, b| a.id.cmp(&b.id));
        debug!(differences = diffs.len(), "Incremental comparison complete");
        metrics::record_comparison("incremental", diffs.len());
        Ok(diffs)
    }

    /// Snapshot of an endpoint's id -> version mapping.
    fn version_snapshot(&self, endpoint: EndpointId) -> BTreeMap<String, String> {
        match self.lookup(endpoint) {
            Some(state) => {
                let state = state.read();
                state
                    .events
                    .values()
                    .map(|event| (event.id.clone(), event.version.clone()))
                    .collect()
            }
            None => BTreeMap::new(),
        }
    }

    /// Refresh an endpoint's entity-id digests and clone tree + digest map
    /// under one lock hold, so the pair is internally consistent.
    async fn digest_snapshot(&self, endpoint: EndpointId) -> Result<TreeSnapshot, StoreError> {
        let Some(state) = self.lookup(endpoint) else {
            return Ok(TreeSnapshot {
                tree: BucketTree::new(),
                digests: Self::empty_digest_map(),
            });
        };
        let (tree, digests, recomputed) = {
            let mut state = state.write();
            let state = &mut *state;
            let outcome = state.entity_cache.refresh(&state.entity_tree);
            (state.entity_tree.clone(), outcome.digests, outcome.recomputed)
        };
        metrics::record_digest_recompute("entity_id", recomputed);
        self.persist_digests_best_effort(endpoint, &digests, recomputed)
            .await;
        Ok(TreeSnapshot { tree, digests })
    }
}
