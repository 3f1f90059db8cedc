// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-endpoint digest cache with dirty-bit invalidation.
//!
//! Maps every tree path to its last-computed digest. Mutations mark the
//! mutated leaf and every ancestor up to the root dirty; the next digest
//! read recomputes exactly those nodes, children first, and marks them clean
//! again. Entries for nodes pruned out of the tree are dropped.
//!
//! The cache is private to the version store and rebuildable from the event
//! set at any time - it is never the source of truth.

use std::collections::{BTreeMap, HashMap};

use super::bucket_tree::{
    ancestor_paths, bucket_digest, join_path, leaf_digest, BucketTree, ChildEntry, NodeDigest,
};
use super::BucketDigest;

#[derive(Debug, Clone)]
struct CacheEntry {
    digest: NodeDigest,
    dirty: bool,
}

/// Result of refreshing a cache against its tree.
#[derive(Debug)]
pub struct RefreshOutcome {
    /// Digest of every node currently in the tree, root (`""`) included,
    /// leaves keyed by their full path.
    pub digests: BTreeMap<String, BucketDigest>,
    /// How many nodes actually had to be rehashed.
    pub recomputed: usize,
}

impl RefreshOutcome {
    /// The root digest, hex-encoded.
    pub fn root(&self) -> &str {
        &self
            .digests
            .get("")
            .expect("refresh always emits the root digest")
            .digest
    }
}

/// Dirty-tracking digest cache for one endpoint's bucket tree.
#[derive(Debug, Default)]
pub struct DigestCache {
    entries: HashMap<String, CacheEntry>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached entries (clean or dirty).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mark a mutated leaf and all its ancestors, root included, dirty.
    ///
    /// Entries are marked, not deleted; paths never computed yet are already
    /// implicitly dirty.
    pub fn invalidate_leaf_path(&mut self, leaf_path: &str) {
        self.mark_dirty("");
        for path in ancestor_paths(leaf_path) {
            self.mark_dirty(&path);
        }
    }

    /// Drop the entries of a removed leaf and its pruned buckets, then mark
    /// the surviving ancestors dirty.
    pub fn invalidate_removed(&mut self, leaf_path: &str, pruned: &[String]) {
        self.entries.remove(leaf_path);
        for path in pruned {
            self.entries.remove(path);
        }
        self.mark_dirty("");
        for path in ancestor_paths(leaf_path) {
            if path != leaf_path && !pruned.contains(&path) {
                self.mark_dirty(&path);
            }
        }
    }

    fn mark_dirty(&mut self, path: &str) {
        if let Some(entry) = self.entries.get_mut(path) {
            entry.dirty = true;
        }
    }

    /// The cached digest for a path, only if clean.
    fn clean_digest(&self, path: &str) -> Option<NodeDigest> {
        self.entries
            .get(path)
            .filter(|e| !e.dirty)
            .map(|e| e.digest)
    }

    fn store_clean(&mut self, path: &str, digest: NodeDigest) {
        self.entries.insert(
            path.to_string(),
            CacheEntry {
                digest,
                dirty: false,
            },
        );
    }

    /// Bring the cache up to date with the tree and return the full digest
    /// map.
    ///
    /// Walks the whole tree but rehashes only dirty nodes, children before
    /// parents; a clean node's subtree is served entirely from cache.
    pub fn refresh(&mut self, tree: &BucketTree) -> RefreshOutcome {
        let mut digests = BTreeMap::new();
        let mut recomputed = 0;
        self.visit(tree, "", &mut digests, &mut recomputed);
        RefreshOutcome {
            digests,
            recomputed,
        }
    }

    fn visit(
        &mut self,
        tree: &BucketTree,
        path: &str,
        out: &mut BTreeMap<String, BucketDigest>,
        recomputed: &mut usize,
    ) -> NodeDigest {
        let node = tree
            .node(path)
            .expect("digest refresh visited a path with no bucket node");

        let mut child_digests: Vec<(&str, NodeDigest)> =
            Vec::with_capacity(node.children.len());
        for (label, entry) in &node.children {
            let child_path = join_path(path, label);
            let digest = match entry {
                ChildEntry::Leaf { version } => match self.clean_digest(&child_path) {
                    Some(digest) => digest,
                    None => {
                        let digest = leaf_digest(label, version);
                        *recomputed += 1;
                        self.store_clean(&child_path, digest);
                        digest
                    }
                },
                ChildEntry::Bucket => self.visit(tree, &child_path, out, recomputed),
            };
            if matches!(entry, ChildEntry::Leaf { .. }) {
                out.insert(
                    child_path.clone(),
                    BucketDigest::new(child_path.clone(), digest),
                );
            }
            child_digests.push((label.as_str(), digest));
        }

        let digest = match self.clean_digest(path) {
            Some(digest) => digest,
            None => {
                let digest = bucket_digest(child_digests.iter().map(|(l, d)| (*l, d)));
                *recomputed += 1;
                self.store_clean(path, digest);
                digest
            }
        };
        out.insert(path.to_string(), BucketDigest::new(path.to_string(), digest));
        digest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::bucket_tree::empty_tree_digest;

    fn labels(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_empty_tree_root_digest() {
        let tree = BucketTree::new();
        let mut cache = DigestCache::new();

        let outcome = cache.refresh(&tree);
        assert_eq!(outcome.digests.len(), 1);
        assert_eq!(outcome.root(), hex::encode(empty_tree_digest()));
    }

    #[test]
    fn test_refresh_emits_every_node() {
        let mut tree = BucketTree::new();
        let leaf = tree.insert_leaf(&labels(&["2019", "08"]), "id1", "v1");
        let mut cache = DigestCache::new();

        let outcome = cache.refresh(&tree);
        // root, "2019", "2019.08", and the leaf
        assert_eq!(outcome.digests.len(), 4);
        assert!(outcome.digests.contains_key(""));
        assert!(outcome.digests.contains_key("2019"));
        assert!(outcome.digests.contains_key("2019.08"));
        assert!(outcome.digests.contains_key(leaf.as_str()));
    }

    #[test]
    fn test_second_refresh_recomputes_nothing() {
        let mut tree = BucketTree::new();
        tree.insert_leaf(&labels(&["aa", "bb"]), "id1", "v1");
        let mut cache = DigestCache::new();

        let first = cache.refresh(&tree);
        assert_eq!(first.recomputed, 4);

        let second = cache.refresh(&tree);
        assert_eq!(second.recomputed, 0);
        assert_eq!(first.digests, second.digests);
    }

    #[test]
    fn test_invalidation_recomputes_only_the_mutated_path() {
        let mut tree = BucketTree::new();
        let touched = tree.insert_leaf(&labels(&["aa"]), "id1", "v1");
        tree.insert_leaf(&labels(&["bb"]), "id2", "v2");
        let mut cache = DigestCache::new();
        cache.refresh(&tree);

        tree.insert_leaf(&labels(&["aa"]), "id1", "v1-changed");
        cache.invalidate_leaf_path(&touched);

        let outcome = cache.refresh(&tree);
        // leaf + "aa" + root; the "bb" subtree stays cached
        assert_eq!(outcome.recomputed, 3);
    }

    #[test]
    fn test_mutation_changes_every_ancestor_digest() {
        let mut tree = BucketTree::new();
        let leaf = tree.insert_leaf(&labels(&["2019", "08"]), "id1", "v1");
        tree.insert_leaf(&labels(&["2020", "01"]), "id2", "v2");
        let mut cache = DigestCache::new();
        let before = cache.refresh(&tree).digests;

        tree.insert_leaf(&labels(&["2019", "08"]), "id1", "v1-changed");
        cache.invalidate_leaf_path(&leaf);
        let after = cache.refresh(&tree).digests;

        for path in ["", "2019", "2019.08", leaf.as_str()] {
            assert_ne!(before[path], after[path], "path {path:?} should change");
        }
        // untouched subtree is unaffected
        assert_eq!(before["2020"], after["2020"]);
        assert_eq!(before["2020.01"], after["2020.01"]);
    }

    #[test]
    fn test_dirty_result_matches_cold_rebuild() {
        let mut tree = BucketTree::new();
        let leaf = tree.insert_leaf(&labels(&["aa"]), "id1", "v1");
        tree.insert_leaf(&labels(&["bb"]), "id2", "v2");
        let mut cache = DigestCache::new();
        cache.refresh(&tree);

        tree.insert_leaf(&labels(&["aa"]), "id1", "v9");
        cache.invalidate_leaf_path(&leaf);
        let warm = cache.refresh(&tree).digests;

        let cold = DigestCache::new().refresh(&tree).digests;
        assert_eq!(warm, cold);
    }

    #[test]
    fn test_removed_entries_are_dropped() {
        let mut tree = BucketTree::new();
        let path = labels(&["2019", "08"]);
        let leaf = tree.insert_leaf(&path, "id1", "v1");
        let mut cache = DigestCache::new();
        cache.refresh(&tree);
        assert_eq!(cache.len(), 4);

        let removal = tree.remove_leaf(&path, "id1");
        cache.invalidate_removed(&leaf, &removal.pruned);

        // only the root entry survives, marked dirty
        assert_eq!(cache.len(), 1);
        let outcome = cache.refresh(&tree);
        assert_eq!(outcome.root(), hex::encode(empty_tree_digest()));
    }

    #[test]
    fn test_insertion_order_independence() {
        let mut forward = BucketTree::new();
        let mut reverse = BucketTree::new();
        let entries = [("aa", "id1", "v1"), ("bb", "id2", "v2"), ("aa", "id3", "v3")];
        for (bucket, id, version) in entries {
            forward.insert_leaf(&labels(&[bucket]), id, version);
        }
        for (bucket, id, version) in entries.iter().rev() {
            reverse.insert_leaf(&labels(&[bucket]), id, version);
        }

        let a = DigestCache::new().refresh(&forward);
        let b = DigestCache::new().refresh(&reverse);
        assert_eq!(a.root(), b.root());
        assert_eq!(a.digests, b.digests);
    }
}
