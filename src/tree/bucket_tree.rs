// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Hierarchical bucket tree addressed by path.
//!
//! Buckets are stored in a flat arena keyed by path string rather than as an
//! owned recursive structure, so the digest cache can address any node by the
//! same key. The root lives at path `""`; child paths join labels with `'.'`:
//!
//! ```text
//! ""                      (root)
//! └── 2019 ── 2019.08 ── 2019.08.07 ── 2019.08.07.<entity-id>  (leaf)
//! ```
//!
//! A leaf is an `(id, version)` entry inside its terminal bucket's child map;
//! the leaf's label is the entity id, so sibling labels stay unique and each
//! entity has exactly one root-to-leaf path.
//!
//! Buckets that lose their last child are pruned eagerly, which keeps
//! was-populated-now-empty subtrees structurally absent instead of hanging
//! around as present-but-empty nodes.

use sha2::{Digest as Sha2Digest, Sha256};
use std::collections::{BTreeMap, HashMap};

/// Separator joining bucket labels into a path.
pub const PATH_SEPARATOR: char = '.';

/// A raw 32-byte SHA-256 digest.
pub type NodeDigest = [u8; 32];

/// Join a parent path and a child label.
///
/// `join_path("uk.nhs", "patient")` -> `"uk.nhs.patient"`, root joins to the
/// bare label.
#[inline]
pub fn join_path(parent: &str, label: &str) -> String {
    if parent.is_empty() {
        label.to_string()
    } else {
        let mut path = String::with_capacity(parent.len() + 1 + label.len());
        path.push_str(parent);
        path.push(PATH_SEPARATOR);
        path.push_str(label);
        path
    }
}

/// Get the parent path for a path.
///
/// `"uk.nhs.patient"` -> `"uk.nhs"`, `"uk"` -> `""` (root).
pub fn parent_path(path: &str) -> &str {
    match path.rfind(PATH_SEPARATOR) {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// All ancestor paths of a path, excluding root, including the path itself.
///
/// `"uk.nhs.patient"` -> `["uk", "uk.nhs", "uk.nhs.patient"]`.
pub fn ancestor_paths(path: &str) -> Vec<String> {
    if path.is_empty() {
        return Vec::new();
    }
    let segments: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    let mut paths = Vec::with_capacity(segments.len());
    let mut current = String::new();

    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            current.push(PATH_SEPARATOR);
        }
        current.push_str(segment);
        paths.push(current.clone());
    }

    paths
}

/// Fixed id-derived bucket path used by the entity-id digest tree.
///
/// Two hex-pair labels taken from SHA-256 of the id, so identical id sets
/// produce identical tree shapes on every endpoint regardless of how the
/// events themselves partition by attributes.
pub fn entity_bucket_path(id: &str) -> Vec<String> {
    let digest = Sha256::digest(id.as_bytes());
    let prefix = hex::encode(&digest[..2]);
    vec![prefix[..2].to_string(), prefix[2..4].to_string()]
}

/// Compute the digest of a leaf entry.
pub fn leaf_digest(id: &str, version: &str) -> NodeDigest {
    let mut hasher = Sha256::new();
    hasher.update(id.as_bytes());
    hasher.update(b"|");
    hasher.update(version.as_bytes());
    hasher.finalize().into()
}

/// Compute the digest of a bucket from its children's `(label, digest)` pairs.
///
/// Pairs must arrive sorted by label; the tree's `BTreeMap` child maps
/// guarantee that, which is what makes the digest insertion-order
/// independent. A bucket with no children (only ever the empty root) hashes
/// to the fixed empty-input digest.
pub fn bucket_digest<'a>(children: impl Iterator<Item = (&'a str, &'a NodeDigest)>) -> NodeDigest {
    let mut hasher = Sha256::new();
    for (label, child_digest) in children {
        hasher.update(label.as_bytes());
        hasher.update(b":");
        hasher.update(child_digest);
        hasher.update(b";");
    }
    hasher.finalize().into()
}

/// Digest of the empty tree (a root with no children).
pub fn empty_tree_digest() -> NodeDigest {
    bucket_digest(std::iter::empty())
}

/// A child of a bucket: either a nested bucket or a leaf entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildEntry {
    /// Child bucket; the node itself lives in the arena at the joined path.
    Bucket,
    /// Leaf entity; the child label is the entity id.
    Leaf { version: String },
}

/// An interior node: an ordered label -> child map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketNode {
    /// Ordered by label for deterministic digesting.
    pub children: BTreeMap<String, ChildEntry>,
}

/// Outcome of removing a leaf from the tree.
#[derive(Debug, Default)]
pub struct LeafRemoval {
    /// Whether the leaf was present and removed.
    pub removed: bool,
    /// Bucket paths pruned because the removal emptied them, deepest first.
    pub pruned: Vec<String>,
}

/// Path-addressed bucket tree for one endpoint.
#[derive(Debug, Clone)]
pub struct BucketTree {
    nodes: HashMap<String, BucketNode>,
}

impl BucketTree {
    /// Create an empty tree: just the root bucket with no children.
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(String::new(), BucketNode::default());
        Self { nodes }
    }

    /// Look up a bucket node by path (`""` = root).
    pub fn node(&self, path: &str) -> Option<&BucketNode> {
        self.nodes.get(path)
    }

    /// Number of bucket nodes, root included.
    pub fn bucket_count(&self) -> usize {
        self.nodes.len()
    }

    /// True if the tree holds no leaves.
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
            && self
                .nodes
                .get("")
                .map_or(true, |root| root.children.is_empty())
    }

    /// Insert or replace a leaf, creating the bucket chain as needed.
    ///
    /// Returns the leaf's full path. An existing leaf with the same id under
    /// the same terminal bucket is replaced (upsert).
    pub fn insert_leaf(&mut self, bucket_path: &[String], id: &str, version: &str) -> String {
        let mut path = String::new();
        for label in bucket_path {
            let child_path = join_path(&path, label);
            let node = self
                .nodes
                .get_mut(&path)
                .expect("parent bucket missing from arena");
            let prev = node.children.insert(label.clone(), ChildEntry::Bucket);
            debug_assert!(
                !matches!(prev, Some(ChildEntry::Leaf { .. })),
                "bucket label {child_path:?} collides with a leaf id"
            );
            self.nodes.entry(child_path.clone()).or_default();
            path = child_path;
        }

        let leaf_path = join_path(&path, id);
        let terminal = self
            .nodes
            .get_mut(&path)
            .expect("terminal bucket missing from arena");
        terminal.children.insert(
            id.to_string(),
            ChildEntry::Leaf {
                version: version.to_string(),
            },
        );
        leaf_path
    }

    /// Remove a leaf and prune any buckets the removal emptied.
    ///
    /// Removing an absent leaf is a no-op (`removed == false`).
    pub fn remove_leaf(&mut self, bucket_path: &[String], id: &str) -> LeafRemoval {
        // Path of every bucket from root to the terminal, in order.
        let mut chain: Vec<String> = Vec::with_capacity(bucket_path.len() + 1);
        chain.push(String::new());
        for label in bucket_path {
            let next = join_path(chain.last().expect("chain starts at root"), label);
            chain.push(next);
        }

        let terminal = chain.last().expect("chain starts at root").clone();
        let Some(node) = self.nodes.get_mut(&terminal) else {
            return LeafRemoval::default();
        };
        if node.children.remove(id).is_none() {
            return LeafRemoval::default();
        }

        let mut pruned = Vec::new();
        for i in (1..chain.len()).rev() {
            let empty = self
                .nodes
                .get(&chain[i])
                .map_or(false, |n| n.children.is_empty());
            if !empty {
                break;
            }
            self.nodes.remove(&chain[i]);
            pruned.push(chain[i].clone());
            let parent = self
                .nodes
                .get_mut(&chain[i - 1])
                .expect("parent bucket missing from arena");
            parent.children.remove(&bucket_path[i - 1]);
        }

        LeafRemoval {
            removed: true,
            pruned,
        }
    }

    /// The version of a leaf, if present.
    pub fn leaf_version(&self, bucket_path: &[String], id: &str) -> Option<&str> {
        let mut path = String::new();
        for label in bucket_path {
            path = join_path(&path, label);
        }
        match self.nodes.get(&path)?.children.get(id)? {
            ChildEntry::Leaf { version } => Some(version),
            ChildEntry::Bucket => None,
        }
    }

    /// Enumerate every `(id, version)` leaf under a subtree, in label order.
    pub fn collect_leaves(&self, path: &str) -> Vec<(String, String)> {
        let mut leaves = Vec::new();
        self.collect_leaves_into(path, &mut leaves);
        leaves
    }

    fn collect_leaves_into(&self, path: &str, out: &mut Vec<(String, String)>) {
        let Some(node) = self.nodes.get(path) else {
            return;
        };
        for (label, entry) in &node.children {
            match entry {
                ChildEntry::Leaf { version } => out.push((label.clone(), version.clone())),
                ChildEntry::Bucket => self.collect_leaves_into(&join_path(path, label), out),
            }
        }
    }
}

impl Default for BucketTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "uk"), "uk");
        assert_eq!(join_path("uk.nhs", "patient"), "uk.nhs.patient");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("uk.nhs.patient"), "uk.nhs");
        assert_eq!(parent_path("uk"), "");
        assert_eq!(parent_path(""), "");
    }

    #[test]
    fn test_ancestor_paths() {
        assert_eq!(
            ancestor_paths("uk.nhs.patient"),
            vec!["uk", "uk.nhs", "uk.nhs.patient"]
        );
        assert!(ancestor_paths("").is_empty());
    }

    #[test]
    fn test_entity_bucket_path_is_stable() {
        let a = entity_bucket_path("abc123");
        let b = entity_bucket_path("abc123");
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert!(a.iter().all(|l| l.len() == 2));
        assert_ne!(entity_bucket_path("abc123"), entity_bucket_path("abc124"));
    }

    #[test]
    fn test_leaf_digest_depends_on_both_fields() {
        assert_ne!(leaf_digest("a", "v1"), leaf_digest("a", "v2"));
        assert_ne!(leaf_digest("a", "v1"), leaf_digest("b", "v1"));
        assert_eq!(leaf_digest("a", "v1"), leaf_digest("a", "v1"));
    }

    #[test]
    fn test_bucket_digest_deterministic() {
        let d1 = leaf_digest("a", "v1");
        let d2 = leaf_digest("b", "v2");
        let pairs = [("a", &d1), ("b", &d2)];
        assert_eq!(
            bucket_digest(pairs.iter().copied()),
            bucket_digest(pairs.iter().copied())
        );
    }

    #[test]
    fn test_empty_tree_digest_is_fixed() {
        assert_eq!(empty_tree_digest(), bucket_digest(std::iter::empty()));
    }

    #[test]
    fn test_insert_creates_bucket_chain() {
        let mut tree = BucketTree::new();
        let leaf = tree.insert_leaf(&labels(&["2019", "08", "07"]), "id1", "v1");

        assert_eq!(leaf, "2019.08.07.id1");
        assert!(tree.node("2019").is_some());
        assert!(tree.node("2019.08").is_some());
        assert!(tree.node("2019.08.07").is_some());
        assert_eq!(
            tree.leaf_version(&labels(&["2019", "08", "07"]), "id1"),
            Some("v1")
        );
    }

    #[test]
    fn test_insert_same_leaf_replaces_version() {
        let mut tree = BucketTree::new();
        let path = labels(&["aa"]);
        tree.insert_leaf(&path, "id1", "v1");
        tree.insert_leaf(&path, "id1", "v2");

        assert_eq!(tree.leaf_version(&path, "id1"), Some("v2"));
        assert_eq!(tree.collect_leaves("").len(), 1);
    }

    #[test]
    fn test_remove_prunes_empty_buckets() {
        let mut tree = BucketTree::new();
        let path = labels(&["2019", "08", "07"]);
        tree.insert_leaf(&path, "id1", "v1");

        let removal = tree.remove_leaf(&path, "id1");
        assert!(removal.removed);
        assert_eq!(removal.pruned, vec!["2019.08.07", "2019.08", "2019"]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_remove_keeps_shared_buckets() {
        let mut tree = BucketTree::new();
        tree.insert_leaf(&labels(&["2019", "08"]), "id1", "v1");
        tree.insert_leaf(&labels(&["2019", "09"]), "id2", "v2");

        let removal = tree.remove_leaf(&labels(&["2019", "08"]), "id1");
        assert!(removal.removed);
        assert_eq!(removal.pruned, vec!["2019.08"]);
        assert!(tree.node("2019").is_some());
        assert_eq!(tree.collect_leaves("").len(), 1);
    }

    #[test]
    fn test_remove_absent_leaf_is_noop() {
        let mut tree = BucketTree::new();
        tree.insert_leaf(&labels(&["aa"]), "id1", "v1");

        let removal = tree.remove_leaf(&labels(&["aa"]), "missing");
        assert!(!removal.removed);
        assert!(removal.pruned.is_empty());

        let removal = tree.remove_leaf(&labels(&["zz"]), "id1");
        assert!(!removal.removed);
    }

    #[test]
    fn test_collect_leaves_in_label_order() {
        let mut tree = BucketTree::new();
        tree.insert_leaf(&labels(&["b"]), "id2", "v2");
        tree.insert_leaf(&labels(&["a"]), "id1", "v1");
        tree.insert_leaf(&labels(&["a"]), "id3", "v3");

        let leaves = tree.collect_leaves("");
        assert_eq!(
            leaves,
            vec![
                ("id1".to_string(), "v1".to_string()),
                ("id3".to_string(), "v3".to_string()),
                ("id2".to_string(), "v2".to_string()),
            ]
        );
    }
}
