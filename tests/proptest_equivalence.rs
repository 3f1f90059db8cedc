//! Property-based tests for comparator equivalence and digest determinism.
//!
//! For randomized event sets and mutations, the incremental comparison must
//! always return the same set of differences as the flat baseline, and
//! digests must depend only on the `(id, version)` content, never on
//! insertion order.
//!
//! Run with: `cargo test --test proptest_equivalence`

use proptest::prelude::*;
use std::collections::BTreeMap;

use version_store::{EntityDifference, PrefixPartitionedEvent, VersionStore};

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate an id -> version mapping.
fn event_set_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z0-9]{1,8}", "[a-z0-9]{1,8}", 0..40)
}

/// Generate two overlapping-but-divergent event sets: a shared base with
/// per-side overrides and additions.
fn divergent_pair_strategy(
) -> impl Strategy<Value = (BTreeMap<String, String>, BTreeMap<String, String>)> {
    (
        event_set_strategy(),
        event_set_strategy(),
        event_set_strategy(),
    )
        .prop_map(|(base, upstream_extra, downstream_extra)| {
            let mut upstream = base.clone();
            upstream.extend(upstream_extra);
            let mut downstream = base;
            downstream.extend(downstream_extra);
            (upstream, downstream)
        })
}

fn event_for(id: &str, version: &str) -> PrefixPartitionedEvent {
    // Partition by a prefix of the id itself: deterministic per entity but
    // still spread across buckets.
    PrefixPartitionedEvent::new(id, version, "userId", id, 2)
}

async fn populate(store: &VersionStore, endpoint: u64, events: &BTreeMap<String, String>) {
    for (id, version) in events {
        store
            .add_event(endpoint, &event_for(id, version))
            .await
            .unwrap();
    }
}

/// The differences the comparators must find, computed directly from the
/// two mappings.
fn reference_diff(
    upstream: &BTreeMap<String, String>,
    downstream: &BTreeMap<String, String>,
) -> Vec<EntityDifference> {
    let mut diffs = Vec::new();
    for (id, up_version) in upstream {
        match downstream.get(id) {
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
    for (id, down_version) in downstream {
        if !upstream.contains_key(id) {
            diffs.push(EntityDifference::downstream_only(
                id.clone(),
                down_version.clone(),
            ));
        }
    }
    diffs.sort_by(|a, b| a.id.cmp(&b.id));
    diffs
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("failed to build test runtime")
}

// =============================================================================
// Comparator equivalence
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig { cases: 48, ..ProptestConfig::default() })]

    /// Incremental and flat comparison always agree, and both match the
    /// reference diff of the underlying mappings.
    #[test]
    fn prop_incremental_matches_flat((upstream, downstream) in divergent_pair_strategy()) {
        runtime().block_on(async {
            let store = VersionStore::in_memory();
            populate(&store, 1, &upstream).await;
            populate(&store, 2, &downstream).await;

            let flat = store.flat_comparison(1, 2).await.unwrap();
            let incremental = store.incremental_comparison(1, 2).await.unwrap();

            assert_eq!(flat, incremental);
            assert_eq!(flat, reference_diff(&upstream, &downstream));
        });
    }

    /// Identical (id, version) sets converge: equal root digests and empty
    /// comparisons, regardless of insertion order.
    #[test]
    fn prop_identical_sets_converge(events in event_set_strategy()) {
        runtime().block_on(async {
            let store = VersionStore::in_memory();
            for (id, version) in &events {
                store.add_event(1, &event_for(id, version)).await.unwrap();
            }
            for (id, version) in events.iter().rev() {
                store.add_event(2, &event_for(id, version)).await.unwrap();
            }

            let up = store.entity_id_digests(1).await.unwrap();
            let down = store.entity_id_digests(2).await.unwrap();
            assert_eq!(up, down);

            assert!(store.flat_comparison(1, 2).await.unwrap().is_empty());
            assert!(store.incremental_comparison(1, 2).await.unwrap().is_empty());
        });
    }

    /// Changing exactly one version diverges exactly one entity, and the
    /// mutated endpoint's root digest moves while the other's stays put.
    #[test]
    fn prop_single_mutation_is_detected(
        events in prop::collection::btree_map("[a-z0-9]{1,8}", "[a-z0-9]{1,8}", 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        runtime().block_on(async {
            let store = VersionStore::in_memory();
            populate(&store, 1, &events).await;
            populate(&store, 2, &events).await;

            let up_before = store.entity_id_digests(1).await.unwrap()[""].digest.clone();
            let down_before = store.entity_id_digests(2).await.unwrap()[""].digest.clone();

            let (id, version) = events.iter().nth(pick.index(events.len())).unwrap();
            let mutated_version = format!("{version}-mutated");
            store.add_event(1, &event_for(id, &mutated_version)).await.unwrap();

            let up_after = store.entity_id_digests(1).await.unwrap()[""].digest.clone();
            let down_after = store.entity_id_digests(2).await.unwrap()[""].digest.clone();
            assert_ne!(up_before, up_after);
            assert_eq!(down_before, down_after);

            let expected = vec![EntityDifference::differing(
                id.clone(),
                mutated_version,
                version.clone(),
            )];
            assert_eq!(store.flat_comparison(1, 2).await.unwrap(), expected);
            assert_eq!(store.incremental_comparison(1, 2).await.unwrap(), expected);
        });
    }

    /// Deleting an entity from both sides restores convergence.
    #[test]
    fn prop_symmetric_deletion_reconverges(
        events in prop::collection::btree_map("[a-z0-9]{1,8}", "[a-z0-9]{1,8}", 1..30),
        pick in any::<prop::sample::Index>(),
    ) {
        runtime().block_on(async {
            let store = VersionStore::in_memory();
            populate(&store, 1, &events).await;
            populate(&store, 2, &events).await;

            let (id, version) = events.iter().nth(pick.index(events.len())).unwrap();
            store.add_event(1, &event_for(id, &format!("{version}-x"))).await.unwrap();
            assert_eq!(store.flat_comparison(1, 2).await.unwrap().len(), 1);

            store.delete_event(1, id).await.unwrap();
            store.delete_event(2, id).await.unwrap();

            let up = store.entity_id_digests(1).await.unwrap();
            let down = store.entity_id_digests(2).await.unwrap();
            assert_eq!(up[""].digest, down[""].digest);
            assert!(store.incremental_comparison(1, 2).await.unwrap().is_empty());
        });
    }
}
