//! Cross-module tests: registry + selector + scheduler + stores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use expertmesh_node::{
    AnnouncementEntry, Error, ExpertiseRegistry, ExpiryScheduler, ManualClock, NodeSelector,
    RegistryConfig, RocksStore, Store,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MODEL: &str = "nomic-embed-text";

fn registry(clock: Arc<ManualClock>) -> ExpertiseRegistry {
    ExpertiseRegistry::new(&RegistryConfig::default()).with_clock(clock)
}

fn random_vector(rng: &mut StdRng, dim: usize) -> Vec<f32> {
    (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

#[tokio::test]
async fn test_random_upserts_keep_composite_keys_unique() {
    let mut rng = StdRng::seed_from_u64(7);
    let registry = registry(Arc::new(ManualClock::new(0)));

    // Model of the expected state: node -> key -> vector
    let mut expected: BTreeMap<String, BTreeMap<String, Vec<f32>>> = BTreeMap::new();

    for _ in 0..300 {
        let node = format!("n{}", rng.gen_range(0..6));
        let batch_len = rng.gen_range(1..5);
        let batch: Vec<AnnouncementEntry> = (0..batch_len)
            .map(|_| {
                let key = format!("k{}", rng.gen_range(0..4));
                AnnouncementEntry::new(key, "", MODEL, random_vector(&mut rng, 4))
            })
            .collect();

        let mut node_state = BTreeMap::new();
        for entry in &batch {
            node_state.insert(entry.key.clone(), entry.vector.clone());
        }
        let written = registry.upsert(&node, batch).await.unwrap();
        assert_eq!(written, node_state.len());
        expected.insert(node, node_state);
    }

    let snapshot = registry.snapshot().await;
    let mut seen = BTreeSet::new();
    for announcement in snapshot.iter() {
        assert!(
            seen.insert(announcement.composite_key()),
            "duplicate key {}",
            announcement.composite_key()
        );
        assert_eq!(
            expected[&announcement.node_id][&announcement.key],
            announcement.vector,
            "latest write must win"
        );
    }
    let expected_len: usize = expected.values().map(BTreeMap::len).sum();
    assert_eq!(seen.len(), expected_len);
}

#[tokio::test]
async fn test_rank_is_sorted_and_model_isolated() {
    let mut rng = StdRng::seed_from_u64(42);
    let clock = Arc::new(ManualClock::new(0));
    let registry = registry(clock);

    for i in 0..40 {
        let model = if i % 3 == 0 { "other-model" } else { MODEL };
        let entries = vec![
            AnnouncementEntry::new("a", "", model, random_vector(&mut rng, 8)),
            AnnouncementEntry::new("b", "", model, random_vector(&mut rng, 8)),
        ];
        registry.upsert(&format!("node-{:02}", i), entries).await.unwrap();
    }

    let snapshot = registry.snapshot().await;
    let query = random_vector(&mut rng, 8);
    let matches = NodeSelector::new().rank(&snapshot, &query, MODEL, None).unwrap();

    let expected = snapshot.iter().filter(|a| a.model == MODEL).count();
    assert_eq!(matches.len(), expected);
    assert!(matches.iter().all(|m| m.model == MODEL));
    assert!(matches.iter().all(|m| (0.0..=1.0).contains(&m.score)));
    for pair in matches.windows(2) {
        let ordered = pair[0].score > pair[1].score
            || (pair[0].score == pair[1].score
                && (&pair[0].node_id, &pair[0].key) < (&pair[1].node_id, &pair[1].key));
        assert!(ordered, "out of order: {:?} then {:?}", pair[0], pair[1]);
    }
}

#[tokio::test]
async fn test_expiry_monotonicity() {
    let clock = Arc::new(ManualClock::new(1_000));
    let registry = registry(clock.clone());
    registry
        .upsert("n1", vec![AnnouncementEntry::new("ml", "", MODEL, vec![1.0, 0.0])])
        .await
        .unwrap();

    for age in [0u64, 1, 60, 119, 120] {
        clock.set(1_000 + age);
        assert_eq!(registry.snapshot().await.len(), 1, "age {}", age);
        assert_eq!(registry.sweep_expired(1_000 + age, 120).await, 0);
    }

    clock.set(1_121);
    assert_eq!(registry.sweep_expired(1_121, 120).await, 1);
    assert!(registry.snapshot().await.is_empty());
    assert_eq!(registry.sweep_expired(1_121, 120).await, 0);
}

#[tokio::test]
async fn test_degenerate_query_is_no_match() {
    let registry = registry(Arc::new(ManualClock::new(0)));
    registry
        .upsert("n1", vec![AnnouncementEntry::new("ml", "", MODEL, vec![1.0, 0.0])])
        .await
        .unwrap();

    let err = NodeSelector::new()
        .rank(&registry.snapshot().await, &[0.0, 0.0], MODEL, Some(1))
        .unwrap_err();
    assert!(matches!(err, Error::DegenerateVector));
    assert!(err.is_no_match());
}

#[tokio::test]
async fn test_rocksdb_round_trip_through_registry() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::new(0));

    {
        let store: Arc<dyn Store> = Arc::new(RocksStore::open(dir.path()).unwrap());
        let registry = registry(clock.clone()).with_store(store);
        registry
            .upsert(
                "n1",
                vec![
                    AnnouncementEntry::new("ml", "Machine learning", MODEL, vec![1.0, 0.0]),
                    AnnouncementEntry::new("db", "Databases", MODEL, vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        clock.set(100);
        registry
            .upsert("n2", vec![AnnouncementEntry::new("ml", "", MODEL, vec![1.0, 1.0])])
            .await
            .unwrap();
        clock.set(130);
        assert_eq!(registry.sweep_expired(130, 120).await, 2);
        // Releases the database lock before reopening
        registry.close().await;
    }

    let store: Arc<dyn Store> = Arc::new(RocksStore::open(dir.path()).unwrap());
    let restored = registry(clock.clone()).with_store(store);
    assert_eq!(restored.hydrate().await.unwrap(), 1);

    let grouped = restored.list_by_node().await;
    assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["n2"]);
    assert_eq!(grouped["n2"][0].last_announced, 100);
}

#[tokio::test]
async fn test_concurrent_queries_during_writes_and_sweeps() {
    let clock = Arc::new(ManualClock::new(0));
    let registry = Arc::new(registry(clock.clone()));
    let scheduler =
        ExpiryScheduler::new(registry.clone(), Duration::from_millis(10)).spawn();

    let writers = (0..4).map(|w| {
        let registry = registry.clone();
        let clock = clock.clone();
        async move {
            for i in 0..20u64 {
                clock.advance(5);
                let entries = vec![
                    AnnouncementEntry::new("x", "", MODEL, vec![1.0, i as f32]),
                    AnnouncementEntry::new("y", "", MODEL, vec![i as f32, 1.0]),
                ];
                registry.upsert(&format!("w{}", w), entries).await.unwrap();
                tokio::task::yield_now().await;
            }
        }
    });
    let readers = (0..4).map(|_| {
        let registry = registry.clone();
        async move {
            for _ in 0..20 {
                let snapshot = registry.snapshot().await;
                let matches = NodeSelector::new()
                    .rank(&snapshot, &[1.0, 1.0], MODEL, None)
                    .unwrap();
                // Each node contributes both of its keys or neither
                let mut per_node: BTreeMap<String, usize> = BTreeMap::new();
                for m in &matches {
                    *per_node.entry(m.node_id.clone()).or_default() += 1;
                }
                assert!(per_node.values().all(|&n| n == 2));
                tokio::task::yield_now().await;
            }
        }
    });

    futures::future::join(
        futures::future::join_all(writers),
        futures::future::join_all(readers),
    )
    .await;
    scheduler.shutdown().await;
}
