mod helpers;

use helpers::test_store;
use memvault::{Partition, StoreOptions};
use tempfile::TempDir;

#[test]
fn decay_reduces_importance_by_partition_factor() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    let config = store.config().maintenance.clone();

    let event = store.store("Old event", Partition::Episodic, StoreOptions::new().importance(1.0)).unwrap();
    let fact = store.store("A fact", Partition::Semantic, StoreOptions::new().importance(1.0)).unwrap();
    let zero = store.store("Nothing", Partition::Semantic, StoreOptions::new().importance(0.0)).unwrap();

    let result = store.apply_decay();
    assert_eq!(result.affected_by_partition["episodic"], 1);
    assert_eq!(result.affected_by_partition["semantic"], 1);
    assert_eq!(result.affected_by_partition["working"], 0);

    assert_eq!(store.get(&event).unwrap().importance, config.episodic_decay_factor);
    assert_eq!(store.get(&fact).unwrap().importance, config.default_decay_factor);
    assert_eq!(store.get(&zero).unwrap().importance, 0.0);
}

#[test]
fn fresh_memories_are_never_cleanup_candidates() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    store.store("unimportant", Partition::Working, StoreOptions::new().importance(0.0)).unwrap();

    let result = store.cleanup(false);
    assert!(result.candidates.is_empty());
    assert_eq!(result.deleted, 0);
    assert_eq!(store.len(), 1);
}

#[test]
fn compress_all_reports_every_partition() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    for i in 0..4 {
        store.store(&i, Partition::Procedural, StoreOptions::new()).unwrap();
    }

    let results = store.compress_all(0.5).unwrap();
    assert_eq!(results.len(), 4);
    let procedural = results.iter().find(|r| r.partition == Partition::Procedural).unwrap();
    assert_eq!((procedural.before, procedural.retained), (4, 2));
    assert!(results
        .iter()
        .filter(|r| r.partition != Partition::Procedural)
        .all(|r| r.before == 0 && r.evicted_ids.is_empty()));
    assert_eq!(store.stats().total_evicted, 2);
}

#[test]
fn stats_serialize_with_all_partitions() {
    let tmp = TempDir::new().unwrap();
    let store = test_store(&tmp);
    store.store("x", Partition::Working, StoreOptions::new()).unwrap();

    let value = serde_json::to_value(store.stats()).unwrap();
    for key in ["episodic", "procedural", "semantic", "working"] {
        assert!(value["by_partition"].get(key).is_some(), "missing {key}");
    }
    assert_eq!(value["total_memories"], 1);
}
