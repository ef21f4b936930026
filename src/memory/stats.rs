use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::store::MemoryStore;
use super::types::Partition;

/// Response from [`MemoryStore::stats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsResponse {
    pub total_memories: u64,
    /// Entry count per partition; all four partitions are always present.
    pub by_partition: BTreeMap<String, u64>,
    /// Mean importance across all entries, 0.0 for an empty store.
    pub average_importance: f64,
    pub average_importance_by_partition: BTreeMap<String, f64>,
    /// Lifetime count of successful `store` calls.
    pub total_stored: u64,
    /// Lifetime count of entries removed by capacity management, compression, or cleanup.
    pub total_evicted: u64,
    pub dimension: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_compression_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_memory: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_memory: Option<DateTime<Utc>>,
}

/// Structural self-check of the in-memory tables.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Every partition's table and index mirror each other.
    pub partitions_consistent: bool,
    /// The id registry names exactly the stored entries, each under its own partition.
    pub registry_consistent: bool,
    /// Every stored vector has the configured dimension.
    pub dimensions_ok: bool,
    pub entry_count: usize,
    pub registry_count: usize,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.partitions_consistent && self.registry_consistent && self.dimensions_ok
    }
}

impl MemoryStore {
    /// Compute per-partition counts, average importance, and lifetime counters.
    pub fn stats(&self) -> StatsResponse {
        let mut by_partition = BTreeMap::new();
        let mut average_importance_by_partition = BTreeMap::new();
        let mut total = 0u64;
        let mut importance_sum = 0.0;
        let mut oldest: Option<DateTime<Utc>> = None;
        let mut newest: Option<DateTime<Utc>> = None;

        for partition in Partition::ALL {
            let table = self.read_table(partition);
            let count = table.len() as u64;
            let sum: f64 = table.entries().map(|e| e.importance).sum();
            for entry in table.entries() {
                oldest = Some(oldest.map_or(entry.created_at, |t| t.min(entry.created_at)));
                newest = Some(newest.map_or(entry.created_at, |t| t.max(entry.created_at)));
            }

            by_partition.insert(partition.as_str().to_string(), count);
            average_importance_by_partition.insert(
                partition.as_str().to_string(),
                if count > 0 { sum / count as f64 } else { 0.0 },
            );
            total += count;
            importance_sum += sum;
        }

        StatsResponse {
            total_memories: total,
            by_partition,
            average_importance: if total > 0 {
                importance_sum / total as f64
            } else {
                0.0
            },
            average_importance_by_partition,
            total_stored: self.total_stored.load(Ordering::Relaxed),
            total_evicted: self.total_evicted.load(Ordering::Relaxed),
            dimension: self.dimension(),
            last_compression_at: *self
                .last_compression_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
            oldest_memory: oldest,
            newest_memory: newest,
        }
    }

    /// Verify that tables, indices, and the id registry agree with each other.
    pub fn health_check(&self) -> HealthReport {
        let dimension = self.dimension();
        let tables: Vec<_> = Partition::ALL.iter().map(|p| self.read_table(*p)).collect();
        let registry = self.registry();

        let partitions_consistent = tables.iter().all(|t| t.is_consistent());
        let dimensions_ok = tables
            .iter()
            .all(|t| t.entries().all(|e| e.vector.len() == dimension));
        let entry_count: usize = tables.iter().map(|t| t.len()).sum();
        let registry_consistent = registry.len() == entry_count
            && tables.iter().all(|t| {
                t.entries()
                    .all(|e| registry.get(&e.id) == Some(&t.partition()))
            });

        HealthReport {
            partitions_consistent,
            registry_consistent,
            dimensions_ok,
            entry_count,
            registry_count: registry.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::memory::types::StoreOptions;

    fn test_store() -> MemoryStore {
        let mut config = StoreConfig::with_db_path("/nonexistent/memvault-unit.db");
        config.embedding.dimension = 16;
        MemoryStore::new(config).unwrap()
    }

    #[test]
    fn test_empty_store_stats() {
        let store = test_store();
        let stats = store.stats();
        assert_eq!(stats.total_memories, 0);
        assert_eq!(stats.average_importance, 0.0);
        assert_eq!(stats.by_partition.len(), 4);
        assert_eq!(stats.by_partition["working"], 0);
        assert!(stats.oldest_memory.is_none());
        assert!(stats.newest_memory.is_none());
        assert!(stats.last_compression_at.is_none());
    }

    #[test]
    fn test_stats_counts_by_partition() {
        let store = test_store();
        store.store("Fact one", Partition::Semantic, StoreOptions::new().importance(0.2)).unwrap();
        store.store("Fact two", Partition::Semantic, StoreOptions::new().importance(0.4)).unwrap();
        store.store("Event one", Partition::Episodic, StoreOptions::new().importance(0.9)).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_memories, 3);
        assert_eq!(stats.by_partition["semantic"], 2);
        assert_eq!(stats.by_partition["episodic"], 1);
        assert_eq!(stats.by_partition["procedural"], 0);
        assert!((stats.average_importance - 0.5).abs() < 1e-9);
        assert!((stats.average_importance_by_partition["semantic"] - 0.3).abs() < 1e-9);
        assert_eq!(stats.total_stored, 3);
        assert!(stats.oldest_memory <= stats.newest_memory);
    }

    #[test]
    fn test_health_check_after_mixed_operations() {
        let store = test_store();
        let a = store.store("a", Partition::Working, StoreOptions::new()).unwrap();
        store.store("b", Partition::Procedural, StoreOptions::new()).unwrap();
        store.delete(&a);
        let report = store.health_check();
        assert!(report.is_healthy());
        assert_eq!(report.entry_count, 1);
        assert_eq!(report.registry_count, 1);
    }
}
