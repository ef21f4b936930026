//! Per-partition entry table and its linear-scan vector index.
//!
//! [`PartitionTable`] is the only way entries enter or leave a partition. It keeps the
//! id→entry map and the (id, vector) index in lock-step, so every id in one has exactly
//! one counterpart in the other.

use std::collections::HashMap;

use super::types::{MemoryEntry, Partition};
use crate::embedding::dot;

/// One (id, vector) pair in the index, tagged with its insertion sequence.
#[derive(Debug, Clone)]
struct IndexSlot {
    id: String,
    vector: Vec<f32>,
    seq: u64,
}

/// Flat vector index for a single partition. Similarity search is a full scan.
#[derive(Debug, Default)]
pub struct PartitionIndex {
    slots: Vec<IndexSlot>,
    positions: HashMap<String, usize>,
}

impl PartitionIndex {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.positions.contains_key(id)
    }

    /// Score every indexed vector against `query`, yielding `(id, similarity)`.
    pub fn scan<'a>(&'a self, query: &'a [f32]) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.slots
            .iter()
            .map(move |slot| (slot.id.as_str(), dot(query, &slot.vector)))
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.id.as_str())
    }

    fn insert(&mut self, id: String, vector: Vec<f32>, seq: u64) {
        if let Some(&pos) = self.positions.get(&id) {
            self.slots[pos] = IndexSlot { id, vector, seq };
            return;
        }
        self.positions.insert(id.clone(), self.slots.len());
        self.slots.push(IndexSlot { id, vector, seq });
    }

    fn remove(&mut self, id: &str) -> bool {
        let Some(pos) = self.positions.remove(id) else {
            return false;
        };
        self.slots.swap_remove(pos);
        if let Some(moved) = self.slots.get(pos) {
            self.positions.insert(moved.id.clone(), pos);
        }
        true
    }

    fn seq_of(&self, id: &str) -> Option<u64> {
        self.positions.get(id).map(|&pos| self.slots[pos].seq)
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.positions.clear();
    }
}

/// Entry table plus index for one partition. Guarded by a single lock in the store.
#[derive(Debug)]
pub struct PartitionTable {
    partition: Partition,
    entries: HashMap<String, MemoryEntry>,
    index: PartitionIndex,
    next_seq: u64,
}

impl PartitionTable {
    pub fn new(partition: Partition) -> Self {
        Self {
            partition,
            entries: HashMap::new(),
            index: PartitionIndex::default(),
            next_seq: 0,
        }
    }

    pub fn partition(&self) -> Partition {
        self.partition
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn index(&self) -> &PartitionIndex {
        &self.index
    }

    pub fn get(&self, id: &str) -> Option<&MemoryEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MemoryEntry> {
        self.entries.get_mut(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values()
    }

    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut MemoryEntry> {
        self.entries.values_mut()
    }

    /// Insert an entry into both the table and the index.
    pub fn insert(&mut self, entry: MemoryEntry) {
        debug_assert_eq!(entry.partition, self.partition);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(entry.id.clone(), entry.vector.clone(), seq);
        self.entries.insert(entry.id.clone(), entry);
    }

    /// Remove an entry from both the table and the index.
    pub fn remove(&mut self, id: &str) -> Option<MemoryEntry> {
        let entry = self.entries.remove(id)?;
        self.index.remove(id);
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
        self.next_seq = 0;
    }

    /// The id with the earliest `created_at`, insertion order breaking ties.
    pub fn oldest_id(&self) -> Option<String> {
        self.entries
            .values()
            .min_by_key(|e| (e.created_at, self.index.seq_of(&e.id).unwrap_or(u64::MAX)))
            .map(|e| e.id.clone())
    }

    /// True when the table and the index mirror each other exactly.
    pub fn is_consistent(&self) -> bool {
        self.entries.len() == self.index.len()
            && self.index.ids().all(|id| self.entries.contains_key(id))
            && self.entries.values().all(|e| e.partition == self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::{json, Map};
    use std::collections::BTreeSet;

    fn entry(id: &str, vector: Vec<f32>, age_secs: i64) -> MemoryEntry {
        let created = Utc::now() - Duration::seconds(age_secs);
        MemoryEntry {
            id: id.to_string(),
            content: json!(id),
            vector,
            partition: Partition::Semantic,
            importance: 0.5,
            created_at: created,
            last_accessed_at: created,
            access_count: 0,
            tags: BTreeSet::new(),
            context: Map::new(),
        }
    }

    #[test]
    fn insert_and_remove_keep_table_and_index_in_sync() {
        let mut table = PartitionTable::new(Partition::Semantic);
        table.insert(entry("a", vec![1.0, 0.0], 0));
        table.insert(entry("b", vec![0.0, 1.0], 0));
        table.insert(entry("c", vec![0.6, 0.8], 0));
        assert!(table.is_consistent());

        assert!(table.remove("a").is_some());
        assert!(table.remove("a").is_none());
        assert!(table.is_consistent());
        assert_eq!(table.len(), 2);
        assert!(!table.index().contains("a"));
        assert!(table.index().contains("c"));
    }

    #[test]
    fn scan_reports_dot_product_per_slot() {
        let mut table = PartitionTable::new(Partition::Semantic);
        table.insert(entry("x", vec![1.0, 0.0], 0));
        table.insert(entry("y", vec![0.0, 1.0], 0));
        let query = [1.0f32, 0.0];
        let scores: HashMap<&str, f64> = table.index().scan(&query).collect();
        assert!((scores["x"] - 1.0).abs() < 1e-9);
        assert!(scores["y"].abs() < 1e-9);
    }

    #[test]
    fn oldest_prefers_created_at_then_insertion_order() {
        let mut table = PartitionTable::new(Partition::Semantic);
        table.insert(entry("newer", vec![1.0], 10));
        table.insert(entry("older", vec![1.0], 100));
        assert_eq!(table.oldest_id().as_deref(), Some("older"));

        let mut tied = PartitionTable::new(Partition::Semantic);
        let mut first = entry("first", vec![1.0], 0);
        let mut second = entry("second", vec![1.0], 0);
        second.created_at = first.created_at;
        first.last_accessed_at = first.created_at;
        tied.insert(first);
        tied.insert(second);
        assert_eq!(tied.oldest_id().as_deref(), Some("first"));
    }

    #[test]
    fn clear_empties_both_sides() {
        let mut table = PartitionTable::new(Partition::Semantic);
        table.insert(entry("a", vec![1.0], 0));
        table.clear();
        assert!(table.is_empty());
        assert!(table.index().is_empty());
        assert!(table.is_consistent());
    }
}
