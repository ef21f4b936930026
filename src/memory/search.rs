//! Read path: similarity-ranked retrieval across partitions.
//!
//! Every candidate is scored as
//! `similarity_weight * cosine + importance_weight * importance + recency_weight * recency`
//! where recency decays linearly with age over `recency_window_days`, floored at
//! `recency_floor`. [`MemoryStore::retrieve_similar`] counts every scored candidate as an
//! access ("retrieval strengthens memory"); [`MemoryStore::peek_similar`] ranks the same
//! way without touching anything.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::store::MemoryStore;
use super::types::{MemoryEntry, Partition};
use crate::config::RetrievalConfig;
use crate::error::Result;

/// Parameters for a similarity query.
#[derive(Debug, Clone)]
pub struct RecallQuery {
    /// Partitions to search. Empty means all of them.
    pub partitions: Vec<Partition>,
    /// Maximum results; `None` uses `retrieval.default_top_k`.
    pub top_k: Option<usize>,
    /// Candidates below this importance are skipped entirely.
    pub min_importance: f64,
}

impl Default for RecallQuery {
    fn default() -> Self {
        Self {
            partitions: Vec::new(),
            top_k: None,
            min_importance: 0.0,
        }
    }
}

impl RecallQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partitions(mut self, partitions: impl IntoIterator<Item = Partition>) -> Self {
        self.partitions = partitions.into_iter().collect();
        self
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn min_importance(mut self, min_importance: f64) -> Self {
        self.min_importance = min_importance;
        self
    }

    /// Requested partitions, deduplicated, in lock order.
    fn resolved_partitions(&self) -> BTreeSet<Partition> {
        if self.partitions.is_empty() {
            Partition::ALL.into_iter().collect()
        } else {
            self.partitions.iter().copied().collect()
        }
    }
}

/// A retrieval hit with its score breakdown.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredEntry {
    #[serde(flatten)]
    pub entry: MemoryEntry,
    pub score: f64,
    pub similarity: f64,
    pub recency: f64,
}

/// Linear recency decay over the configured window, clamped to `[recency_floor, 1.0]`.
pub fn recency_weight(age_days: f64, config: &RetrievalConfig) -> f64 {
    (1.0 - age_days / config.recency_window_days).clamp(config.recency_floor, 1.0)
}

/// Weighted blend of similarity, importance, and recency.
pub fn composite_score(similarity: f64, importance: f64, recency: f64, config: &RetrievalConfig) -> f64 {
    config.similarity_weight * similarity
        + config.importance_weight * importance
        + config.recency_weight * recency
}

/// Descending score; ties go to the more-accessed entry, then the newer one.
fn rank(a: &ScoredEntry, b: &ScoredEntry) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.entry.access_count.cmp(&a.entry.access_count))
        .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        .then_with(|| a.entry.id.cmp(&b.entry.id))
}

impl MemoryStore {
    /// Rank stored entries against `query` and return the top hits.
    ///
    /// Every entry that passes the importance filter has its `access_count`
    /// incremented and `last_accessed_at` set, whether or not it makes the cut. Returned
    /// entries reflect that update. An empty result is not an error.
    pub fn retrieve_similar<T: Serialize + ?Sized>(
        &self,
        query: &T,
        recall: &RecallQuery,
    ) -> Result<Vec<ScoredEntry>> {
        self.search(query, recall, true)
    }

    /// Same ranking as [`retrieve_similar`](Self::retrieve_similar), with no side effects.
    pub fn peek_similar<T: Serialize + ?Sized>(
        &self,
        query: &T,
        recall: &RecallQuery,
    ) -> Result<Vec<ScoredEntry>> {
        self.search(query, recall, false)
    }

    fn search<T: Serialize + ?Sized>(
        &self,
        query: &T,
        recall: &RecallQuery,
        track_access: bool,
    ) -> Result<Vec<ScoredEntry>> {
        let query_vector = self.fingerprint(query)?;
        let top_k = recall.top_k.unwrap_or(self.config.retrieval.default_top_k);
        let now = Utc::now();

        let mut scored: Vec<ScoredEntry> = Vec::new();
        for partition in recall.resolved_partitions() {
            if track_access {
                let mut table = self.write_table(partition);
                let hits = self.score_table(&table, &query_vector, recall.min_importance, now);
                for mut hit in hits {
                    if let Some(entry) = table.get_mut(&hit.entry.id) {
                        entry.touch(now);
                        hit.entry.access_count = entry.access_count;
                        hit.entry.last_accessed_at = entry.last_accessed_at;
                    }
                    scored.push(hit);
                }
            } else {
                let table = self.read_table(partition);
                scored.extend(self.score_table(&table, &query_vector, recall.min_importance, now));
            }
        }

        let candidates = scored.len();
        scored.sort_by(rank);
        scored.truncate(top_k);

        debug!(
            candidates,
            returned = scored.len(),
            track_access,
            "similarity search"
        );
        Ok(scored)
    }

    fn score_table(
        &self,
        table: &super::index::PartitionTable,
        query_vector: &[f32],
        min_importance: f64,
        now: DateTime<Utc>,
    ) -> Vec<ScoredEntry> {
        let config = &self.config.retrieval;
        table
            .index()
            .scan(query_vector)
            .filter_map(|(id, similarity)| {
                let entry = table.get(id)?;
                if entry.importance < min_importance {
                    return None;
                }
                let recency = recency_weight(entry.age_days(now), config);
                Some(ScoredEntry {
                    score: composite_score(similarity, entry.importance, recency, config),
                    similarity,
                    recency,
                    entry: entry.clone(),
                })
            })
            .collect()
    }
}
