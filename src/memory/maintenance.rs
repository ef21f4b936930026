use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering as AtomicOrdering;
use std::sync::PoisonError;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::index::PartitionTable;
use super::store::MemoryStore;
use super::types::{clamp_importance, MemoryEntry, Partition};
use crate::error::{MemoryError, Result};

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CompressResult {
    pub partition: Partition,
    pub before: usize,
    pub retained: usize,
    pub evicted_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResult {
    pub candidates: Vec<CleanupCandidate>,
    pub deleted: usize,
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupCandidate {
    pub id: String,
    pub partition: Partition,
    pub importance: f64,
    pub last_accessed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct DecayResult {
    pub affected_by_partition: BTreeMap<String, usize>,
}

// ── Scoring ──────────────────────────────────────────────────────────────────

/// Retention value used by compression: importance dominates, frequent access helps,
/// long idleness hurts.
pub fn retention_score(entry: &MemoryEntry, now: DateTime<Utc>) -> f64 {
    0.6 * entry.importance + 0.2 * (entry.access_count as f64 / 100.0)
        - 0.2 * (entry.idle_days(now) / 30.0)
}

/// How many of `len` entries survive a compression at `ratio`.
///
/// The small epsilon keeps `10 * (1 - 0.9)` from flooring to zero.
fn retain_count(len: usize, ratio: f64) -> usize {
    ((len as f64) * (1.0 - ratio) + 1e-9).floor() as usize
}

fn check_ratio(ratio: f64) -> Result<()> {
    if ratio > 0.0 && ratio < 1.0 {
        Ok(())
    } else {
        Err(MemoryError::InvalidRatio(ratio))
    }
}

/// Keep the `keep` highest-retention entries of `table`, removing the rest.
///
/// Ties keep the newer entry. Returns the removed ids.
fn retain_top(table: &mut PartitionTable, keep: usize, now: DateTime<Utc>) -> Vec<String> {
    if table.len() <= keep {
        return Vec::new();
    }
    let mut ranked: Vec<(f64, DateTime<Utc>, String)> = table
        .entries()
        .map(|e| (retention_score(e, now), e.created_at, e.id.clone()))
        .collect();
    ranked.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    ranked
        .into_iter()
        .skip(keep)
        .filter_map(|(_, _, id)| table.remove(&id).map(|e| e.id))
        .collect()
}

impl MemoryStore {
    // ── Capacity ─────────────────────────────────────────────────────────────

    /// Apply the partition's capacity policy after an insert. Returns evicted ids.
    ///
    /// `working` is hard-capped, evicting oldest first. `episodic` is soft-capped:
    /// overflowing runs a compression pass at `auto_compress_ratio`, never leaving more
    /// than `episodic_max` entries behind.
    pub(crate) fn enforce_capacity(&self, table: &mut PartitionTable, now: DateTime<Utc>) -> Vec<String> {
        let caps = &self.config.capacity;
        match table.partition() {
            Partition::Working => {
                let mut evicted = Vec::new();
                while table.len() > caps.working_max {
                    let Some(oldest) = table.oldest_id() else { break };
                    if table.remove(&oldest).is_some() {
                        debug!(memory_id = %oldest, "evicted oldest working memory");
                        evicted.push(oldest);
                    }
                }
                evicted
            }
            Partition::Episodic if table.len() > caps.episodic_max => {
                let before = table.len();
                let keep = retain_count(before, caps.auto_compress_ratio).min(caps.episodic_max);
                let evicted = retain_top(table, keep, now);
                self.mark_compressed(now);
                info!(
                    partition = %Partition::Episodic,
                    before,
                    retained = table.len(),
                    "episodic capacity exceeded, compressed"
                );
                evicted
            }
            _ => Vec::new(),
        }
    }

    fn mark_compressed(&self, now: DateTime<Utc>) {
        *self
            .last_compression_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(now);
    }

    fn record_evictions(&self, count: usize) {
        if count > 0 {
            self.total_evicted
                .fetch_add(count as u64, AtomicOrdering::Relaxed);
        }
    }

    // ── Compression ──────────────────────────────────────────────────────────

    /// Shed the lowest-retention `ratio` fraction of a partition.
    ///
    /// `ratio` must lie strictly between 0 and 1; anything else fails with
    /// `InvalidRatio` before the partition is touched.
    pub fn compress(&self, partition: Partition, ratio: f64) -> Result<CompressResult> {
        check_ratio(ratio)?;
        let now = Utc::now();

        let result = {
            let mut table = self.write_table(partition);
            let before = table.len();
            let evicted_ids = retain_top(&mut table, retain_count(before, ratio), now);
            self.release_ids(&evicted_ids);
            CompressResult {
                partition,
                before,
                retained: table.len(),
                evicted_ids,
            }
        };

        self.record_evictions(result.evicted_ids.len());
        self.mark_compressed(now);
        info!(
            partition = %partition,
            ratio,
            before = result.before,
            retained = result.retained,
            "compressed partition"
        );
        Ok(result)
    }

    /// Compress every partition at the same ratio.
    pub fn compress_all(&self, ratio: f64) -> Result<Vec<CompressResult>> {
        check_ratio(ratio)?;
        Partition::ALL
            .into_iter()
            .map(|p| self.compress(p, ratio))
            .collect()
    }

    // ── Cleanup ──────────────────────────────────────────────────────────────

    /// Find and optionally delete stale, low-importance memories.
    ///
    /// Candidates: importance < `cleanup_importance_floor` AND not accessed for at least
    /// `cleanup_no_access_days`. In dry_run mode, returns candidates without deleting.
    pub fn cleanup(&self, dry_run: bool) -> CleanupResult {
        let floor = self.config.maintenance.cleanup_importance_floor;
        let max_idle = self.config.maintenance.cleanup_no_access_days as f64;
        let now = Utc::now();

        let mut candidates = Vec::new();
        let mut deleted = 0;
        for partition in Partition::ALL {
            let mut table = self.write_table(partition);
            let stale: Vec<CleanupCandidate> = table
                .entries()
                .filter(|e| e.importance < floor && e.idle_days(now) >= max_idle)
                .map(|e| CleanupCandidate {
                    id: e.id.clone(),
                    partition,
                    importance: e.importance,
                    last_accessed_at: e.last_accessed_at,
                    created_at: e.created_at,
                })
                .collect();

            if !dry_run {
                let removed: Vec<String> = stale
                    .iter()
                    .filter_map(|c| table.remove(&c.id).map(|e| e.id))
                    .collect();
                self.release_ids(&removed);
                deleted += removed.len();
            }
            candidates.extend(stale);
        }

        self.record_evictions(deleted);
        info!(candidates = candidates.len(), deleted, dry_run, "cleanup finished");
        CleanupResult {
            candidates,
            deleted,
            dry_run,
        }
    }

    // ── Importance Decay ─────────────────────────────────────────────────────

    /// Multiply every entry's importance by its partition's decay factor.
    ///
    /// Episodic memories decay faster (default 0.95) than the other partitions (0.99).
    /// Entries already at zero are left alone.
    pub fn apply_decay(&self) -> DecayResult {
        let maintenance = &self.config.maintenance;
        let mut affected_by_partition = BTreeMap::new();

        for partition in Partition::ALL {
            let factor = match partition {
                Partition::Episodic => maintenance.episodic_decay_factor,
                _ => maintenance.default_decay_factor,
            };
            let mut table = self.write_table(partition);
            let mut affected = 0;
            for entry in table.entries_mut().filter(|e| e.importance > 0.0) {
                entry.importance = clamp_importance(entry.importance * factor);
                affected += 1;
            }
            affected_by_partition.insert(partition.as_str().to_string(), affected);
        }

        debug!(?affected_by_partition, "applied importance decay");
        DecayResult {
            affected_by_partition,
        }
    }
}
