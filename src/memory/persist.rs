//! Saving and restoring the whole store.
//!
//! `save` snapshots every partition under read locks, then writes outside of them; `load`
//! reads and verifies everything first, then swaps the in-memory state under write locks.
//! Neither ever leaves the store half-replaced.

use std::sync::atomic::Ordering;
use std::sync::PoisonError;

use serde::Serialize;
use tracing::{info, warn};

use super::store::MemoryStore;
use super::types::Partition;
use crate::config::CorruptStatePolicy;
use crate::db::{self, Snapshot, StoreMeta};
use crate::error::{MemoryError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub saved: usize,
    pub codec: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    /// Entries restored into the store.
    pub loaded: usize,
    /// Whether a database file was present at all.
    pub existed: bool,
    /// Set when persisted state failed verification and was discarded under
    /// `on_corrupt = "start_empty"`.
    pub discarded_corrupt: bool,
}

impl MemoryStore {
    /// Write the full store to `storage.db_path`, replacing anything saved before.
    pub fn save(&self) -> Result<SaveReport> {
        let snapshot = self.snapshot();
        let path = self.config.resolved_db_path();

        let mut conn = db::open_database(&path)?;
        db::write_snapshot(&mut conn, &snapshot, &self.sealer)?;

        info!(
            path = %path.display(),
            entries = snapshot.entries.len(),
            codec = self.sealer.codec_name(),
            "memory store saved"
        );
        Ok(SaveReport {
            saved: snapshot.entries.len(),
            codec: self.sealer.codec_name(),
        })
    }

    /// Replace in-memory state with what is saved at `storage.db_path`.
    ///
    /// A missing file yields an empty store. State that fails verification is an error
    /// unless `persistence.on_corrupt` is `start_empty`, in which case the store is emptied
    /// and the report says so.
    pub fn load(&self) -> Result<LoadReport> {
        let path = self.config.resolved_db_path();
        if !path.exists() {
            self.replace_state(None);
            return Ok(LoadReport::default());
        }

        let read = db::open_database(&path)
            .and_then(|conn| db::read_snapshot(&conn, &self.sealer, self.dimension()));

        match read {
            Ok(snapshot) => {
                let loaded = snapshot.as_ref().map_or(0, |s| s.entries.len());
                self.replace_state(snapshot);
                info!(path = %path.display(), loaded, "memory store loaded");
                Ok(LoadReport {
                    loaded,
                    existed: true,
                    discarded_corrupt: false,
                })
            }
            Err(MemoryError::PersistenceFailure(reason))
                if self.config.persistence.on_corrupt == CorruptStatePolicy::StartEmpty =>
            {
                warn!(path = %path.display(), %reason, "persisted state is corrupt, starting empty");
                self.replace_state(None);
                Ok(LoadReport {
                    loaded: 0,
                    existed: true,
                    discarded_corrupt: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    fn snapshot(&self) -> Snapshot {
        let tables: Vec<_> = Partition::ALL.iter().map(|p| self.read_table(*p)).collect();
        let mut entries: Vec<_> = tables
            .iter()
            .flat_map(|t| t.entries().cloned())
            .collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        Snapshot {
            entries,
            meta: StoreMeta {
                dimension: self.dimension(),
                codec: self.sealer.codec_name().to_string(),
                total_stored: self.total_stored.load(Ordering::Relaxed),
                total_evicted: self.total_evicted.load(Ordering::Relaxed),
                last_compression_at: *self
                    .last_compression_at
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner),
            },
        }
    }

    /// Swap in a verified snapshot (or nothing), rebuilding every index.
    fn replace_state(&self, snapshot: Option<Snapshot>) {
        let mut tables: Vec<_> = Partition::ALL.iter().map(|p| self.write_table(*p)).collect();
        let mut registry = self.registry();

        for table in tables.iter_mut() {
            table.clear();
        }
        registry.clear();

        let Some(snapshot) = snapshot else {
            self.total_stored.store(0, Ordering::Relaxed);
            self.total_evicted.store(0, Ordering::Relaxed);
            *self
                .last_compression_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = None;
            return;
        };

        // Entries arrive oldest first, so insertion order matches the original.
        for entry in snapshot.entries {
            registry.insert(entry.id.clone(), entry.partition);
            tables[entry.partition.slot()].insert(entry);
        }
        self.total_stored
            .store(snapshot.meta.total_stored, Ordering::Relaxed);
        self.total_evicted
            .store(snapshot.meta.total_evicted, Ordering::Relaxed);
        *self
            .last_compression_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = snapshot.meta.last_compression_at;
    }
}
