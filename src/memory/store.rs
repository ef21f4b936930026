//! The memory store: construction, write path, point lookups, and deletion.
//!
//! [`MemoryStore`] owns one [`PartitionTable`] per partition, each behind its own
//! `RwLock`, plus a store-wide id registry. Lock order is always partition tables (in
//! [`Partition::ALL`] order) before the registry; the registry is never held while a
//! table lock is being acquired.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::index::PartitionTable;
use super::types::{clamp_importance, MemoryEntry, Partition, StoreOptions};
use crate::config::StoreConfig;
use crate::db::codec::Sealer;
use crate::embedding::{canonicalize, check_dimension, EmbeddingProvider, HashedEmbedding};
use crate::error::{MemoryError, Result};

/// Partitioned, persistent vector memory.
///
/// All methods take `&self`; share a store between threads with `Arc<MemoryStore>`.
pub struct MemoryStore {
    pub(crate) config: StoreConfig,
    pub(crate) provider: Box<dyn EmbeddingProvider>,
    pub(crate) sealer: Sealer,
    tables: [RwLock<PartitionTable>; 4],
    registry: Mutex<HashMap<String, Partition>>,
    pub(crate) total_stored: AtomicU64,
    pub(crate) total_evicted: AtomicU64,
    pub(crate) last_compression_at: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("db_path", &self.config.storage.db_path)
            .field("dimension", &self.dimension())
            .field("codec", &self.sealer.codec_name())
            .field("len", &self.len())
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store using the hash-seeded embedding. No I/O is performed.
    pub fn new(config: StoreConfig) -> Result<Self> {
        let provider = HashedEmbedding::new(config.embedding.dimension);
        Self::with_provider(config, Box::new(provider))
    }

    /// Create an empty store backed by a custom embedding provider.
    pub fn with_provider(config: StoreConfig, provider: Box<dyn EmbeddingProvider>) -> Result<Self> {
        config.validate()?;
        if provider.dimensions() != config.embedding.dimension {
            return Err(MemoryError::Config(format!(
                "embedding provider produces {} dimensions, config expects {}",
                provider.dimensions(),
                config.embedding.dimension
            )));
        }
        let sealer = Sealer::from_secret(config.persistence.secret.as_deref());

        Ok(Self {
            config,
            provider,
            sealer,
            tables: Partition::ALL.map(|p| RwLock::new(PartitionTable::new(p))),
            registry: Mutex::new(HashMap::new()),
            total_stored: AtomicU64::new(0),
            total_evicted: AtomicU64::new(0),
            last_compression_at: Mutex::new(None),
        })
    }

    /// Create a store and restore any previously saved state from `config.storage.db_path`.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let store = Self::new(config)?;
        let report = store.load()?;
        info!(
            loaded = report.loaded,
            discarded_corrupt = report.discarded_corrupt,
            codec = store.sealer.codec_name(),
            "memory store opened"
        );
        Ok(store)
    }

    /// Consume the store, saving first when `persistence.save_on_shutdown` is set.
    pub fn shutdown(self) -> Result<()> {
        if self.config.persistence.save_on_shutdown {
            self.save()?;
        }
        info!(entries = self.len(), "memory store shut down");
        Ok(())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Configured vector dimension.
    pub fn dimension(&self) -> usize {
        self.config.embedding.dimension
    }

    /// Fingerprint content the same way `store` would, without storing anything.
    pub fn fingerprint<T: Serialize + ?Sized>(&self, content: &T) -> Result<Vec<f32>> {
        let (value, _) = canonicalize(content, self.config.storage.max_content_bytes)?;
        let vector = self.provider.embed(&value)?;
        check_dimension(&vector, self.dimension())?;
        Ok(vector)
    }

    /// Store a new memory and return its id.
    ///
    /// Content is canonicalized and fingerprinted before any lock is taken, so invalid
    /// content never touches state. Inserting may evict other entries from the same
    /// partition through capacity management.
    pub fn store<T: Serialize + ?Sized>(
        &self,
        content: &T,
        partition: Partition,
        options: StoreOptions,
    ) -> Result<String> {
        let (value, size) = canonicalize(content, self.config.storage.max_content_bytes)?;
        let vector = self.provider.embed(&value)?;
        check_dimension(&vector, self.dimension())?;

        let now = Utc::now();
        let (id, evicted) = {
            let mut table = self.write_table(partition);
            let id = self.reserve_id(partition);
            table.insert(MemoryEntry {
                id: id.clone(),
                content: value,
                vector,
                partition,
                importance: clamp_importance(options.importance),
                created_at: now,
                last_accessed_at: now,
                access_count: 0,
                tags: options.tags,
                context: options.context,
            });
            let evicted = self.enforce_capacity(&mut table, now);
            self.release_ids(&evicted);
            (id, evicted)
        };

        self.total_stored.fetch_add(1, Ordering::Relaxed);
        if !evicted.is_empty() {
            self.total_evicted
                .fetch_add(evicted.len() as u64, Ordering::Relaxed);
        }

        debug!(
            memory_id = %id,
            partition = %partition,
            content_bytes = size,
            evicted = evicted.len(),
            "stored memory"
        );
        Ok(id)
    }

    /// Look up an entry by id without touching its access bookkeeping.
    pub fn get(&self, id: &str) -> Option<MemoryEntry> {
        let partition = self.partition_of(id)?;
        let table = self.read_table(partition);
        table.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.partition_of(id).is_some()
    }

    /// Set an entry's importance, clamped into `[0.0, 1.0]`. Returns `false` if absent.
    pub fn update_importance(&self, id: &str, importance: f64) -> bool {
        let Some(partition) = self.partition_of(id) else {
            return false;
        };
        let mut table = self.write_table(partition);
        match table.get_mut(id) {
            Some(entry) => {
                entry.importance = clamp_importance(importance);
                debug!(memory_id = %id, importance = entry.importance, "updated importance");
                true
            }
            None => false,
        }
    }

    /// Remove an entry from its partition's table and index. Returns `false` if absent.
    pub fn delete(&self, id: &str) -> bool {
        let Some(partition) = self.partition_of(id) else {
            return false;
        };
        let mut table = self.write_table(partition);
        let removed = table.remove(id).is_some();
        if removed {
            self.registry().remove(id);
            debug!(memory_id = %id, partition = %partition, "deleted memory");
        }
        removed
    }

    /// Number of entries across all partitions.
    pub fn len(&self) -> usize {
        Partition::ALL
            .iter()
            .map(|p| self.read_table(*p).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries in one partition.
    pub fn partition_len(&self, partition: Partition) -> usize {
        self.read_table(partition).len()
    }

    /// All entries of one partition, oldest first.
    pub fn entries(&self, partition: Partition) -> Vec<MemoryEntry> {
        let table = self.read_table(partition);
        let mut entries: Vec<MemoryEntry> = table.entries().cloned().collect();
        entries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        entries
    }

    // ── Locking helpers ──────────────────────────────────────────────────────

    pub(crate) fn read_table(&self, partition: Partition) -> RwLockReadGuard<'_, PartitionTable> {
        self.tables[partition.slot()]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write_table(&self, partition: Partition) -> RwLockWriteGuard<'_, PartitionTable> {
        self.tables[partition.slot()]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn registry(&self) -> MutexGuard<'_, HashMap<String, Partition>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn partition_of(&self, id: &str) -> Option<Partition> {
        self.registry().get(id).copied()
    }

    /// Generate an id that is unused across every partition and claim it.
    ///
    /// Called while the target table's write lock is held, so a concurrent `load` can
    /// never clear the registry between the claim and the insert.
    fn reserve_id(&self, partition: Partition) -> String {
        loop {
            let id = uuid::Uuid::now_v7().to_string();
            let mut registry = self.registry();
            if !registry.contains_key(&id) {
                registry.insert(id.clone(), partition);
                return id;
            }
            debug!(memory_id = %id, "id collision, regenerating");
        }
    }

    /// Drop evicted ids from the registry. Called while the owning table lock is held.
    pub(crate) fn release_ids(&self, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        let mut registry = self.registry();
        for id in ids {
            registry.remove(id);
        }
    }
}
