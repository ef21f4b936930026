#![allow(dead_code)]

use std::path::PathBuf;

use chrono::{Duration, SecondsFormat, Utc};
use memvault::{MemoryStore, StoreConfig};
use rusqlite::{params, Connection};
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

/// Install a test-friendly tracing subscriber once per process, filtered by the
/// configured `logging.level` (`MEMVAULT_LOG_LEVEL` overrides it through config loading).
pub fn init_tracing(config: &StoreConfig) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// Config rooted in `tmp` with a small vector dimension to keep tests fast.
pub fn test_config(tmp: &TempDir) -> StoreConfig {
    let mut config = StoreConfig::with_db_path(tmp.path().join("memvault.db"));
    config.embedding.dimension = 64;
    config.logging.level = "memvault=debug".into();
    init_tracing(&config);
    config
}

/// A fresh, empty store saving into `tmp`.
pub fn test_store(tmp: &TempDir) -> MemoryStore {
    MemoryStore::new(test_config(tmp)).unwrap()
}

pub fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("memvault.db")
}

/// Rewrite a saved entry's timestamps to simulate aging. Reload the store afterwards.
pub fn backdate_memory(tmp: &TempDir, id: &str, days_ago: i64) {
    let old_date = (Utc::now() - Duration::days(days_ago)).to_rfc3339_opts(SecondsFormat::Nanos, true);
    let conn = Connection::open(db_path(tmp)).unwrap();
    let changed = conn
        .execute(
            "UPDATE memories SET created_at = ?1, last_accessed_at = ?1 WHERE id = ?2",
            params![old_date, id],
        )
        .unwrap();
    assert_eq!(changed, 1, "memory {id} not found on disk");
}
