use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct StoreConfig {
    pub logging: LoggingConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub capacity: CapacityConfig,
    pub maintenance: MaintenanceConfig,
    pub persistence: PersistenceConfig,
}

/// Log level for hosts that install a `tracing` subscriber. The library itself never does.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    /// Upper bound on the canonical JSON size of a single content value.
    pub max_content_bytes: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    pub similarity_weight: f64,
    pub importance_weight: f64,
    pub recency_weight: f64,
    pub recency_window_days: f64,
    pub recency_floor: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CapacityConfig {
    /// Hard cap for the `working` partition; oldest entries are evicted first.
    pub working_max: usize,
    /// Soft cap for the `episodic` partition; exceeding it triggers a compression pass.
    pub episodic_max: usize,
    pub auto_compress_ratio: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub episodic_decay_factor: f64,
    pub default_decay_factor: f64,
    pub cleanup_importance_floor: f64,
    pub cleanup_no_access_days: u64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CorruptStatePolicy {
    /// Surface a `PersistenceFailure` from `load()`.
    Fail,
    /// Log a warning, discard the unreadable state, and start empty.
    StartEmpty,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersistenceConfig {
    /// When set, persisted payloads are sealed with AES-256-GCM under a key derived from it.
    pub secret: Option<String>,
    pub on_corrupt: CorruptStatePolicy,
    pub save_on_shutdown: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let db_path = default_memvault_dir()
            .join("memory.db")
            .to_string_lossy()
            .into_owned();
        Self {
            db_path,
            max_content_bytes: 64 * 1024,
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self { dimension: 384 }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            similarity_weight: 0.6,
            importance_weight: 0.3,
            recency_weight: 0.1,
            recency_window_days: 30.0,
            recency_floor: 0.1,
        }
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            working_max: 20,
            episodic_max: 1000,
            auto_compress_ratio: 0.2,
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            episodic_decay_factor: 0.95,
            default_decay_factor: 0.99,
            cleanup_importance_floor: 0.05,
            cleanup_no_access_days: 90,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            secret: None,
            on_corrupt: CorruptStatePolicy::Fail,
            save_on_shutdown: true,
        }
    }
}

/// Returns `~/.memvault/`, or `./.memvault/` when no home directory can be determined.
pub fn default_memvault_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".memvault")
}

/// Returns the default config file path: `~/.memvault/config.toml`
pub fn default_config_path() -> PathBuf {
    default_memvault_dir().join("config.toml")
}

impl StoreConfig {
    /// Load config from TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides and validate.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            StoreConfig::default()
        };

        config.apply_env_overrides();
        config.validate().context("invalid memvault configuration")?;
        Ok(config)
    }

    /// Config rooted at a specific database file, everything else default.
    pub fn with_db_path(path: impl AsRef<Path>) -> Self {
        let mut config = Self::default();
        config.storage.db_path = path.as_ref().to_string_lossy().into_owned();
        config
    }

    /// Apply environment variable overrides (MEMVAULT_DB, MEMVAULT_SECRET, MEMVAULT_LOG_LEVEL).
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("MEMVAULT_DB") {
            self.storage.db_path = val;
        }
        if let Ok(val) = std::env::var("MEMVAULT_SECRET") {
            self.persistence.secret = Some(val);
        }
        if let Ok(val) = std::env::var("MEMVAULT_LOG_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Reject configurations the store cannot honor.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::MemoryError;

        if self.embedding.dimension == 0 {
            return Err(MemoryError::Config("embedding.dimension must be > 0".into()));
        }
        let r = &self.retrieval;
        let weights = [r.similarity_weight, r.importance_weight, r.recency_weight];
        if weights.iter().any(|w| *w < 0.0) {
            return Err(MemoryError::Config("retrieval weights must be non-negative".into()));
        }
        let sum: f64 = weights.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(MemoryError::Config(format!(
                "retrieval weights must sum to 1.0 (got {sum})"
            )));
        }
        if r.recency_window_days <= 0.0 || !(0.0..=1.0).contains(&r.recency_floor) {
            return Err(MemoryError::Config(
                "recency_window_days must be > 0 and recency_floor within [0, 1]".into(),
            ));
        }
        let c = &self.capacity;
        if c.working_max == 0 || c.episodic_max == 0 {
            return Err(MemoryError::Config("partition caps must be > 0".into()));
        }
        if !(c.auto_compress_ratio > 0.0 && c.auto_compress_ratio < 1.0) {
            return Err(MemoryError::Config(
                "capacity.auto_compress_ratio must be strictly between 0 and 1".into(),
            ));
        }
        if self.persistence.secret.as_deref() == Some("") {
            return Err(MemoryError::Config("persistence.secret must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve the database path, expanding `~` if needed.
    pub fn resolved_db_path(&self) -> PathBuf {
        expand_tilde(&self.storage.db_path)
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}
