//! Partitioned, persistent vector memory for agents.
//!
//! memvault keeps arbitrary serializable content in four partitions, each with its own
//! retention behavior:
//!
//! | Partition | Purpose | Capacity | Decay |
//! |-----------|---------|----------|-------|
//! | **Episodic** | Events, session logs | Soft cap, auto-compressed | Fast (0.95/cycle) |
//! | **Semantic** | Facts, preferences | Unbounded | Slow (0.99/cycle) |
//! | **Procedural** | Workflows, how-to | Unbounded | Slow (0.99/cycle) |
//! | **Working** | Scratch context | Hard cap, oldest evicted | Slow (0.99/cycle) |
//!
//! Every entry carries a deterministic fingerprint vector. Retrieval ranks candidates by
//! a weighted blend of cosine similarity, importance, and recency.
//!
//! # Architecture
//!
//! - **Storage**: in-memory tables, one lock per partition, saved to SQLite as a full
//!   snapshot with payloads optionally sealed by AES-256-GCM
//! - **Fingerprints**: SHA-256 of canonical JSON, expanded and L2-normalized
//! - **Search**: linear scan per partition, merged and ranked across partitions
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: SQLite snapshot persistence, schema, and at-rest encoding
//! - [`embedding`]: Content canonicalization and fingerprinting
//! - [`error`]: The crate-wide error type
//! - [`memory`]: Core memory engine: store, search, maintenance, stats, and persistence

pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod memory;

pub use config::StoreConfig;
pub use error::{MemoryError, Result};
pub use memory::search::{RecallQuery, ScoredEntry};
pub use memory::store::MemoryStore;
pub use memory::types::{MemoryEntry, Partition, StoreOptions};
