//! Core memory type definitions.
//!
//! Defines [`Partition`] (the four closed partition tags), [`MemoryEntry`] (a full
//! record), and [`StoreOptions`] (caller-supplied attributes for a new entry).

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::MemoryError;

/// The four memory partitions. The set is closed; anything else is `UnknownPartition`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Events and experiences. Soft-capped: overflowing triggers compression.
    Episodic,
    /// Workflows and how-to knowledge.
    Procedural,
    /// Facts and general knowledge.
    Semantic,
    /// Short-lived scratch items. Hard-capped: oldest evicted first.
    Working,
}

impl Partition {
    /// Every partition, in the fixed order used for lock acquisition.
    pub const ALL: [Partition; 4] = [
        Partition::Episodic,
        Partition::Procedural,
        Partition::Semantic,
        Partition::Working,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Episodic => "episodic",
            Self::Procedural => "procedural",
            Self::Semantic => "semantic",
            Self::Working => "working",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        match self {
            Self::Episodic => 0,
            Self::Procedural => 1,
            Self::Semantic => 2,
            Self::Working => 3,
        }
    }
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Partition {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "episodic" => Ok(Self::Episodic),
            "procedural" => Ok(Self::Procedural),
            "semantic" => Ok(Self::Semantic),
            "working" => Ok(Self::Working),
            _ => Err(MemoryError::UnknownPartition(s.to_string())),
        }
    }
}

/// A stored memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// UUID v7 (time-sortable), unique across the whole store.
    pub id: String,
    /// The caller's payload, in canonical JSON form.
    pub content: Value,
    /// Unit-normalized fingerprint of `content`, fixed at creation.
    pub vector: Vec<f32>,
    pub partition: Partition,
    /// Importance in `[0.0, 1.0]`.
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    /// Equal to `created_at` until the first retrieval touches the entry.
    pub last_accessed_at: DateTime<Utc>,
    /// Number of retrieval passes that scored this entry.
    pub access_count: u64,
    pub tags: BTreeSet<String>,
    pub context: Map<String, Value>,
}

impl MemoryEntry {
    /// Whole days elapsed between `since` and `now`, as a fraction.
    pub(crate) fn days_between(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let secs = (now - since).num_milliseconds() as f64 / 1000.0;
        (secs / 86_400.0).max(0.0)
    }

    pub(crate) fn age_days(&self, now: DateTime<Utc>) -> f64 {
        Self::days_between(self.created_at, now)
    }

    pub(crate) fn idle_days(&self, now: DateTime<Utc>) -> f64 {
        Self::days_between(self.last_accessed_at, now)
    }

    /// Record one retrieval pass.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.access_count = self.access_count.saturating_add(1);
        self.last_accessed_at = now;
    }
}

/// Clamp an importance value into `[0.0, 1.0]`. NaN is treated as the lower bound.
pub fn clamp_importance(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Caller-supplied attributes for [`MemoryStore::store`](crate::memory::store::MemoryStore::store).
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Clamped into `[0.0, 1.0]` on insert.
    pub importance: f64,
    pub tags: BTreeSet<String>,
    pub context: Map<String, Value>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            importance: 0.5,
            tags: BTreeSet::new(),
            context: Map::new(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn importance(mut self, importance: f64) -> Self {
        self.importance = importance;
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_round_trips_through_str() {
        for p in Partition::ALL {
            assert_eq!(p.as_str().parse::<Partition>().unwrap(), p);
            assert_eq!(p.to_string(), p.as_str());
        }
    }

    #[test]
    fn unknown_partition_is_rejected() {
        let err = "longterm".parse::<Partition>().unwrap_err();
        assert!(matches!(err, MemoryError::UnknownPartition(ref s) if s == "longterm"));
    }

    #[test]
    fn partition_slots_are_distinct() {
        let slots: Vec<usize> = Partition::ALL.iter().map(|p| p.slot()).collect();
        assert_eq!(slots, vec![0, 1, 2, 3]);
    }

    #[test]
    fn clamp_importance_bounds() {
        assert_eq!(clamp_importance(-0.3), 0.0);
        assert_eq!(clamp_importance(1.7), 1.0);
        assert_eq!(clamp_importance(0.42), 0.42);
        assert_eq!(clamp_importance(f64::NAN), 0.0);
    }

    #[test]
    fn store_options_builder() {
        let opts = StoreOptions::new()
            .importance(0.9)
            .tag("a")
            .tags(["b", "a"])
            .context("source", "unit-test");
        assert_eq!(opts.importance, 0.9);
        assert_eq!(opts.tags.len(), 2);
        assert_eq!(opts.context["source"], "unit-test");
    }

    #[test]
    fn days_between_is_never_negative() {
        let now = Utc::now();
        let later = now + chrono::Duration::days(2);
        assert_eq!(MemoryEntry::days_between(later, now), 0.0);
        assert!((MemoryEntry::days_between(now, later) - 2.0).abs() < 1e-9);
    }
}
