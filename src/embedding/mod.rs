//! Content-to-vector fingerprinting.
//!
//! Provides the [`EmbeddingProvider`] trait and a deterministic hash-seeded
//! implementation ([`hashed::HashedEmbedding`]). Providers receive content already
//! reduced to a canonical [`serde_json::Value`] by [`canonicalize`], so anything that
//! can't be serialized is rejected before a provider ever sees it.

pub mod hashed;

use serde::Serialize;
use serde_json::Value;

use crate::error::{MemoryError, Result};

pub use hashed::HashedEmbedding;

/// Trait for turning content into fixed-length, L2-normalized vectors.
///
/// Implementations must be deterministic: the same content yields a bit-identical
/// vector across calls and process restarts. A learned model can be substituted here
/// without any other part of the store changing.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single canonical content value.
    fn embed(&self, content: &Value) -> Result<Vec<f32>>;

    /// Embed a batch of values. Implementations may override for batched inference.
    fn embed_batch(&self, contents: &[Value]) -> Result<Vec<Vec<f32>>> {
        contents.iter().map(|c| self.embed(c)).collect()
    }

    /// Return the number of dimensions this provider produces.
    fn dimensions(&self) -> usize;
}

/// Convert arbitrary serializable content into its canonical JSON form.
///
/// Returns the value and its serialized size in bytes. serde_json keeps object keys
/// sorted, so two structurally equal values always produce the same bytes.
pub fn canonicalize<T: Serialize + ?Sized>(content: &T, max_bytes: usize) -> Result<(Value, usize)> {
    let value = serde_json::to_value(content)
        .map_err(|e| MemoryError::InvalidContent(format!("content is not serializable: {e}")))?;
    let size = serde_json::to_vec(&value)
        .map_err(|e| MemoryError::InvalidContent(format!("content is not serializable: {e}")))?
        .len();
    if size > max_bytes {
        return Err(MemoryError::InvalidContent(format!(
            "content is {size} bytes, limit is {max_bytes}"
        )));
    }
    Ok((value, size))
}

/// Dot product accumulated in f64. For unit vectors this is cosine similarity.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Euclidean norm accumulated in f64.
pub fn l2_norm(v: &[f32]) -> f64 {
    v.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt()
}

/// Check a provider's output against the store's configured dimension.
pub(crate) fn check_dimension(vector: &[f32], expected: usize) -> Result<()> {
    if vector.len() != expected {
        return Err(MemoryError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}
