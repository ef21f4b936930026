//! Deterministic hash-seeded embedding provider.
//!
//! Implements [`EmbeddingProvider`] by hashing the canonical JSON of the content with
//! SHA-256 and expanding the digest in counter mode into a pseudo-random vector, which is
//! then L2-normalized. The vectors carry no semantic meaning: identical content maps to
//! identical vectors and everything else is effectively uncorrelated.

use serde_json::Value;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;
use crate::error::{MemoryError, Result};

/// Hash-seeded stand-in for a learned embedding model.
#[derive(Debug, Clone)]
pub struct HashedEmbedding {
    dimension: usize,
}

impl HashedEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    /// Expand a seed digest into `dimension` values uniformly spread over [-1, 1].
    fn expand(&self, seed: &[u8]) -> Vec<f64> {
        let mut values = Vec::with_capacity(self.dimension);
        let mut counter: u64 = 0;
        while values.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            let block = hasher.finalize();
            for chunk in block.chunks_exact(4) {
                if values.len() == self.dimension {
                    break;
                }
                let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                values.push(f64::from(word) / f64::from(u32::MAX) * 2.0 - 1.0);
            }
            counter += 1;
        }
        values
    }
}

impl EmbeddingProvider for HashedEmbedding {
    fn embed(&self, content: &Value) -> Result<Vec<f32>> {
        let bytes = serde_json::to_vec(content)
            .map_err(|e| MemoryError::InvalidContent(format!("content is not serializable: {e}")))?;
        let seed = Sha256::digest(&bytes);
        let raw = self.expand(&seed);

        let norm = raw.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm == 0.0 {
            // All-zero expansion: fall back to the first basis vector.
            let mut v = vec![0.0f32; self.dimension];
            if let Some(first) = v.first_mut() {
                *first = 1.0;
            }
            return Ok(v);
        }
        Ok(raw.iter().map(|x| (x / norm) as f32).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{dot, l2_norm};
    use serde_json::json;

    #[test]
    fn test_embed_produces_configured_dims() {
        for dim in [1, 7, 8, 384, 1000] {
            let provider = HashedEmbedding::new(dim);
            let v = provider.embed(&json!({"msg": "hello"})).unwrap();
            assert_eq!(v.len(), dim);
            assert_eq!(provider.dimensions(), dim);
        }
    }

    #[test]
    fn test_embed_is_l2_normalized() {
        let provider = HashedEmbedding::new(384);
        for content in [json!(null), json!(""), json!({"msg": "hello"}), json!([1, 2, 3])] {
            let v = provider.embed(&content).unwrap();
            let norm = l2_norm(&v);
            assert!((norm - 1.0).abs() < 1e-6, "L2 norm should be ~1.0, got {norm}");
        }
    }

    #[test]
    fn test_embed_consistency() {
        let provider = HashedEmbedding::new(384);
        let a = provider.embed(&json!({"msg": "hello"})).unwrap();
        let b = HashedEmbedding::new(384).embed(&json!({"msg": "hello"})).unwrap();
        assert_eq!(a, b, "same input must produce identical output");
    }

    #[test]
    fn test_different_content_diverges() {
        let provider = HashedEmbedding::new(384);
        let a = provider.embed(&json!({"msg": "hello"})).unwrap();
        let b = provider.embed(&json!({"msg": "goodbye"})).unwrap();
        assert_ne!(a, b);
        assert!(dot(&a, &b) < 0.5);
    }

    #[test]
    fn test_embed_batch() {
        let provider = HashedEmbedding::new(16);
        let batch = provider
            .embed_batch(&[json!("first"), json!("second")])
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0], provider.embed(&json!("first")).unwrap());
    }
}
