//! Deterministic feature-hashing embedder (no model, no network)

use async_trait::async_trait;

use super::EmbeddingProvider;
use crate::error::{Error, Result};

/// Hashes lower-cased word tokens into a fixed number of buckets.
///
/// Texts sharing words score above zero; unrelated texts score near zero.
/// Identical texts always produce identical vectors.
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimensions];
        let mut tokens = 0usize;

        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let token = token.to_lowercase();
            let bucket = (fnv1a_hash(token.as_bytes()) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
            tokens += 1;
        }

        if tokens == 0 {
            return Err(Error::embedding("Text has no embeddable tokens"));
        }

        let magnitude = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        for v in &mut vector {
            *v /= magnitude;
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn model(&self) -> &str {
        "feature-hashing"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text)
    }
}

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = FNV_OFFSET_BASIS;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::cosine_similarity;

    #[test]
    fn test_deterministic_and_normalized() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_text("AWS Lambda supports provisioned concurrency").unwrap();
        let b = embedder.embed_text("aws lambda SUPPORTS provisioned, concurrency!").unwrap();
        assert_eq!(a, b);

        let norm = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_shared_words_score_higher() {
        let embedder = HashingEmbedder::new(384);
        let stored = embedder.embed_text("AWS Lambda supports provisioned concurrency").unwrap();
        let related = embedder.embed_text("Lambda cold starts").unwrap();

        assert!(cosine_similarity(&stored, &stored) > 0.999);
        assert!(cosine_similarity(&stored, &related) > 0.1);
    }

    #[test]
    fn test_no_tokens_is_an_error() {
        let embedder = HashingEmbedder::new(16);
        assert!(matches!(embedder.embed_text("  ?! "), Err(Error::Embedding(_))));
    }
}
