//! Embedding providers
//!
//! The core only needs `embed(text) -> vector`. Providers are interchangeable
//! behind [`EmbeddingProvider`]; [`Embedder`] wraps whichever one is configured
//! with input truncation, a timeout, and output validation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{Config, EmbeddingProviderKind};
use crate::error::{bounded, Error, Result};

mod hashing;
mod http;
mod local;

pub use hashing::HashingEmbedder;
pub use http::HttpEmbedder;
pub use local::LocalEmbedder;

/// Converts text into a fixed-dimension vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier the vectors come from
    fn model(&self) -> &str;

    /// Dimension of every returned vector
    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Build the provider selected by `config.embedding.provider`
pub fn create_provider(config: &Config) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedding = &config.embedding;
    let provider: Arc<dyn EmbeddingProvider> = match embedding.provider {
        EmbeddingProviderKind::Local => Arc::new(LocalEmbedder::new(embedding)?),
        EmbeddingProviderKind::Http => {
            Arc::new(HttpEmbedder::new(embedding, config.operation_timeout)?)
        }
        EmbeddingProviderKind::Hashing => Arc::new(HashingEmbedder::new(embedding.dimensions)),
    };
    Ok(provider)
}

/// Checked, time-bounded access to an [`EmbeddingProvider`]
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    max_input_chars: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, max_input_chars: usize, timeout: Duration) -> Self {
        Self {
            provider,
            max_input_chars,
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed `text`, failing rather than returning a degenerate vector
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = truncate_chars(text, self.max_input_chars);
        let vector = bounded("embedding", self.timeout, self.provider.embed(input)).await?;
        validate_vector(&vector, self.provider.dimensions())?;
        Ok(vector)
    }
}

/// Longest prefix of `text` with at most `max_chars` characters
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

fn validate_vector(vector: &[f32], expected_dimensions: usize) -> Result<()> {
    if vector.is_empty() {
        return Err(Error::embedding("No embedding returned"));
    }
    if vector.len() != expected_dimensions {
        return Err(Error::embedding(format!(
            "Embedding has {} dimensions, expected {}",
            vector.len(),
            expected_dimensions
        )));
    }
    if vector.iter().any(|v| !v.is_finite()) {
        return Err(Error::embedding("Embedding contains non-finite values"));
    }
    if vector.iter().all(|v| *v == 0.0) {
        return Err(Error::embedding("Embedding is a zero vector"));
    }
    Ok(())
}
