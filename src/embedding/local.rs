//! Embedding generation using fastembed (local, no API keys)

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;
use tracing::info;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

/// Embedding service running an on-device model
pub struct LocalEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimensions: usize,
}

impl LocalEmbedder {
    /// Load the configured model. It downloads to ~/.cache/fastembed on first use.
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (model_id, native) = fastembed_model(&config.model)?;
        if native != config.dimensions {
            return Err(Error::config(format!(
                "Model {} produces {}-dim vectors but {} dimensions are configured",
                config.model, native, config.dimensions
            )));
        }
        info!("Loading local embedding model {}", config.model);

        let model = TextEmbedding::try_new(
            InitOptions::new(model_id).with_show_download_progress(true),
        )
        .map_err(|e| Error::embedding(format!("Failed to load embedding model: {}", e)))?;

        Ok(Self {
            model: Arc::new(Mutex::new(model)),
            model_name: config.model.clone(),
            dimensions: config.dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedder {
    fn model(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let model = self.model.clone();
        let text = text.to_string();

        // Inference is CPU bound; keep it off the async workers
        let embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = model.blocking_lock();
            guard.embed(vec![text], None)
        })
        .await
        .map_err(|e| Error::embedding(format!("Embedding task failed: {}", e)))?
        .map_err(|e| Error::embedding(format!("Embedding failed: {}", e)))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::embedding("No embedding returned"))
    }
}

/// Map a configured model identifier onto a fastembed model and its output dimension
fn fastembed_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    let model = match name.trim().to_lowercase().as_str() {
        "all-minilm-l6-v2" | "sentence-transformers/all-minilm-l6-v2" => {
            (EmbeddingModel::AllMiniLML6V2, 384)
        }
        "all-minilm-l12-v2" | "sentence-transformers/all-minilm-l12-v2" => {
            (EmbeddingModel::AllMiniLML12V2, 384)
        }
        "bge-small-en-v1.5" | "baai/bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" | "baai/bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" | "baai/bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "nomic-embed-text-v1.5" | "nomic-ai/nomic-embed-text-v1.5" => {
            (EmbeddingModel::NomicEmbedTextV15, 768)
        }
        "multilingual-e5-small" | "intfloat/multilingual-e5-small" => {
            (EmbeddingModel::MultilingualE5Small, 384)
        }
        other => {
            return Err(Error::config(format!(
                "Unsupported local embedding model: {}",
                other
            )))
        }
    };
    Ok(model)
}
