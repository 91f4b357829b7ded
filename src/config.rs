//! Configuration for vector-memory
//!
//! Configuration is an explicit value handed to [`crate::MemoryService`] at
//! construction. It is read once; changing it means building a new service.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

/// Which vector backend to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Process-local, exact cosine search over an in-memory map
    Memory,
    /// Process-local LanceDB table on disk
    Lance,
    /// Remote Qdrant collection
    Qdrant,
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "in-memory" | "local" => Ok(BackendKind::Memory),
            "lance" | "lancedb" => Ok(BackendKind::Lance),
            "qdrant" | "remote" => Ok(BackendKind::Qdrant),
            other => Err(Error::config(format!("Unknown backend: {}", other))),
        }
    }
}

/// Which embedding provider to build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingProviderKind {
    /// On-device model via fastembed
    Local,
    /// OpenAI-compatible embeddings endpoint
    Http,
    /// Deterministic feature hashing, no model required
    Hashing,
}

impl FromStr for EmbeddingProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" | "fastembed" => Ok(EmbeddingProviderKind::Local),
            "http" | "openai" => Ok(EmbeddingProviderKind::Http),
            "hashing" | "hash" => Ok(EmbeddingProviderKind::Hashing),
            other => Err(Error::config(format!("Unknown embedding provider: {}", other))),
        }
    }
}

/// Embedding provider settings
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,

    /// Model identifier. Changing it may change the output dimension.
    pub model: String,

    /// Output dimension every stored vector must have
    pub dimensions: usize,

    /// Base URL for the HTTP provider (without the `/embeddings` suffix)
    pub api_url: Option<String>,

    pub api_key: Option<String>,

    /// Inputs longer than this many characters are truncated before embedding
    pub max_input_chars: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Local,
            model: "all-MiniLM-L6-v2".to_string(),
            dimensions: 384, // MiniLM-L6-v2 outputs 384-dim vectors
            api_url: None,
            api_key: None,
            max_input_chars: 8000,
        }
    }
}

/// Configuration for the memory system
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,

    /// Base directory for on-disk backends
    pub data_dir: PathBuf,

    /// Index / table / collection name inside the backend
    pub index_name: String,

    /// Remote backend endpoint, e.g. `http://localhost:6334`
    pub endpoint: Option<String>,

    pub api_key: Option<String>,

    /// Block remote writes until they are searchable
    pub wait_for_writes: bool,

    pub embedding: EmbeddingConfig,

    /// Results returned by `retrieve` when the caller sets no top-k
    pub default_top_k: usize,

    /// Similarity floor applied when the caller sets no threshold
    pub default_min_score: f32,

    /// Size of the `auto_context` window when the caller sets no limit
    pub max_context_memories: usize,

    /// Upper bound for every embedding or backend call
    pub operation_timeout: Duration,

    /// HTTP server port
    pub server_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vector-memory");

        Self {
            backend: BackendKind::Memory,
            data_dir,
            index_name: "strands-multimodal".to_string(),
            endpoint: None,
            api_key: None,
            wait_for_writes: false,
            embedding: EmbeddingConfig::default(),
            default_top_k: 20,
            default_min_score: 0.1,
            max_context_memories: 10,
            operation_timeout: Duration::from_secs(30),
            server_port: 8420,
        }
    }
}

impl Config {
    /// Create a new config with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Read the configuration from process environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, starting from defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(v) = get("VECTOR_MEMORY_BACKEND") {
            config.backend = v.parse()?;
        }
        if let Some(v) = get("VECTOR_MEMORY_DATA_DIR") {
            config.data_dir = PathBuf::from(v);
        }
        if let Some(v) = get("VECTOR_INDEX_NAME") {
            config.index_name = v;
        }
        config.endpoint = get("VECTOR_MEMORY_ENDPOINT").or(config.endpoint);
        config.api_key = get("VECTOR_MEMORY_API_KEY").or(config.api_key);
        if let Some(v) = get("VECTOR_MEMORY_WAIT_FOR_WRITES") {
            config.wait_for_writes = parse_var("VECTOR_MEMORY_WAIT_FOR_WRITES", &v)?;
        }

        if let Some(v) = get("EMBEDDING_PROVIDER") {
            config.embedding.provider = v.parse()?;
        }
        if let Some(v) = get("EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Some(v) = get("EMBEDDING_DIMENSIONS") {
            config.embedding.dimensions = parse_var("EMBEDDING_DIMENSIONS", &v)?;
        }
        config.embedding.api_url = get("EMBEDDING_API_URL").or(config.embedding.api_url);
        config.embedding.api_key = get("EMBEDDING_API_KEY").or(config.embedding.api_key);
        if let Some(v) = get("EMBEDDING_MAX_INPUT_CHARS") {
            config.embedding.max_input_chars = parse_var("EMBEDDING_MAX_INPUT_CHARS", &v)?;
        }

        if let Some(v) = get("MEMORY_TOP_K") {
            config.default_top_k = parse_var("MEMORY_TOP_K", &v)?;
        }
        if let Some(v) = get("MEMORY_MIN_SCORE") {
            config.default_min_score = parse_var("MEMORY_MIN_SCORE", &v)?;
        }
        if let Some(v) = get("MEMORY_MAX_CONTEXT") {
            config.max_context_memories = parse_var("MEMORY_MAX_CONTEXT", &v)?;
        }
        if let Some(v) = get("MEMORY_TIMEOUT_SECS") {
            config.operation_timeout = Duration::from_secs(parse_var("MEMORY_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("MEMORY_SERVER_PORT") {
            config.server_port = parse_var("MEMORY_SERVER_PORT", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values no backend could work with
    pub fn validate(&self) -> Result<()> {
        if self.index_name.trim().is_empty() {
            return Err(Error::config("index name must not be empty"));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::config("embedding dimensions must be positive"));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(Error::config("embedding model must not be empty"));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(Error::config("embedding max input chars must be positive"));
        }
        if self.default_top_k == 0 {
            return Err(Error::config("default top-k must be positive"));
        }
        if !(-1.0..=1.0).contains(&self.default_min_score) {
            return Err(Error::config(format!(
                "default min score {} is outside [-1, 1]",
                self.default_min_score
            )));
        }
        if self.max_context_memories == 0 {
            return Err(Error::config("auto-context window must be positive"));
        }
        if self.operation_timeout.is_zero() {
            return Err(Error::config("operation timeout must be positive"));
        }
        if self.backend == BackendKind::Qdrant && self.endpoint.is_none() {
            return Err(Error::config("qdrant backend requires VECTOR_MEMORY_ENDPOINT"));
        }
        Ok(())
    }

    /// Get the path to the LanceDB database
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(self.lance_path())?;
        Ok(())
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::config(format!("{} has an invalid value: {}", key, value)))
}
