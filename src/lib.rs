//! # Vector Memory
//!
//! A content-addressable, owner-scoped memory store for AI agents. Text is
//! embedded, stored with its owner, and later retrieved by cosine similarity.
//!
//! ## Architecture
//!
//! - **Embedding providers** - local fastembed model, OpenAI-compatible HTTP
//!   API, or deterministic feature hashing
//! - **Vector backends** - in-memory exact search, on-disk LanceDB, or a remote
//!   Qdrant collection (eventually consistent unless writes wait)
//! - **Isolation guard** - every backend call carries an [`Owner`]; foreign
//!   records coming back fail the call
//! - **Record manager / retrieval engine / auto-context** - store, retrieve,
//!   list, `auto_store_and_retrieve` and `auto_context`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use vector_memory::{Config, MemoryService};
//!
//! let service = MemoryService::new(Config::from_env()?).await?;
//!
//! let id = service.store("u1", "AWS Lambda supports provisioned concurrency").await?;
//! let hits = service.retrieve("u1", "Lambda cold starts", None, Some(0.1)).await?;
//!
//! // Or through the action surface used by agents
//! let response = service.execute_json(serde_json::json!({
//!     "action": "auto_context",
//!     "user_id": "u1",
//! })).await;
//! ```

pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod memory;
pub mod owner;
pub mod record;
pub mod retrieval;
pub mod service;
pub mod storage;
pub mod tool;

pub use config::{BackendKind, Config, EmbeddingConfig, EmbeddingProviderKind};
pub use context::{AutoRetrieval, ContextEntry, ContextWindow, RetrievalOutcome, StoreOutcome};
pub use embedding::EmbeddingProvider;
pub use error::{Error, ErrorKind, Result};
pub use owner::Owner;
pub use record::{MemoryEntry, MemoryRecord, ScoredEntry};
pub use retrieval::Retrieval;
pub use service::MemoryService;
pub use storage::{Consistency, SimilarityMetric, VectorBackend};
pub use tool::{MemoryHit, ToolOutput, ToolRequest, ToolResponse};
