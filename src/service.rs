//! The memory service: the five operations behind one owner-checked entry point

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::context::{AutoContext, AutoRetrieval, ContextWindow};
use crate::embedding::{create_provider, Embedder, EmbeddingProvider};
use crate::error::{ErrorKind, Result};
use crate::memory::RecordManager;
use crate::owner::{GuardedBackend, Owner};
use crate::record::MemoryEntry;
use crate::retrieval::{Retrieval, RetrievalEngine};
use crate::storage::{create_backend, Consistency, VectorBackend};
use crate::tool::{ToolOutput, ToolRequest, ToolResponse};

/// Owner-scoped vector memory.
///
/// Every operation takes the owner first and rejects a missing or empty one
/// before touching the embedder or the backend. Operations keep no state
/// between calls and may run concurrently.
pub struct MemoryService {
    config: Config,
    manager: RecordManager,
    engine: RetrievalEngine,
    auto: AutoContext,
    consistency: Consistency,
}

impl MemoryService {
    /// Build the configured embedding provider and backend
    pub async fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let provider = create_provider(&config)?;
        let backend = create_backend(&config).await?;
        Self::with_components(config, provider, backend)
    }

    /// Assemble a service from an explicit provider and backend
    pub fn with_components(
        config: Config,
        provider: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn VectorBackend>,
    ) -> Result<Self> {
        config.validate()?;

        info!(
            "Memory service using {} backend, embedding model {}",
            backend.name(),
            provider.model()
        );

        let consistency = backend.consistency();
        let embedder = Embedder::new(
            provider,
            config.embedding.max_input_chars,
            config.operation_timeout,
        );
        let backend = GuardedBackend::new(backend, config.operation_timeout);

        let manager = RecordManager::new(embedder.clone(), backend.clone());
        let engine = RetrievalEngine::new(
            embedder,
            backend,
            config.default_top_k,
            config.default_min_score,
        );
        let auto = AutoContext::new(manager.clone(), engine.clone(), config.max_context_memories);

        Ok(Self {
            config,
            manager,
            engine,
            auto,
            consistency,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Read-after-write guarantee of the underlying backend.
    /// With [`Consistency::Eventual`] a fresh `store` may not be retrievable yet.
    pub fn consistency(&self) -> Consistency {
        self.consistency
    }

    pub async fn store(&self, owner: &str, content: &str) -> Result<String> {
        let owner = Owner::new(owner)?;
        self.manager.store(&owner, content).await
    }

    pub async fn retrieve(
        &self,
        owner: &str,
        query: &str,
        top_k: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<Retrieval> {
        let owner = Owner::new(owner)?;
        self.engine.retrieve(&owner, query, top_k, min_score).await
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<MemoryEntry>> {
        let owner = Owner::new(owner)?;
        self.manager.list(&owner).await
    }

    pub async fn auto_store_and_retrieve(
        &self,
        owner: &str,
        content: Option<&str>,
        query: Option<&str>,
    ) -> Result<AutoRetrieval> {
        let owner = Owner::new(owner)?;
        self.auto.auto_store_and_retrieve(&owner, content, query).await
    }

    pub async fn auto_context(&self, owner: &str, limit: Option<usize>) -> Result<ContextWindow> {
        let owner = Owner::new(owner)?;
        self.auto.auto_context(&owner, limit).await
    }

    /// Context window ranked against `query` with a relaxed threshold
    pub async fn relevant_context(
        &self,
        owner: &str,
        query: &str,
        limit: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<ContextWindow> {
        let owner = Owner::new(owner)?;
        self.auto.relevant_context(&owner, query, limit, min_score).await
    }

    pub async fn delete(&self, owner: &str, id: &str) -> Result<bool> {
        let owner = Owner::new(owner)?;
        self.manager.delete(&owner, id).await
    }

    /// Run a tool request. Never fails; errors become `status: error` responses.
    pub async fn execute(&self, request: ToolRequest) -> ToolResponse {
        let action = request.action();
        debug!("Executing memory action {}", action);

        match self.dispatch(request).await {
            Ok(output) => ToolResponse::Success(output),
            Err(e) => {
                debug!("Memory action {} failed: {}", action, e);
                ToolResponse::from(e)
            }
        }
    }

    /// Parse and run a JSON tool request
    pub async fn execute_json(&self, value: serde_json::Value) -> ToolResponse {
        match ToolRequest::from_json(value) {
            Ok(request) => self.execute(request).await,
            Err(e) => ToolResponse::from(e),
        }
    }

    async fn dispatch(&self, request: ToolRequest) -> Result<ToolOutput> {
        match request {
            ToolRequest::Store { user_id, content } => {
                let owner = Owner::from_optional(user_id.as_deref())?;
                let id = self
                    .manager
                    .store(&owner, content.as_deref().unwrap_or_default())
                    .await?;
                Ok(ToolOutput::stored(id))
            }
            ToolRequest::Retrieve {
                user_id,
                query,
                top_k,
                min_score,
                auto_inject_context,
            } => {
                let owner = Owner::from_optional(user_id.as_deref())?;
                let query = query.as_deref().unwrap_or_default();
                let retrieval = self.engine.retrieve(&owner, query, top_k, min_score).await?;
                let output = ToolOutput::retrieved(retrieval);

                if !auto_inject_context.unwrap_or(true) {
                    return Ok(output);
                }
                match self
                    .auto
                    .relevant_context(&owner, query, None, min_score)
                    .await
                {
                    Ok(context) => Ok(output.with_context_summary(context.summary)),
                    Err(e) if e.kind() == ErrorKind::AuthorizationError => Err(e),
                    Err(e) => {
                        warn!(owner = %owner, error = %e, "Context summary unavailable");
                        Ok(output)
                    }
                }
            }
            ToolRequest::List { user_id } => {
                let owner = Owner::from_optional(user_id.as_deref())?;
                Ok(ToolOutput::listed(self.manager.list(&owner).await?))
            }
            ToolRequest::AutoStoreAndRetrieve {
                user_id,
                content,
                query,
            } => {
                let owner = Owner::from_optional(user_id.as_deref())?;
                let auto = self
                    .auto
                    .auto_store_and_retrieve(&owner, content.as_deref(), query.as_deref())
                    .await?;
                Ok(ToolOutput::auto_retrieved(auto))
            }
            ToolRequest::AutoContext {
                user_id,
                limit,
                query,
                min_score,
            } => {
                let owner = Owner::from_optional(user_id.as_deref())?;
                let window = match query.as_deref().filter(|q| !q.trim().is_empty()) {
                    Some(query) => {
                        self.auto
                            .relevant_context(&owner, query, limit, min_score)
                            .await?
                    }
                    None => self.auto.auto_context(&owner, limit).await?,
                };
                Ok(ToolOutput::context(window))
            }
            ToolRequest::Delete { user_id, id } => {
                let owner = Owner::from_optional(user_id.as_deref())?;
                let id = id.unwrap_or_default();
                let deleted = self.manager.delete(&owner, &id).await?;
                Ok(ToolOutput::deleted(id, deleted))
            }
        }
    }
}
