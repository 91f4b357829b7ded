//! Auto-context: store-then-retrieve and default context windows

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::memory::RecordManager;
use crate::owner::Owner;
use crate::record::{MemoryEntry, ScoredEntry};
use crate::retrieval::{validate_min_score, Retrieval, RetrievalEngine};

/// Entries shown in a context summary
const SUMMARY_ENTRIES: usize = 5;

/// Query-ranked context never filters harder than this
const CONTEXT_SCORE_FLOOR: f32 = 0.1;

/// How much query-ranked context relaxes the caller's threshold
const CONTEXT_SCORE_SLACK: f32 = 0.2;

/// Result of the best-effort store half of `auto_store_and_retrieve`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreOutcome {
    Success { id: String },
    Error { error_kind: ErrorKind, message: String },
}

impl StoreOutcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            StoreOutcome::Success { id } => Some(id),
            StoreOutcome::Error { .. } => None,
        }
    }
}

/// Result of the retrieve half of `auto_store_and_retrieve`
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Success(Retrieval),
    /// Only reported when the store half persisted a record
    Error { error_kind: ErrorKind, message: String },
}

impl RetrievalOutcome {
    pub fn retrieval(&self) -> Option<&Retrieval> {
        match self {
            RetrievalOutcome::Success(retrieval) => Some(retrieval),
            RetrievalOutcome::Error { .. } => None,
        }
    }

    /// Ranked hits, empty when the retrieval failed
    pub fn results(&self) -> &[ScoredEntry] {
        self.retrieval().map(|r| r.results.as_slice()).unwrap_or_default()
    }
}

/// Combined result of `auto_store_and_retrieve`
#[derive(Debug, Clone, PartialEq)]
pub struct AutoRetrieval {
    /// `None` when no content was supplied
    pub stored: Option<StoreOutcome>,
    pub retrieval: RetrievalOutcome,
}

/// A context memory, scored when the window was ranked against a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    #[serde(flatten)]
    pub entry: MemoryEntry,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl From<MemoryEntry> for ContextEntry {
    fn from(entry: MemoryEntry) -> Self {
        Self { entry, score: None }
    }
}

impl From<ScoredEntry> for ContextEntry {
    fn from(hit: ScoredEntry) -> Self {
        Self {
            entry: hit.entry,
            score: Some(hit.score),
        }
    }
}

/// Default memory window used to seed a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Newest first, or most relevant first when ranked against a query
    pub entries: Vec<ContextEntry>,
    pub summary: String,
}

impl ContextWindow {
    fn new(owner: &Owner, entries: Vec<ContextEntry>) -> Self {
        let summary = if entries.is_empty() {
            format!("New user interaction for {}", owner)
        } else {
            entries
                .iter()
                .take(SUMMARY_ENTRIES)
                .map(|e| format!("- {}", e.entry.content))
                .collect::<Vec<_>>()
                .join("\n")
        };
        Self { entries, summary }
    }

    /// Format the window for injection into a prompt
    pub fn format_for_prompt(&self) -> String {
        if self.entries.is_empty() {
            return String::new();
        }
        format!("## What you remember about this user\n{}\n", self.summary)
    }
}

/// Threshold used for query-ranked context: `min_score` relaxed by 0.2,
/// never below 0.1
pub fn context_threshold(min_score: f32) -> f32 {
    (min_score - CONTEXT_SCORE_SLACK).max(CONTEXT_SCORE_FLOOR)
}

/// Sequences store and retrieve for conversational continuity.
/// Holds no state between calls.
#[derive(Clone)]
pub struct AutoContext {
    manager: RecordManager,
    engine: RetrievalEngine,
    default_window: usize,
}

impl AutoContext {
    pub fn new(manager: RecordManager, engine: RetrievalEngine, default_window: usize) -> Self {
        Self {
            manager,
            engine,
            default_window,
        }
    }

    /// Store `content` if given, then retrieve with `query` (or `content`).
    ///
    /// A failed store is reported in the result and does not stop the
    /// retrieval. Once a record is stored, a failed retrieval is reported
    /// alongside its id rather than failing the call. Isolation violations
    /// always fail the call.
    pub async fn auto_store_and_retrieve(
        &self,
        owner: &Owner,
        content: Option<&str>,
        query: Option<&str>,
    ) -> Result<AutoRetrieval> {
        let content = content.filter(|c| !c.trim().is_empty());
        let query = query.filter(|q| !q.trim().is_empty());

        let search = query.or(content).ok_or_else(|| {
            Error::invalid_input("auto_store_and_retrieve needs content or query")
        })?;

        let stored = match content {
            Some(content) => Some(match self.manager.store(owner, content).await {
                Ok(id) => StoreOutcome::Success { id },
                Err(e @ Error::Authorization(_)) => return Err(e),
                Err(e) => {
                    warn!("Store half of auto_store_and_retrieve failed for user {}: {}", owner, e);
                    StoreOutcome::Error {
                        error_kind: e.kind(),
                        message: e.to_string(),
                    }
                }
            }),
            None => None,
        };
        let persisted = stored.as_ref().and_then(StoreOutcome::id).is_some();

        let retrieval = match self.engine.retrieve(owner, search, None, None).await {
            Ok(retrieval) => RetrievalOutcome::Success(retrieval),
            Err(e @ Error::Authorization(_)) => return Err(e),
            Err(e) if persisted => {
                warn!(
                    "Retrieve half of auto_store_and_retrieve failed for user {}: {}",
                    owner, e
                );
                RetrievalOutcome::Error {
                    error_kind: e.kind(),
                    message: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };

        Ok(AutoRetrieval { stored, retrieval })
    }

    /// The `limit` most recent memories of `owner` (default window if unset)
    pub async fn auto_context(&self, owner: &Owner, limit: Option<usize>) -> Result<ContextWindow> {
        let limit = self.window(limit)?;

        let mut entries = self.manager.list(owner).await?;
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        entries.truncate(limit);

        debug!("Auto-context window of {} memories for user {}", entries.len(), owner);
        Ok(ContextWindow::new(
            owner,
            entries.into_iter().map(ContextEntry::from).collect(),
        ))
    }

    /// Up to `limit` memories of `owner` most similar to `query`, filtered by
    /// the relaxed [`context_threshold`] of `min_score` (or the default)
    pub async fn relevant_context(
        &self,
        owner: &Owner,
        query: &str,
        limit: Option<usize>,
        min_score: Option<f32>,
    ) -> Result<ContextWindow> {
        let limit = self.window(limit)?;
        let min_score = validate_min_score(min_score.unwrap_or(self.engine.default_min_score()))?;

        let retrieval = self
            .engine
            .retrieve(owner, query, Some(limit), Some(context_threshold(min_score)))
            .await?;

        debug!(
            "Query-ranked context of {} memories for user {}",
            retrieval.results.len(),
            owner
        );
        Ok(ContextWindow::new(
            owner,
            retrieval.results.into_iter().map(ContextEntry::from).collect(),
        ))
    }

    fn window(&self, limit: Option<usize>) -> Result<usize> {
        match limit.unwrap_or(self.default_window) {
            0 => Err(Error::invalid_input("limit must be positive")),
            limit => Ok(limit),
        }
    }
}
