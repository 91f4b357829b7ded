//! Action-based request/response surface for agents.
//!
//! Failures are returned as `{"status": "error", ...}` values, never raised.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::{AutoRetrieval, ContextEntry, ContextWindow, RetrievalOutcome, StoreOutcome};
use crate::error::{Error, ErrorKind, Result};
use crate::record::{MemoryEntry, ScoredEntry};
use crate::retrieval::Retrieval;

/// One memory operation, discriminated by `action`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ToolRequest {
    Store {
        #[serde(alias = "owner")]
        user_id: Option<String>,
        content: Option<String>,
    },
    Retrieve {
        #[serde(alias = "owner")]
        user_id: Option<String>,
        query: Option<String>,
        top_k: Option<usize>,
        min_score: Option<f32>,
        /// Attach a query-ranked `context_summary` (default on)
        auto_inject_context: Option<bool>,
    },
    List {
        #[serde(alias = "owner")]
        user_id: Option<String>,
    },
    AutoStoreAndRetrieve {
        #[serde(alias = "owner")]
        user_id: Option<String>,
        content: Option<String>,
        query: Option<String>,
    },
    AutoContext {
        #[serde(alias = "owner")]
        user_id: Option<String>,
        limit: Option<usize>,
        /// Rank the window against this text instead of by recency
        query: Option<String>,
        min_score: Option<f32>,
    },
    Delete {
        #[serde(alias = "owner")]
        user_id: Option<String>,
        id: Option<String>,
    },
}

impl ToolRequest {
    /// Parse a JSON request; malformed requests are validation errors
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| Error::invalid_input(format!("Invalid request: {}", e)))
    }

    pub fn action(&self) -> &'static str {
        match self {
            ToolRequest::Store { .. } => "store",
            ToolRequest::Retrieve { .. } => "retrieve",
            ToolRequest::List { .. } => "list",
            ToolRequest::AutoStoreAndRetrieve { .. } => "auto_store_and_retrieve",
            ToolRequest::AutoContext { .. } => "auto_context",
            ToolRequest::Delete { .. } => "delete",
        }
    }
}

/// Outcome of a [`ToolRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success(ToolOutput),
    Error(ToolFailure),
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolResponse::Success(_))
    }

    pub fn output(&self) -> Option<&ToolOutput> {
        match self {
            ToolResponse::Success(output) => Some(output),
            ToolResponse::Error(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ToolFailure> {
        match self {
            ToolResponse::Success(_) => None,
            ToolResponse::Error(failure) => Some(failure),
        }
    }
}

impl From<Error> for ToolResponse {
    fn from(e: Error) -> Self {
        ToolResponse::Error(ToolFailure {
            error_kind: e.kind(),
            message: e.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub error_kind: ErrorKind,
    pub message: String,
}

/// Success payload; which fields are set depends on the action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<MemoryHit>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_found: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored: Option<StoreOutcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_summary: Option<String>,

    /// Set when a stored record could not be followed by a retrieval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieve_error: Option<ToolFailure>,
}

impl ToolOutput {
    pub(crate) fn stored(id: String) -> Self {
        Self {
            action: "store".to_string(),
            id: Some(id),
            ..Default::default()
        }
    }

    pub(crate) fn retrieved(retrieval: Retrieval) -> Self {
        Self {
            action: "retrieve".to_string(),
            total_found: Some(retrieval.total_found),
            results: Some(retrieval.results.into_iter().map(MemoryHit::from).collect()),
            ..Default::default()
        }
    }

    pub(crate) fn listed(entries: Vec<MemoryEntry>) -> Self {
        Self {
            action: "list".to_string(),
            total_found: Some(entries.len()),
            results: Some(entries.into_iter().map(MemoryHit::from).collect()),
            ..Default::default()
        }
    }

    pub(crate) fn auto_retrieved(auto: AutoRetrieval) -> Self {
        let base = match auto.retrieval {
            RetrievalOutcome::Success(retrieval) => Self::retrieved(retrieval),
            RetrievalOutcome::Error {
                error_kind,
                message,
            } => Self {
                retrieve_error: Some(ToolFailure {
                    error_kind,
                    message,
                }),
                ..Default::default()
            },
        };
        Self {
            action: "auto_store_and_retrieve".to_string(),
            stored: auto.stored,
            ..base
        }
    }

    pub(crate) fn with_context_summary(mut self, summary: String) -> Self {
        self.context_summary = Some(summary);
        self
    }

    pub(crate) fn context(window: ContextWindow) -> Self {
        Self {
            action: "auto_context".to_string(),
            total_found: Some(window.entries.len()),
            results: Some(window.entries.into_iter().map(MemoryHit::from).collect()),
            summary: Some(window.summary),
            ..Default::default()
        }
    }

    pub(crate) fn deleted(id: String, deleted: bool) -> Self {
        Self {
            action: "delete".to_string(),
            id: Some(id),
            deleted: Some(deleted),
            ..Default::default()
        }
    }

    /// Ids of the returned results, in order
    pub fn result_ids(&self) -> Vec<&str> {
        self.results
            .iter()
            .flatten()
            .map(|hit| hit.id.as_str())
            .collect()
    }
}

/// A memory as reported to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: String,
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    pub created_at: DateTime<Utc>,
}

impl From<MemoryEntry> for MemoryHit {
    fn from(entry: MemoryEntry) -> Self {
        Self {
            id: entry.id,
            content: entry.content,
            score: None,
            created_at: entry.created_at,
        }
    }
}

impl From<ContextEntry> for MemoryHit {
    fn from(context: ContextEntry) -> Self {
        Self {
            score: context.score,
            ..MemoryHit::from(context.entry)
        }
    }
}

impl From<ScoredEntry> for MemoryHit {
    fn from(hit: ScoredEntry) -> Self {
        Self {
            score: Some(hit.score),
            ..MemoryHit::from(hit.entry)
        }
    }
}
