//! Search backend wire-level DTOs
//!
//! Everything the `SearchTransport` port accepts or returns. Payload bodies
//! (`BackendQuery`, document sources) are JSON; their grammar belongs to the
//! query-translation layer, not to the engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use super::document::DocumentId;
use crate::error::{Result, SyncError};

// ═══════════════════════════════════════════════════════════════════════════
// "Index not found" as a value
// ═══════════════════════════════════════════════════════════════════════════

/// Result of a call that targets a specific index
///
/// A missing index is a regular outcome, matched at each call site, rather
/// than an error to be inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome<T> {
    Done(T),
    IndexNotFound,
}

impl<T> IndexOutcome<T> {
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            IndexOutcome::Done(value) => value,
            IndexOutcome::IndexNotFound => default,
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            IndexOutcome::Done(value) => Some(value),
            IndexOutcome::IndexNotFound => None,
        }
    }

    /// Treat a missing index as an error
    pub fn require(self, index: &str) -> Result<T> {
        self.into_option()
            .ok_or_else(|| SyncError::index_not_found(index))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Mapping
// ═══════════════════════════════════════════════════════════════════════════

/// Backend field type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldMapping {
    Keyword,
    Text,
    Integer,
    Long,
    Double,
    Boolean,
    Date,
    /// Embedded referenced record(s)
    Nested {
        properties: BTreeMap<String, FieldMapping>,
    },
}

/// Document mapping for one index
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Mapping {
    pub properties: BTreeMap<String, FieldMapping>,
}

impl Mapping {
    pub fn field(&self, path: &str) -> Option<&FieldMapping> {
        let mut parts = path.split('.');
        let mut current = self.properties.get(parts.next()?)?;
        for part in parts {
            match current {
                FieldMapping::Nested { properties } => current = properties.get(part)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Bulk
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum BulkAction {
    /// Create or overwrite the document
    Index { source: serde_json::Value },
    Delete,
}

/// One write or delete inside a bulk request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub id: DocumentId,
    pub action: BulkAction,
}

impl BulkOperation {
    pub fn index(index: impl Into<String>, id: DocumentId, source: serde_json::Value) -> Self {
        Self {
            index: index.into(),
            id,
            action: BulkAction::Index { source },
        }
    }

    pub fn delete(index: impl Into<String>, id: DocumentId) -> Self {
        Self {
            index: index.into(),
            id,
            action: BulkAction::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(self.action, BulkAction::Delete)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkRequest {
    /// Monotonic per-batcher id, for correlating listener callbacks
    pub execution_id: u64,
    pub operations: Vec<BulkOperation>,
}

/// Per-operation outcome reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    Applied,
    /// Delete of a document that does not exist
    NotFound,
    IndexNotFound,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    pub index: String,
    pub id: DocumentId,
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
    pub took: Duration,
}

impl BulkResponse {
    pub fn failures(&self) -> impl Iterator<Item = &BulkItemResult> {
        self.items
            .iter()
            .filter(|item| matches!(item.status, ItemStatus::Failed(_)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Search
// ═══════════════════════════════════════════════════════════════════════════

/// Translated query body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendQuery(pub serde_json::Value);

impl BackendQuery {
    pub fn match_all() -> Self {
        BackendQuery(serde_json::json!({ "match_all": {} }))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub index: String,
    pub query: BackendQuery,
    pub from: usize,
    pub size: usize,
    /// Open a scroll cursor with this keep-alive
    pub scroll: Option<Duration>,
}

/// Opaque cursor token issued by the backend
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScrollId(pub String);

/// One page of matching document ids
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchPage {
    pub ids: Vec<DocumentId>,
    pub total: u64,
    pub scroll_id: Option<ScrollId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub index: String,
    pub query: BackendQuery,
    /// Field paths, outermost grouping first (one or two levels)
    pub group_by: Vec<String>,
    /// Count distinct values of this path instead of documents
    pub distinct_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregationResponse {
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub key: serde_json::Value,
    pub count: u64,
    /// Next grouping level, empty for the innermost one
    pub buckets: Vec<Bucket>,
}
