//! Ports (Trait Interfaces)
//!
//! Port/Adapter pattern for the engine's collaborators:
//! - `PrimaryStore`: authoritative records
//! - `SchemaRegistry`: schemas + reverse reference index
//! - `SearchTransport`: the search backend
//! - `QueryTranslator`: structured query <-> backend payloads
//!
//! Test adapters for all four live in `infrastructure`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;

use super::document::DocumentId;
use super::models::{FetchSpec, Record, ReferenceEdge, Schema, Value};
use super::query::{AggregateQuery, AggregateResult, Query};
use super::transport::{
    AggregationRequest, AggregationResponse, BackendQuery, BulkRequest, BulkResponse,
    IndexOutcome, Mapping, ScrollId, SearchPage, SearchRequest,
};
use crate::config::IndexSettings;
use crate::error::Result;

/// Primary Store Port
///
/// Source of truth for records. Rebuilds stream from it; cascades re-fetch
/// from it rather than trusting index contents.
#[async_trait]
pub trait PrimaryStore: Send + Sync {
    /// Every record of `schema`, in batches of at most `batch_size`
    fn records_for_schema<'a>(
        &'a self,
        schema: &'a Schema,
        fetch: &'a FetchSpec,
        batch_size: usize,
    ) -> BoxStream<'a, Result<Vec<Record>>>;

    /// Records with the given identities; identities that no longer exist
    /// are skipped
    async fn fetch_by_ids(
        &self,
        schema: &Schema,
        ids: &[Value],
        fetch: &FetchSpec,
    ) -> Result<Vec<Record>>;
}

/// Schema Registry Port
///
/// Lookups are stateless from the caller's point of view and safe to call
/// concurrently.
pub trait SchemaRegistry: Send + Sync {
    fn schema(&self, schema_id: &str) -> Option<Arc<Schema>>;

    /// Every `(schema, attribute)` whose reference type targets `schema_id`
    fn referencing_schemas(&self, schema_id: &str) -> Vec<ReferenceEdge>;
}

/// Search Transport Port
///
/// Calls that target one index report a missing index through
/// `IndexOutcome::IndexNotFound`; `Err` is reserved for real failures.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Index Management
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Create an index with settings and mapping; rejection is an
    /// `IndexCreation` error
    async fn create_index(&self, index: &str, settings: &IndexSettings, mapping: &Mapping)
        -> Result<()>;

    async fn index_exists(&self, index: &str) -> Result<bool>;

    async fn delete_index(&self, index: &str) -> Result<IndexOutcome<()>>;

    /// Make buffered writes visible (`None` = every index)
    async fn refresh(&self, index: Option<&str>) -> Result<()>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Writes
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Submit one batch; per-item failures are reported in the response
    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse>;

    /// Returns whether a document was deleted
    async fn delete_document(&self, index: &str, id: &DocumentId) -> Result<IndexOutcome<bool>>;

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Reads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn search(&self, request: SearchRequest) -> Result<IndexOutcome<SearchPage>>;

    /// Next page of an open scroll cursor
    async fn scroll(&self, scroll_id: &ScrollId, keep_alive: Duration) -> Result<SearchPage>;

    /// Release a scroll cursor; releasing an unknown cursor is not an error
    async fn clear_scroll(&self, scroll_id: &ScrollId) -> Result<()>;

    async fn count(&self, index: &str, query: Option<&BackendQuery>) -> Result<IndexOutcome<u64>>;

    async fn aggregate(
        &self,
        request: AggregationRequest,
    ) -> Result<IndexOutcome<AggregationResponse>>;
}

/// Query Translation Port
pub trait QueryTranslator: Send + Sync {
    fn translate(&self, schema: &Schema, query: &Query) -> Result<BackendQuery>;

    fn translate_aggregate(
        &self,
        schema: &Schema,
        index: &str,
        query: &AggregateQuery,
    ) -> Result<AggregationRequest>;

    fn parse_aggregate(
        &self,
        query: &AggregateQuery,
        response: AggregationResponse,
    ) -> Result<AggregateResult>;
}
