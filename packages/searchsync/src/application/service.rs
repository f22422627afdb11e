//! Synchronization façade
//!
//! Single entry point composing lifecycle, bulk writes, scrolling and the
//! cascade. Callers hand in schemas and records; index names and document
//! ids never leak out.

use std::sync::Arc;
use tracing::{debug, trace};

use crate::application::bulk::{BulkListener, BulkWriter, TracingBulkListener};
use crate::application::cascade::{merge_operations, CascadeResolver};
use crate::application::documents::DocumentBuilder;
use crate::application::lifecycle::{IndexLifecycle, RebuildStats};
use crate::application::references::ReferenceResolver;
use crate::application::scroll::{ScrollCursor, Scroller};
use crate::config::SyncConfig;
use crate::domain::{
    AggregateQuery, AggregateResult, DocumentId, EntityRef, IndexOutcome, IndexingMode,
    PrimaryStore, Query, QueryTranslator, Record, Schema, SchemaRegistry, SearchRequest,
    SearchTransport, Value,
};
use crate::error::{ErrorKind, Result, SyncError};
use crate::infrastructure::JsonQueryTranslator;

/// Search index synchronization service
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use searchsync::domain::{IndexingMode, PrimaryStore, Record, SchemaRegistry, SearchTransport};
/// # use searchsync::SearchSyncService;
/// # async fn run(
/// #     transport: Arc<dyn SearchTransport>,
/// #     store: Arc<dyn PrimaryStore>,
/// #     registry: Arc<dyn SchemaRegistry>,
/// # ) -> searchsync::Result<()> {
/// let service = SearchSyncService::builder()
///     .transport(transport)
///     .store(store)
///     .registry(registry)
///     .build()?;
///
/// let person = service.schema("Person")?;
/// service.rebuild_index(&person).await?;
/// service
///     .index_one(&person, &Record::new("A").with("name", "Alice"), IndexingMode::Update)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SearchSyncService {
    registry: Arc<dyn SchemaRegistry>,
    transport: Arc<dyn SearchTransport>,
    translator: Arc<dyn QueryTranslator>,
    builder: DocumentBuilder,
    writer: Arc<BulkWriter>,
    lifecycle: IndexLifecycle,
    scroller: Arc<Scroller>,
    cascade: CascadeResolver,
    config: SyncConfig,
}

impl SearchSyncService {
    pub fn builder() -> SearchSyncServiceBuilder {
        SearchSyncServiceBuilder::default()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Registered schema by id
    pub fn schema(&self, schema_id: &str) -> Result<Arc<Schema>> {
        self.registry
            .schema(schema_id)
            .ok_or_else(|| SyncError::unknown_schema(schema_id))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Index lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub async fn create_index(&self, schema: &Schema) -> Result<()> {
        self.lifecycle.create_index(schema).await
    }

    pub async fn has_index(&self, schema: &Schema) -> Result<bool> {
        self.lifecycle.has_index(schema).await
    }

    pub async fn delete_index(&self, schema: &Schema) -> Result<()> {
        self.lifecycle.delete_index(schema).await
    }

    pub async fn rebuild_index(&self, schema: &Schema) -> Result<RebuildStats> {
        self.lifecycle.rebuild_index(schema).await
    }

    /// Make buffered writes visible to searches on every index
    pub async fn refresh_index(&self) -> Result<()> {
        self.transport.refresh(None).await
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Writes
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Index records of `schema`, cascading to referencing documents for
    /// `IndexingMode::Update`
    ///
    /// Returns how many of `schema`'s own documents were written; cascaded
    /// writes into other indices are only logged. Fails with
    /// `ErrorKind::IndexNotFound` when `schema`'s index has not been created.
    pub async fn index(&self, schema: &Schema, records: &[Record], mode: IndexingMode) -> Result<u64> {
        let index = self.builder.ids().index_name(&schema.id);
        let mut operations = self.builder.index_operations(schema, records)?;

        if mode.cascades() && !records.is_empty() {
            let cascaded = self.cascade.referencing_operations(schema, records).await?;
            operations = merge_operations(operations, cascaded);
        }

        let counts = self.writer.submit(operations).await?;
        for (other, count) in counts.iter().filter(|(name, _)| *name != index) {
            debug!("Cascade from {} re-indexed {} documents in [{}]", schema.id, count, other);
        }
        counts.outcome(&index).require(&index)
    }

    pub async fn index_one(&self, schema: &Schema, record: &Record, mode: IndexingMode) -> Result<u64> {
        trace!("Indexing {} [{}] ({:?})", schema.id, record.id, mode);
        self.index(schema, std::slice::from_ref(record), mode).await
    }

    /// Delete one record's document; returns whether a document was removed
    pub async fn delete(&self, schema: &Schema, record: &Record) -> Result<bool> {
        self.delete_by_id(schema, &record.id).await
    }

    pub async fn delete_by_id(&self, schema: &Schema, id: &Value) -> Result<bool> {
        let index = self.builder.ids().index_name(&schema.id);
        let document = self.builder.document_id(schema, id)?;

        match self.transport.delete_document(&index, &document).await? {
            IndexOutcome::Done(deleted) => {
                trace!("Deleted [{}] from [{}]: {}", document, index, deleted);
                Ok(deleted)
            }
            IndexOutcome::IndexNotFound => {
                debug!("No index [{}], nothing to delete", index);
                Ok(false)
            }
        }
    }

    pub async fn delete_all(&self, schema: &Schema, records: &[Record]) -> Result<u64> {
        let ids: Vec<Value> = records.iter().map(|r| r.id.clone()).collect();
        self.delete_all_by_id(schema, &ids).await
    }

    /// Bulk delete, chunked at the write batch size
    pub async fn delete_all_by_id(&self, schema: &Schema, ids: &[Value]) -> Result<u64> {
        let index = self.builder.ids().index_name(&schema.id);
        let documents = ids
            .iter()
            .map(|id| self.builder.document_id(schema, id))
            .collect::<Result<Vec<DocumentId>>>()?;

        let counts = self.writer.delete_batch(&index, documents).await?;
        Ok(counts.get(&index))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Reads
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Number of matching documents; 0 when the index does not exist
    pub async fn count(&self, schema: &Schema, query: Option<&Query>) -> Result<u64> {
        let index = self.builder.ids().index_name(&schema.id);
        let backend_query = query
            .map(|q| self.translator.translate(schema, q))
            .transpose()?;

        Ok(self
            .transport
            .count(&index, backend_query.as_ref())
            .await?
            .unwrap_or(0))
    }

    /// Every match as a record reference
    ///
    /// A query with a limit is served from one page starting at its offset;
    /// otherwise all matches are scrolled and the first `offset` skipped.
    pub async fn search(&self, schema: &Schema, query: &Query) -> Result<Vec<EntityRef>> {
        let ids = match query.limit {
            Some(limit) => self.search_page(schema, query, limit).await?,
            None => {
                let cursor = self.scroller.open(schema, query).await?;
                let mut ids = cursor.collect_ids().await?;
                let skip = query.offset.min(ids.len());
                ids.split_off(skip)
            }
        };

        ids.iter()
            .map(|id| {
                Ok(EntityRef {
                    schema_id: schema.id.clone(),
                    id: self.builder.ids().identity(schema, id)?,
                })
            })
            .collect()
    }

    pub async fn search_one(&self, schema: &Schema, query: &Query) -> Result<Option<EntityRef>> {
        let first = query.clone().with_limit(1);
        Ok(self.search(schema, &first).await?.into_iter().next())
    }

    /// Lazy cursor over the ids of every match, for callers that stream
    pub async fn scroll(&self, schema: &Schema, query: &Query) -> Result<ScrollCursor> {
        self.scroller.open(schema, query).await
    }

    /// Grouped counts; an absent index aggregates to an empty result
    pub async fn aggregate(&self, schema: &Schema, query: &AggregateQuery) -> Result<AggregateResult> {
        let index = self.builder.ids().index_name(&schema.id);
        let request = self.translator.translate_aggregate(schema, &index, query)?;

        match self.transport.aggregate(request).await? {
            IndexOutcome::Done(response) => self.translator.parse_aggregate(query, response),
            IndexOutcome::IndexNotFound => {
                debug!("No index [{}] to aggregate", index);
                Ok(AggregateResult::default())
            }
        }
    }

    async fn search_page(&self, schema: &Schema, query: &Query, limit: usize) -> Result<Vec<DocumentId>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let request = SearchRequest {
            index: self.builder.ids().index_name(&schema.id),
            query: self.translator.translate(schema, query)?,
            from: query.offset,
            size: limit,
            scroll: None,
        };
        Ok(self
            .transport
            .search(request)
            .await?
            .into_option()
            .map(|page| page.ids)
            .unwrap_or_default())
    }
}

/// Builder for `SearchSyncService`
///
/// Transport, store and registry are required. The translator defaults to
/// `JsonQueryTranslator`, the listener to `TracingBulkListener` and the
/// configuration to `SyncConfig::default()`.
#[derive(Default)]
pub struct SearchSyncServiceBuilder {
    transport: Option<Arc<dyn SearchTransport>>,
    store: Option<Arc<dyn PrimaryStore>>,
    registry: Option<Arc<dyn SchemaRegistry>>,
    translator: Option<Arc<dyn QueryTranslator>>,
    listener: Option<Arc<dyn BulkListener>>,
    config: Option<SyncConfig>,
}

impl SearchSyncServiceBuilder {
    pub fn transport(mut self, transport: Arc<dyn SearchTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn PrimaryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn SchemaRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn QueryTranslator>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn BulkListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> Result<SearchSyncService> {
        let transport = self.transport.ok_or_else(|| missing("transport"))?;
        let store = self.store.ok_or_else(|| missing("store"))?;
        let registry = self.registry.ok_or_else(|| missing("registry"))?;
        let translator = self
            .translator
            .unwrap_or_else(|| Arc::new(JsonQueryTranslator::new(registry.clone())));
        let listener = self.listener.unwrap_or_else(|| Arc::new(TracingBulkListener));
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let builder = DocumentBuilder::new(registry.clone());
        let writer = Arc::new(BulkWriter::new(
            transport.clone(),
            listener,
            config.batch_size,
        ));
        let scroller = Arc::new(Scroller::new(
            transport.clone(),
            translator.clone(),
            config.scroll.clone(),
        ));
        let lifecycle = IndexLifecycle::new(
            transport.clone(),
            store.clone(),
            builder.clone(),
            writer.clone(),
            config.index.clone(),
        );
        let cascade = CascadeResolver::new(
            ReferenceResolver::new(registry.clone()),
            scroller.clone(),
            store,
            builder.clone(),
        );

        Ok(SearchSyncService {
            registry,
            transport,
            translator,
            builder,
            writer,
            lifecycle,
            scroller,
            cascade,
            config,
        })
    }
}

fn missing(component: &str) -> SyncError {
    SyncError::new(
        ErrorKind::Config,
        format!("SearchSyncService requires a {}", component),
    )
}
