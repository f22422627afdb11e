//! Index lifecycle: create, probe, delete, rebuild
//!
//! ```text
//! absent ──create──► created ──index/rebuild──► populated
//!    ▲                                              │
//!    └──────────────────── delete ◄─────────────────┘
//! ```

use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::application::bulk::BulkWriter;
use crate::application::documents::DocumentBuilder;
use crate::config::IndexSettings;
use crate::domain::{FetchSpec, IndexOutcome, PrimaryStore, Schema, SearchTransport};
use crate::error::Result;

/// Rebuild summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RebuildStats {
    /// Batches streamed from the primary store
    pub batches: usize,
    /// Records read
    pub records: u64,
    /// Documents the backend applied
    pub indexed: u64,
    pub elapsed: Duration,
}

pub struct IndexLifecycle {
    transport: Arc<dyn SearchTransport>,
    store: Arc<dyn PrimaryStore>,
    builder: DocumentBuilder,
    writer: Arc<BulkWriter>,
    settings: IndexSettings,
}

impl IndexLifecycle {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        store: Arc<dyn PrimaryStore>,
        builder: DocumentBuilder,
        writer: Arc<BulkWriter>,
        settings: IndexSettings,
    ) -> Self {
        Self {
            transport,
            store,
            builder,
            writer,
            settings,
        }
    }

    pub fn index_name(&self, schema: &Schema) -> String {
        self.builder.ids().index_name(&schema.id)
    }

    /// Create the index for `schema` with its derived mapping
    ///
    /// Pre-existence is not checked; the backend decides.
    pub async fn create_index(&self, schema: &Schema) -> Result<()> {
        let index = self.index_name(schema);
        let mapping = self.builder.mapping(schema)?;

        debug!(
            "Creating index [{}] for {} ({} fields)",
            index,
            schema.id,
            mapping.properties.len()
        );
        self.transport
            .create_index(&index, &self.settings, &mapping)
            .await
    }

    pub async fn has_index(&self, schema: &Schema) -> Result<bool> {
        self.transport.index_exists(&self.index_name(schema)).await
    }

    /// Delete the index; a missing index counts as deleted
    pub async fn delete_index(&self, schema: &Schema) -> Result<()> {
        let index = self.index_name(schema);
        match self.transport.delete_index(&index).await? {
            IndexOutcome::Done(()) => debug!("Deleted index [{}]", index),
            IndexOutcome::IndexNotFound => debug!("No index [{}] to delete", index),
        }
        Ok(())
    }

    /// Drop and recreate the index, then stream every record back in
    ///
    /// Batches are written in order. A failing batch aborts the rebuild and
    /// leaves earlier batches in place.
    pub async fn rebuild_index(&self, schema: &Schema) -> Result<RebuildStats> {
        let start = Instant::now();
        let index = self.index_name(schema);
        info!("Rebuilding index [{}] for {}", index, schema.id);

        if self.has_index(schema).await? {
            self.delete_index(schema).await?;
        }
        self.create_index(schema).await?;

        let fetch = FetchSpec::for_reindexing();
        let mut stats = RebuildStats::default();
        let mut batches = self
            .store
            .records_for_schema(schema, &fetch, self.writer.batch_size());

        while let Some(batch) = batches.next().await {
            let records = batch?;
            stats.batches += 1;
            stats.records += records.len() as u64;

            let operations = self.builder.index_operations(schema, &records)?;
            let counts = self.writer.submit(operations).await?;
            stats.indexed += counts.get(&index);

            debug!(
                "Rebuild [{}]: batch {} done, {} records so far",
                index, stats.batches, stats.records
            );
        }

        stats.elapsed = start.elapsed();
        info!(
            "Rebuilt index [{}]: {} of {} records indexed in {} batches ({}ms)",
            index,
            stats.indexed,
            stats.records,
            stats.batches,
            stats.elapsed.as_millis()
        );
        Ok(stats)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::application::bulk::TracingBulkListener;
    use crate::domain::{Attribute, AttributeType, Record, SchemaRegistry};
    use crate::error::ErrorKind;
    use crate::infrastructure::{InMemoryPrimaryStore, InMemorySchemaRegistry, InMemorySearchBackend};

    struct Fixture {
        backend: Arc<InMemorySearchBackend>,
        store: Arc<InMemoryPrimaryStore>,
        lifecycle: IndexLifecycle,
        schema: Arc<Schema>,
    }

    fn fixture(batch_size: usize) -> Fixture {
        let schema = Schema::new("Book", Attribute::new("id", AttributeType::Long))
            .with_attribute(Attribute::new("title", AttributeType::Text));

        let registry = Arc::new(InMemorySchemaRegistry::new());
        registry.register(schema);
        let schema = registry.schema("Book").unwrap();

        let backend = Arc::new(InMemorySearchBackend::new());
        let store = Arc::new(InMemoryPrimaryStore::new(registry.clone()));
        let writer = Arc::new(BulkWriter::new(
            backend.clone(),
            Arc::new(TracingBulkListener),
            batch_size,
        ));
        let lifecycle = IndexLifecycle::new(
            backend.clone(),
            store.clone(),
            DocumentBuilder::new(registry),
            writer,
            IndexSettings::default(),
        );

        Fixture {
            backend,
            store,
            lifecycle,
            schema,
        }
    }

    #[tokio::test]
    async fn test_create_has_delete() {
        let f = fixture(10);
        assert!(!f.lifecycle.has_index(&f.schema).await.unwrap());

        f.lifecycle.create_index(&f.schema).await.unwrap();
        assert!(f.lifecycle.has_index(&f.schema).await.unwrap());

        f.lifecycle.delete_index(&f.schema).await.unwrap();
        assert!(!f.lifecycle.has_index(&f.schema).await.unwrap());

        // Second delete is a no-op
        f.lifecycle.delete_index(&f.schema).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_rejected_mapping() {
        let f = fixture(10);
        f.backend.reject_mapping(&f.lifecycle.index_name(&f.schema));

        let err = f.lifecycle.create_index(&f.schema).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::IndexCreation);
    }

    #[tokio::test]
    async fn test_rebuild_streams_in_batches() {
        let f = fixture(4);
        for i in 0..10i64 {
            f.store
                .upsert("Book", Record::new(i).with("title", format!("Book {}", i)))
                .unwrap();
        }

        let stats = f.lifecycle.rebuild_index(&f.schema).await.unwrap();

        assert_eq!(stats.batches, 3);
        assert_eq!(stats.records, 10);
        assert_eq!(stats.indexed, 10);
        assert_eq!(f.backend.stats().bulk_requests, 3);
        let index = f.lifecycle.index_name(&f.schema);
        assert_eq!(f.backend.document_count(&index), 10);
    }

    #[tokio::test]
    async fn test_rebuild_replaces_stale_documents() {
        let f = fixture(100);
        f.store.upsert("Book", Record::new(1)).unwrap();
        f.store.upsert("Book", Record::new(2)).unwrap();
        f.lifecycle.rebuild_index(&f.schema).await.unwrap();

        f.store.remove("Book", &crate::domain::Value::Int(2));
        let stats = f.lifecycle.rebuild_index(&f.schema).await.unwrap();

        assert_eq!(stats.indexed, 1);
        let index = f.lifecycle.index_name(&f.schema);
        assert_eq!(f.backend.document_count(&index), 1);
    }

    #[tokio::test]
    async fn test_rebuild_aborts_on_failed_batch() {
        let f = fixture(2);
        for i in 0..6i64 {
            f.store.upsert("Book", Record::new(i)).unwrap();
        }
        f.backend.fail_bulk_after(1);

        let err = f.lifecycle.rebuild_index(&f.schema).await.unwrap_err();

        assert_eq!(err.kind, ErrorKind::SearchBackend);
        let index = f.lifecycle.index_name(&f.schema);
        assert_eq!(f.backend.document_count(&index), 2);
    }
}
