//! searchsync - keeps a secondary search index consistent with a primary store
//!
//! ## Core Principles
//!
//! 1. **Primary store wins**: documents are projections of records and are
//!    always rebuilt from the store, never patched in place
//! 2. **Deterministic addressing**: index name = f(schema id), document id =
//!    f(schema, identity), so re-indexing overwrites
//! 3. **Bounded resources**: writes go out in size-bounded batches, reads walk
//!    scroll cursors that are released on exhaustion or abandonment
//! 4. **Single-hop cascade**: updating a record re-indexes the documents that
//!    embed it, and nothing further
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use searchsync::domain::{Attribute, AttributeType, IndexingMode, Record, Schema, Value};
//! use searchsync::infrastructure::{
//!     InMemoryPrimaryStore, InMemorySchemaRegistry, InMemorySearchBackend,
//! };
//! use searchsync::SearchSyncService;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> searchsync::Result<()> {
//! let registry = Arc::new(InMemorySchemaRegistry::new());
//! let person = registry.register(
//!     Schema::new("Person", Attribute::new("id", AttributeType::String))
//!         .with_attribute(Attribute::new("name", AttributeType::String))
//!         .with_attribute(Attribute::xref("bestFriend", "Person")),
//! );
//! let store = Arc::new(InMemoryPrimaryStore::new(registry.clone()));
//! store.upsert("Person", Record::new("A").with("name", "Alice"))?;
//! store.upsert("Person", Record::new("B").with("bestFriend", Value::reference("A")))?;
//!
//! let service = SearchSyncService::builder()
//!     .transport(Arc::new(InMemorySearchBackend::new()))
//!     .store(store.clone())
//!     .registry(registry)
//!     .build()?;
//!
//! // 1. Full rebuild from the store
//! service.rebuild_index(&person).await?;
//! assert_eq!(service.count(&person, None).await?, 2);
//!
//! // 2. Incremental update, re-indexing B which embeds A
//! let alice = Record::new("A").with("name", "Alicia");
//! store.upsert("Person", alice.clone())?;
//! service.index_one(&person, &alice, IndexingMode::Update).await?;
//! # Ok(())
//! # }
//! ```

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::{
    BulkListener, IndexLifecycle, RebuildStats, ScrollCursor, SearchSyncService,
    SearchSyncServiceBuilder, TracingBulkListener,
};
pub use config::SyncConfig;
pub use error::{ErrorKind, Result, SyncError};
