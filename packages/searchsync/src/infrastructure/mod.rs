//! Infrastructure layer - adapters for the domain ports
//!
//! - `JsonQueryTranslator`: default `QueryTranslator` (JSON query DSL)
//! - In-memory store, registry and search backend behind the `memory` feature

pub mod query_dsl;
pub use query_dsl::JsonQueryTranslator;

#[cfg(feature = "memory")]
pub mod primary_store;
#[cfg(feature = "memory")]
pub mod registry;
#[cfg(feature = "memory")]
pub mod search_backend;

#[cfg(feature = "memory")]
pub use primary_store::InMemoryPrimaryStore;
#[cfg(feature = "memory")]
pub use registry::InMemorySchemaRegistry;
#[cfg(feature = "memory")]
pub use search_backend::{BackendStats, InMemorySearchBackend};
