//! Application layer (use cases)
//!
//! - `references`: reverse reference index + resolver
//! - `documents`: record -> document / schema -> mapping
//! - `bulk`: size-bounded bulk writes with a pluggable listener
//! - `scroll`: bounded-lifetime scroll cursors
//! - `lifecycle`: create / exists / delete / rebuild
//! - `cascade`: single-hop re-index of referencing documents
//! - `service`: the public façade

pub mod bulk;
pub mod cascade;
pub mod documents;
pub mod lifecycle;
pub mod references;
pub mod scroll;
pub mod service;

pub use bulk::{BulkCounts, BulkListener, BulkWriter, TracingBulkListener};
pub use cascade::CascadeResolver;
pub use documents::DocumentBuilder;
pub use lifecycle::{IndexLifecycle, RebuildStats};
pub use references::{ReferenceIndex, ReferenceResolver, ReferencingSchema};
pub use scroll::{ScrollCursor, Scroller};
pub use service::{SearchSyncService, SearchSyncServiceBuilder};
