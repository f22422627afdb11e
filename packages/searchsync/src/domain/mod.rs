//! Domain layer
//!
//! # Domain Models
//!
//! - `Schema`, `Record`, `Value`: what the primary store holds
//! - `DocumentId`, `DocumentIdGenerator`: how records are addressed in the index
//! - `Query`, `AggregateQuery`: backend-neutral reads
//!
//! # Port Traits
//!
//! - `PrimaryStore`, `SchemaRegistry`, `SearchTransport`, `QueryTranslator`

pub mod document;
pub mod models;
pub mod ports;
pub mod query;
pub mod transport;

pub use document::{DocumentId, DocumentIdGenerator};
pub use models::{
    Attribute, AttributeType, EntityRef, FetchSpec, IndexingMode, Record, ReferenceEdge, Schema,
    Value,
};
pub use ports::{PrimaryStore, QueryTranslator, SchemaRegistry, SearchTransport};
pub use query::{AggregateQuery, AggregateResult, Query, QueryRule};
pub use transport::{
    AggregationRequest, AggregationResponse, BackendQuery, Bucket, BulkAction, BulkItemResult,
    BulkOperation, BulkRequest, BulkResponse, FieldMapping, IndexOutcome, ItemStatus, Mapping,
    ScrollId, SearchPage, SearchRequest,
};
