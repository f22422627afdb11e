//! Cascading re-index
//!
//! Documents embed copies of the records they reference, so updating a
//! record leaves every document that references it stale. For a batch of
//! changed records of schema `S`:
//!
//! 1. find every `(T, attribute)` whose reference targets `S`
//! 2. per `T`, scroll `T`'s current index for documents whose reference
//!    attributes hold one of the changed identities
//! 3. re-fetch those records from the primary store
//! 4. build plain write operations for them
//!
//! One hop only: the re-indexed documents do not cascade further.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::application::documents::DocumentBuilder;
use crate::application::references::{ReferenceResolver, ReferencingSchema};
use crate::application::scroll::Scroller;
use crate::domain::{
    BulkOperation, DocumentId, FetchSpec, PrimaryStore, Query, QueryRule, Record, Schema, Value,
};
use crate::error::Result;

pub struct CascadeResolver {
    references: ReferenceResolver,
    scroller: Arc<Scroller>,
    store: Arc<dyn PrimaryStore>,
    builder: DocumentBuilder,
}

impl CascadeResolver {
    pub fn new(
        references: ReferenceResolver,
        scroller: Arc<Scroller>,
        store: Arc<dyn PrimaryStore>,
        builder: DocumentBuilder,
    ) -> Self {
        Self {
            references,
            scroller,
            store,
            builder,
        }
    }

    /// Write operations re-indexing every document that currently
    /// references one of `records`
    pub async fn referencing_operations(
        &self,
        schema: &Schema,
        records: &[Record],
    ) -> Result<Vec<BulkOperation>> {
        let identities: Vec<Value> = records.iter().map(|r| r.id.clone()).collect();
        if identities.is_empty() {
            return Ok(Vec::new());
        }

        let mut operations = Vec::new();
        for referencing in self.references.referencing(&schema.id)? {
            let ops = self.reindex_referencing(&referencing, &identities).await?;
            debug!(
                "Cascade {} -> {}: {} documents to re-index",
                schema.id,
                referencing.schema.id,
                ops.len()
            );
            operations.extend(ops);
        }
        Ok(operations)
    }

    async fn reindex_referencing(
        &self,
        referencing: &ReferencingSchema,
        identities: &[Value],
    ) -> Result<Vec<BulkOperation>> {
        let schema = &referencing.schema;
        let Some(query) = Query::any(
            referencing
                .attributes
                .iter()
                .map(|attribute| reference_rule(attribute, identities))
                .collect(),
        ) else {
            return Ok(Vec::new());
        };

        trace!("Cascade query on {}: {:?}", schema.id, query.rule);
        let ids = self.scroller.open(schema, &query).await?.collect_ids().await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let identities = ids
            .iter()
            .map(|id| self.builder.ids().identity(schema, id))
            .collect::<Result<Vec<_>>>()?;
        let records = self
            .store
            .fetch_by_ids(schema, &identities, &FetchSpec::for_reindexing())
            .await?;
        if records.len() < identities.len() {
            debug!(
                "Cascade on {}: {} indexed documents no longer in the store",
                schema.id,
                identities.len() - records.len()
            );
        }

        self.builder.index_operations(schema, &records)
    }
}

fn reference_rule(attribute: &str, identities: &[Value]) -> QueryRule {
    match identities {
        [single] => QueryRule::eq(attribute, single.clone()),
        many => QueryRule::any_of(attribute, many.to_vec()),
    }
}

/// Append cascaded operations to the primary ones, dropping cascaded writes
/// for documents the primary operations already cover
pub fn merge_operations(
    primary: Vec<BulkOperation>,
    cascaded: Vec<BulkOperation>,
) -> Vec<BulkOperation> {
    let mut seen: HashSet<(String, DocumentId)> = primary
        .iter()
        .map(|op| (op.index.clone(), op.id.clone()))
        .collect();

    let mut merged = primary;
    for op in cascaded {
        if seen.insert((op.index.clone(), op.id.clone())) {
            merged.push(op);
        }
    }
    merged
}
