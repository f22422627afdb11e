//! Reference metadata
//!
//! - `ReferenceIndex`: reverse index `target schema -> {(schema, attribute)}`,
//!   maintained by a schema registry as schemas are registered
//! - `ReferenceResolver`: groups those edges per referencing schema for the
//!   cascade
//!
//! Lock-free concurrent access with DashMap; edge sets are ordered so lookups
//! are deterministic.

use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::{ReferenceEdge, Schema, SchemaRegistry};
use crate::error::{Result, SyncError};

/// Reverse reference index
///
/// Maps target schema id -> edges pointing at it, so "who can reference
/// records of X?" is a single lookup instead of a registry scan.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    by_target: DashMap<String, BTreeSet<ReferenceEdge>>,
}

impl ReferenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schemas<'a>(schemas: impl IntoIterator<Item = &'a Schema>) -> Self {
        let index = Self::new();
        for schema in schemas {
            index.add_schema(schema);
        }
        index
    }

    /// Record every reference attribute of `schema`
    pub fn add_schema(&self, schema: &Schema) {
        for (attribute, target) in schema.reference_attributes() {
            self.by_target
                .entry(target.to_string())
                .or_default()
                .insert(ReferenceEdge::new(&schema.id, &attribute.name));
        }
    }

    /// Forget every edge originating from `schema_id`
    pub fn remove_schema(&self, schema_id: &str) {
        for mut entry in self.by_target.iter_mut() {
            entry.value_mut().retain(|edge| edge.schema_id != schema_id);
        }
        self.by_target.retain(|_, edges| !edges.is_empty());
    }

    pub fn referencing(&self, target: &str) -> Vec<ReferenceEdge> {
        self.by_target
            .get(target)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of distinct targets that are referenced
    pub fn len(&self) -> usize {
        self.by_target.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_target.is_empty()
    }
}

/// A schema holding one or more references to some target
#[derive(Debug, Clone)]
pub struct ReferencingSchema {
    pub schema: Arc<Schema>,
    /// Attributes of `schema` that reference the target
    pub attributes: Vec<String>,
}

/// Resolves referencing schemas through the registry
#[derive(Clone)]
pub struct ReferenceResolver {
    registry: Arc<dyn SchemaRegistry>,
}

impl ReferenceResolver {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Every schema that may hold a reference to `target`, with the
    /// attributes involved, in registry edge order
    pub fn referencing(&self, target: &str) -> Result<Vec<ReferencingSchema>> {
        let mut grouped: Vec<ReferencingSchema> = Vec::new();

        for edge in self.registry.referencing_schemas(target) {
            if let Some(existing) = grouped.iter_mut().find(|g| g.schema.id == edge.schema_id) {
                existing.attributes.push(edge.attribute);
                continue;
            }

            let schema = self
                .registry
                .schema(&edge.schema_id)
                .ok_or_else(|| SyncError::unknown_schema(&edge.schema_id))?;
            grouped.push(ReferencingSchema {
                schema,
                attributes: vec![edge.attribute],
            });
        }

        Ok(grouped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Attribute, AttributeType};
    use std::collections::HashMap;

    fn person() -> Schema {
        Schema::new("Person", Attribute::new("id", AttributeType::String))
            .with_attribute(Attribute::new("name", AttributeType::String))
            .with_attribute(Attribute::xref("bestFriend", "Person"))
            .with_attribute(Attribute::mref("pets", "Pet"))
    }

    fn pet() -> Schema {
        Schema::new("Pet", Attribute::new("id", AttributeType::Long))
            .with_attribute(Attribute::xref("owner", "Person"))
            .with_attribute(Attribute::xref("vet", "Person"))
    }

    struct MapRegistry {
        schemas: HashMap<String, Arc<Schema>>,
        references: ReferenceIndex,
    }

    impl SchemaRegistry for MapRegistry {
        fn schema(&self, schema_id: &str) -> Option<Arc<Schema>> {
            self.schemas.get(schema_id).cloned()
        }

        fn referencing_schemas(&self, schema_id: &str) -> Vec<ReferenceEdge> {
            self.references.referencing(schema_id)
        }
    }

    #[test]
    fn test_reference_index_lookup() {
        let index = ReferenceIndex::from_schemas([&person(), &pet()]);

        assert_eq!(
            index.referencing("Person"),
            vec![
                ReferenceEdge::new("Person", "bestFriend"),
                ReferenceEdge::new("Pet", "owner"),
                ReferenceEdge::new("Pet", "vet"),
            ]
        );
        assert_eq!(index.referencing("Pet"), vec![ReferenceEdge::new("Person", "pets")]);
        assert!(index.referencing("Nothing").is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_reference_index_add_is_idempotent() {
        let index = ReferenceIndex::new();
        index.add_schema(&pet());
        index.add_schema(&pet());
        assert_eq!(index.referencing("Person").len(), 2);
    }

    #[test]
    fn test_reference_index_remove_schema() {
        let index = ReferenceIndex::from_schemas([&person(), &pet()]);
        index.remove_schema("Pet");

        assert_eq!(
            index.referencing("Person"),
            vec![ReferenceEdge::new("Person", "bestFriend")]
        );
        index.remove_schema("Person");
        assert!(index.is_empty());
    }

    #[test]
    fn test_resolver_groups_attributes_per_schema() {
        let schemas = [person(), pet()];
        let registry = MapRegistry {
            references: ReferenceIndex::from_schemas(schemas.iter()),
            schemas: schemas
                .into_iter()
                .map(|s| (s.id.clone(), Arc::new(s)))
                .collect(),
        };
        let resolver = ReferenceResolver::new(Arc::new(registry));

        let referencing = resolver.referencing("Person").unwrap();
        let summary: Vec<_> = referencing
            .iter()
            .map(|r| (r.schema.id.as_str(), r.attributes.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Person", vec!["bestFriend".to_string()]),
                ("Pet", vec!["owner".to_string(), "vet".to_string()]),
            ]
        );
    }

    #[test]
    fn test_resolver_reports_dangling_edges() {
        let registry = MapRegistry {
            references: ReferenceIndex::from_schemas([&pet()]),
            schemas: HashMap::new(),
        };
        let resolver = ReferenceResolver::new(Arc::new(registry));

        let err = resolver.referencing("Person").unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnknownSchema);
    }
}
