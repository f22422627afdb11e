//! In-memory schema registry
//!
//! HashMap of schemas plus the reverse reference index, kept in step on
//! every registration.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::application::references::ReferenceIndex;
use crate::domain::{ReferenceEdge, Schema, SchemaRegistry};

#[derive(Debug, Default)]
pub struct InMemorySchemaRegistry {
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
    references: ReferenceIndex,
}

impl InMemorySchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_schemas(schemas: impl IntoIterator<Item = Schema>) -> Self {
        let registry = Self::new();
        for schema in schemas {
            registry.register(schema);
        }
        registry
    }

    /// Register or replace a schema
    pub fn register(&self, schema: Schema) -> Arc<Schema> {
        let schema = Arc::new(schema);
        let mut schemas = self.schemas.write();
        if schemas.contains_key(&schema.id) {
            self.references.remove_schema(&schema.id);
        }
        self.references.add_schema(&schema);
        schemas.insert(schema.id.clone(), schema.clone());
        schema
    }

    pub fn unregister(&self, schema_id: &str) -> Option<Arc<Schema>> {
        let removed = self.schemas.write().remove(schema_id);
        if removed.is_some() {
            self.references.remove_schema(schema_id);
        }
        removed
    }

    pub fn schema_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.schemas.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl SchemaRegistry for InMemorySchemaRegistry {
    fn schema(&self, schema_id: &str) -> Option<Arc<Schema>> {
        self.schemas.read().get(schema_id).cloned()
    }

    fn referencing_schemas(&self, schema_id: &str) -> Vec<ReferenceEdge> {
        self.references.referencing(schema_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Attribute, AttributeType};

    fn pet(owner_attribute: &str) -> Schema {
        Schema::new("Pet", Attribute::new("id", AttributeType::Long))
            .with_attribute(Attribute::xref(owner_attribute, "Person"))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = InMemorySchemaRegistry::from_schemas([pet("owner")]);

        assert!(registry.schema("Pet").is_some());
        assert!(registry.schema("Person").is_none());
        assert_eq!(
            registry.referencing_schemas("Person"),
            vec![ReferenceEdge::new("Pet", "owner")]
        );
    }

    #[test]
    fn test_reregister_replaces_edges() {
        let registry = InMemorySchemaRegistry::from_schemas([pet("owner")]);
        registry.register(pet("keeper"));

        assert_eq!(
            registry.referencing_schemas("Person"),
            vec![ReferenceEdge::new("Pet", "keeper")]
        );
    }

    #[test]
    fn test_unregister() {
        let registry = InMemorySchemaRegistry::from_schemas([pet("owner")]);
        assert!(registry.unregister("Pet").is_some());
        assert!(registry.unregister("Pet").is_none());
        assert!(registry.referencing_schemas("Person").is_empty());
        assert!(registry.schema_ids().is_empty());
    }
}
