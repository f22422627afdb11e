//! Document building
//!
//! Projects records into index documents and schemas into index mappings.
//! Reference attributes are denormalized: the document embeds the referenced
//! record's identity and its non-reference attributes as a nested object, so
//! a change to the referenced record leaves stale copies behind until the
//! referencing documents are rebuilt.

use rayon::prelude::*;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::{
    AttributeType, BulkOperation, DocumentId, DocumentIdGenerator, FieldMapping, Mapping, Record,
    Schema, SchemaRegistry, Value,
};
use crate::error::{Result, SyncError};

/// Builds mappings, documents and write operations for a schema
#[derive(Clone)]
pub struct DocumentBuilder {
    registry: Arc<dyn SchemaRegistry>,
    ids: DocumentIdGenerator,
}

impl DocumentBuilder {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            registry,
            ids: DocumentIdGenerator,
        }
    }

    pub fn ids(&self) -> &DocumentIdGenerator {
        &self.ids
    }

    /// Index mapping derived from the schema's attribute types
    pub fn mapping(&self, schema: &Schema) -> Result<Mapping> {
        let mut properties = BTreeMap::new();
        for attribute in schema.attributes() {
            let field = match attribute.kind.reference_target() {
                Some(target) => self.nested_mapping(target)?,
                None => scalar_mapping(&attribute.kind),
            };
            properties.insert(attribute.name.clone(), field);
        }
        Ok(Mapping { properties })
    }

    /// Document source for one record
    pub fn source(&self, schema: &Schema, record: &Record) -> Result<Json> {
        let mut doc = Map::new();
        doc.insert(schema.id_attribute().name.clone(), record.id.to_json());

        for attribute in schema.attributes().iter().skip(1) {
            let Some(value) = record.get(&attribute.name) else {
                continue;
            };

            let json = match &attribute.kind {
                AttributeType::Xref { target } => match value.references().first() {
                    Some(reference) => {
                        let target = self.target_schema(target)?;
                        self.nested_source(&target, value_for(value, reference))
                    }
                    None => Json::Null,
                },
                AttributeType::Mref { target } => {
                    let target = self.target_schema(target)?;
                    match value {
                        Value::List(items) => Json::Array(
                            items
                                .iter()
                                .filter(|item| item.referenced_identity().is_some())
                                .map(|item| self.nested_source(&target, item))
                                .collect(),
                        ),
                        Value::Null => Json::Array(Vec::new()),
                        single => Json::Array(vec![self.nested_source(&target, single)]),
                    }
                }
                _ => value.to_json(),
            };
            doc.insert(attribute.name.clone(), json);
        }

        Ok(Json::Object(doc))
    }

    /// Write operations for a batch of records, built in parallel
    ///
    /// Output order follows input order.
    pub fn index_operations(&self, schema: &Schema, records: &[Record]) -> Result<Vec<BulkOperation>> {
        let index = self.ids.index_name(&schema.id);
        records
            .par_iter()
            .map(|record| self.operation_into(&index, schema, record))
            .collect()
    }

    pub fn document_id(&self, schema: &Schema, id: &Value) -> Result<DocumentId> {
        self.ids.document_id(schema, id)
    }

    fn operation_into(&self, index: &str, schema: &Schema, record: &Record) -> Result<BulkOperation> {
        let id = self.ids.document_id(schema, &record.id)?;
        let source = self.source(schema, record)?;
        Ok(BulkOperation::index(index, id, source))
    }

    fn target_schema(&self, target: &str) -> Result<Arc<Schema>> {
        self.registry
            .schema(target)
            .ok_or_else(|| SyncError::unknown_schema(target))
    }

    fn nested_mapping(&self, target: &str) -> Result<FieldMapping> {
        let target = self.target_schema(target)?;
        let properties = target
            .attributes()
            .iter()
            .filter(|a| !a.kind.is_reference())
            .map(|a| (a.name.clone(), scalar_mapping(&a.kind)))
            .collect();
        Ok(FieldMapping::Nested { properties })
    }

    fn nested_source(&self, target: &Schema, value: &Value) -> Json {
        let mut nested = Map::new();
        let identity = value.referenced_identity().map_or(Json::Null, Value::to_json);
        nested.insert(target.id_attribute().name.clone(), identity);

        if let Value::Nested(record) = value {
            for attribute in target.attributes().iter().skip(1) {
                if attribute.kind.is_reference() {
                    continue;
                }
                if let Some(v) = record.get(&attribute.name) {
                    nested.insert(attribute.name.clone(), v.to_json());
                }
            }
        }

        Json::Object(nested)
    }
}

/// The referencing value itself when it carries the nested record, otherwise
/// the bare identity
fn value_for<'a>(value: &'a Value, reference: &'a Value) -> &'a Value {
    match value {
        Value::List(items) => items
            .iter()
            .find(|item| item.referenced_identity() == Some(reference))
            .unwrap_or(reference),
        _ => value,
    }
}

fn scalar_mapping(kind: &AttributeType) -> FieldMapping {
    match kind {
        AttributeType::String | AttributeType::Enum => FieldMapping::Keyword,
        AttributeType::Text => FieldMapping::Text,
        AttributeType::Int => FieldMapping::Integer,
        AttributeType::Long => FieldMapping::Long,
        AttributeType::Decimal => FieldMapping::Double,
        AttributeType::Bool => FieldMapping::Boolean,
        AttributeType::Date | AttributeType::DateTime => FieldMapping::Date,
        // Reference targets are resolved through the registry
        AttributeType::Xref { .. } | AttributeType::Mref { .. } => FieldMapping::Keyword,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::references::ReferenceIndex;
    use crate::domain::{Attribute, ReferenceEdge};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::HashMap;

    struct Registry {
        schemas: HashMap<String, Arc<Schema>>,
        references: ReferenceIndex,
    }

    impl SchemaRegistry for Registry {
        fn schema(&self, schema_id: &str) -> Option<Arc<Schema>> {
            self.schemas.get(schema_id).cloned()
        }

        fn referencing_schemas(&self, schema_id: &str) -> Vec<ReferenceEdge> {
            self.references.referencing(schema_id)
        }
    }

    fn person() -> Schema {
        Schema::new("Person", Attribute::new("id", AttributeType::String))
            .with_attribute(Attribute::new("name", AttributeType::String))
            .with_attribute(Attribute::new("age", AttributeType::Int))
            .with_attribute(Attribute::xref("bestFriend", "Person"))
            .with_attribute(Attribute::mref("pets", "Pet"))
    }

    fn pet() -> Schema {
        Schema::new("Pet", Attribute::new("id", AttributeType::Long))
            .with_attribute(Attribute::new("species", AttributeType::Enum))
            .with_attribute(Attribute::xref("owner", "Person"))
    }

    fn builder() -> DocumentBuilder {
        let schemas = [person(), pet()];
        let registry = Registry {
            references: ReferenceIndex::from_schemas(schemas.iter()),
            schemas: schemas
                .into_iter()
                .map(|s| (s.id.clone(), Arc::new(s)))
                .collect(),
        };
        DocumentBuilder::new(Arc::new(registry))
    }

    #[test]
    fn test_mapping_nests_reference_targets() {
        let mapping = builder().mapping(&person()).unwrap();

        assert_eq!(mapping.field("id"), Some(&FieldMapping::Keyword));
        assert_eq!(mapping.field("age"), Some(&FieldMapping::Integer));
        assert_eq!(mapping.field("bestFriend.name"), Some(&FieldMapping::Keyword));
        assert_eq!(mapping.field("pets.species"), Some(&FieldMapping::Keyword));
        assert_eq!(mapping.field("pets.id"), Some(&FieldMapping::Long));
        // Only one level of nesting
        assert_eq!(mapping.field("bestFriend.bestFriend"), None);
        assert_eq!(mapping.field("pets.owner"), None);
    }

    #[test]
    fn test_mapping_unknown_target() {
        let orphan = Schema::new("Orphan", Attribute::new("id", AttributeType::String))
            .with_attribute(Attribute::xref("parent", "Missing"));
        let err = builder().mapping(&orphan).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::UnknownSchema);
    }

    #[test]
    fn test_source_denormalizes_references() {
        let alice = Record::new("A").with("name", "Alice").with("age", 30);
        let bob = Record::new("B")
            .with("name", "Bob")
            .with("bestFriend", Value::nested(alice))
            .with(
                "pets",
                Value::List(vec![
                    Value::nested(Record::new(1).with("species", "cat")),
                    Value::reference(2),
                ]),
            );

        let doc = builder().source(&person(), &bob).unwrap();

        assert_eq!(
            doc,
            json!({
                "id": "B",
                "name": "Bob",
                "bestFriend": { "id": "A", "name": "Alice", "age": 30 },
                "pets": [ { "id": 1, "species": "cat" }, { "id": 2 } ]
            })
        );
    }

    #[test]
    fn test_source_handles_bare_and_null_references() {
        let record = Record::new("C")
            .with("bestFriend", Value::reference("A"))
            .with("pets", Value::Null);

        let doc = builder().source(&person(), &record).unwrap();

        assert_eq!(doc["bestFriend"], json!({ "id": "A" }));
        assert_eq!(doc["pets"], json!([]));
        assert!(doc.get("name").is_none());
    }

    #[test]
    fn test_index_operations_keep_order() {
        let records: Vec<Record> = (0..50)
            .map(|i| Record::new(format!("P{:02}", i)).with("name", format!("n{}", i)))
            .collect();

        let builder = builder();
        let operations = builder.index_operations(&person(), &records).unwrap();

        assert_eq!(operations.len(), 50);
        let index = builder.ids().index_name("Person");
        for (i, op) in operations.iter().enumerate() {
            assert_eq!(op.index, index);
            assert_eq!(op.id.as_str(), format!("P{:02}", i));
        }
    }

    #[test]
    fn test_index_operations_fail_on_bad_identity() {
        let records = vec![Record::new("A"), Record::new(7)];
        assert!(builder().index_operations(&person(), &records).is_err());
    }
}
