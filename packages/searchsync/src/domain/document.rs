//! Document addressing
//!
//! Index names and document ids are pure functions of the schema id and the
//! record identity, so re-indexing a record always overwrites the same
//! document.
//!
//! Index name format: `{sanitized_schema_id}_{sha256(schema_id)[..8]}`
//!
//! The hash suffix keeps ids that only differ in case or punctuation
//! (`Person` vs `person`, `a.b` vs `a_b`) in separate indices.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use super::models::{AttributeType, Schema, Value};
use crate::error::{Result, SyncError};

const MAX_INDEX_PREFIX: usize = 48;

/// Document identifier within one index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId(s.to_string())
    }
}

/// Stateless index-name and document-id derivation
///
/// # Example
///
/// ```
/// use searchsync::domain::{Attribute, AttributeType, DocumentIdGenerator, Schema, Value};
///
/// let ids = DocumentIdGenerator;
/// let schema = Schema::new("Person", Attribute::new("id", AttributeType::String));
///
/// let index = ids.index_name(&schema.id);
/// assert!(index.starts_with("person_"));
/// assert_eq!(index, ids.index_name("Person"));
///
/// let doc = ids.document_id(&schema, &Value::from("A")).unwrap();
/// assert_eq!(doc.as_str(), "A");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentIdGenerator;

impl DocumentIdGenerator {
    pub fn index_name(&self, schema_id: &str) -> String {
        let mut prefix: String = schema_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .take(MAX_INDEX_PREFIX)
            .collect();
        if !prefix.starts_with(|c: char| c.is_ascii_alphanumeric()) {
            prefix.insert_str(0, "idx");
        }

        let digest = Sha256::digest(schema_id.as_bytes());
        let suffix: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();

        format!("{}_{}", prefix, suffix)
    }

    /// Document id for a record identity of `schema`
    pub fn document_id(&self, schema: &Schema, id: &Value) -> Result<DocumentId> {
        let id_attribute = schema.id_attribute();
        let matches_type = match (&id_attribute.kind, id) {
            (AttributeType::Int | AttributeType::Long, Value::Int(_)) => true,
            (AttributeType::String | AttributeType::Text | AttributeType::Enum, Value::String(_)) => {
                true
            }
            _ => false,
        };

        match id.identity_string() {
            Some(raw) if matches_type => Ok(DocumentId(raw)),
            _ => Err(SyncError::serialization(format!(
                "Identity {} does not fit {}.{} ({:?})",
                id, schema.id, id_attribute.name, id_attribute.kind
            ))),
        }
    }

    /// Typed identity for a document id of `schema`
    pub fn identity(&self, schema: &Schema, id: &DocumentId) -> Result<Value> {
        schema.id_attribute().kind.parse_identity(id.as_str())
    }
}
