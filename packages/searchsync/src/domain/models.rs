//! Domain Models
//!
//! - `Schema` / `Attribute` / `AttributeType`: record type descriptors
//! - `Record` / `Value`: primary-store instances
//! - `IndexingMode`: caller-supplied cascade switch
//! - `ReferenceEdge`: "documents of schema X may point at schema Y via attribute a"
//! - `EntityRef`: lightweight search result
//! - `FetchSpec`: which attributes the primary store should load

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SyncError};

// ═══════════════════════════════════════════════════════════════════════════
// Schema
// ═══════════════════════════════════════════════════════════════════════════

/// Attribute data type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Text,
    Int,
    Long,
    Decimal,
    Bool,
    Date,
    DateTime,
    Enum,
    /// Single reference to a record of `target`
    Xref { target: String },
    /// Many references to records of `target`
    Mref { target: String },
}

impl AttributeType {
    /// Target schema id for reference types
    pub fn reference_target(&self) -> Option<&str> {
        match self {
            AttributeType::Xref { target } | AttributeType::Mref { target } => Some(target),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        self.reference_target().is_some()
    }

    /// Convert a document id back into a typed identity value
    pub fn parse_identity(&self, raw: &str) -> Result<Value> {
        match self {
            AttributeType::Int | AttributeType::Long => raw.parse::<i64>().map(Value::Int).map_err(|e| {
                SyncError::serialization(format!("Identity '{}' is not an integer", raw)).with_source(e)
            }),
            AttributeType::String | AttributeType::Text | AttributeType::Enum => {
                Ok(Value::String(raw.to_string()))
            }
            other => Err(SyncError::serialization(format!(
                "{:?} cannot be used as an identity attribute",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeType,
}

impl Attribute {
    pub fn new(name: impl Into<String>, kind: AttributeType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn xref(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            AttributeType::Xref {
                target: target.into(),
            },
        )
    }

    pub fn mref(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            AttributeType::Mref {
                target: target.into(),
            },
        )
    }
}

/// Record type descriptor
///
/// The identity attribute is always the first attribute. Schemas are
/// immutable once handed to the engine.
///
/// # Examples
///
/// ```rust
/// use searchsync::domain::{Attribute, AttributeType, Schema};
///
/// let person = Schema::new("Person", Attribute::new("id", AttributeType::String))
///     .with_attribute(Attribute::new("name", AttributeType::String))
///     .with_attribute(Attribute::xref("bestFriend", "Person"));
///
/// assert_eq!(person.id_attribute().name, "id");
/// assert_eq!(person.reference_attributes().count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SchemaFields")]
pub struct Schema {
    pub id: String,
    /// Never empty; the first entry is the identity attribute
    attributes: Vec<Attribute>,
}

#[derive(Deserialize)]
struct SchemaFields {
    id: String,
    attributes: Vec<Attribute>,
}

impl TryFrom<SchemaFields> for Schema {
    type Error = String;

    fn try_from(fields: SchemaFields) -> std::result::Result<Self, Self::Error> {
        if fields.attributes.is_empty() {
            return Err(format!("Schema {} has no identity attribute", fields.id));
        }
        Ok(Self {
            id: fields.id,
            attributes: fields.attributes,
        })
    }
}

impl Schema {
    pub fn new(id: impl Into<String>, id_attribute: Attribute) -> Self {
        Self {
            id: id.into(),
            attributes: vec![id_attribute],
        }
    }

    pub fn with_attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn id_attribute(&self) -> &Attribute {
        &self.attributes[0]
    }

    /// All attributes in declaration order, identity first
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Reference-typed attributes paired with their target schema id
    pub fn reference_attributes(&self) -> impl Iterator<Item = (&Attribute, &str)> {
        self.attributes
            .iter()
            .filter_map(|a| a.kind.reference_target().map(|target| (a, target)))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Records
// ═══════════════════════════════════════════════════════════════════════════

/// Attribute value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    String(String),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    /// Identity of a referenced record
    Ref(Box<Value>),
    /// The referenced record itself
    Nested(Box<Record>),
    /// Multi-valued reference (`Ref` / `Nested` items)
    List(Vec<Value>),
}

impl Value {
    pub fn reference(id: impl Into<Value>) -> Self {
        Value::Ref(Box::new(id.into()))
    }

    pub fn nested(record: Record) -> Self {
        Value::Nested(Box::new(record))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// String form used for document ids and term matching on identities
    pub fn identity_string(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Ref(inner) => inner.identity_string(),
            Value::Nested(record) => record.id.identity_string(),
            _ => None,
        }
    }

    /// Identity a reference value points at. Bare identity scalars count too.
    pub fn referenced_identity(&self) -> Option<&Value> {
        match self {
            Value::Ref(inner) => Some(inner),
            Value::Nested(record) => Some(&record.id),
            Value::String(_) | Value::Int(_) => Some(self),
            _ => None,
        }
    }

    /// Individual references held by an xref or mref value
    pub fn references(&self) -> Vec<&Value> {
        match self {
            Value::List(items) => items.iter().filter_map(Value::referenced_identity).collect(),
            Value::Null => Vec::new(),
            other => other.referenced_identity().into_iter().collect(),
        }
    }

    /// Plain JSON projection for scalar values
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Decimal(d) => serde_json::Number::from_f64(*d)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Date(d) => Json::String(d.format("%Y-%m-%d").to_string()),
            Value::DateTime(dt) => Json::String(dt.to_rfc3339()),
            Value::Ref(inner) => inner.to_json(),
            Value::Nested(record) => record.id.to_json(),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identity_string() {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "{}", self.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Decimal(d)
    }
}

/// One instance of a schema held in the primary store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Identity value
    pub id: Value,
    /// Non-identity attribute values by attribute name
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(attribute.into(), value.into());
        self
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(attribute.into(), value.into());
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Indexing metadata
// ═══════════════════════════════════════════════════════════════════════════

/// Whether an index write should cascade to referencing documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexingMode {
    /// New record, nothing can reference it yet
    #[default]
    Add,
    /// Existing record changed; referencing documents are re-indexed
    Update,
}

impl IndexingMode {
    pub fn cascades(&self) -> bool {
        matches!(self, IndexingMode::Update)
    }
}

/// `(schema_id, attribute)` holding a reference to some target schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceEdge {
    pub schema_id: String,
    pub attribute: String,
}

impl ReferenceEdge {
    pub fn new(schema_id: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            attribute: attribute.into(),
        }
    }
}

/// Lightweight reference to a record, as returned by search
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRef {
    pub schema_id: String,
    pub id: Value,
}

/// Attribute selection for primary-store reads
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FetchSpec {
    /// `None` loads every attribute
    pub attributes: Option<Vec<String>>,
    /// Replace reference identities with the referenced records (one level)
    pub expand_references: bool,
}

impl FetchSpec {
    /// Everything needed to build a document: all attributes, references expanded
    pub fn for_reindexing() -> Self {
        Self {
            attributes: None,
            expand_references: true,
        }
    }

    pub fn includes(&self, attribute: &str) -> bool {
        self.attributes
            .as_ref()
            .map_or(true, |attrs| attrs.iter().any(|a| a == attribute))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> Schema {
        Schema::new("Person", Attribute::new("id", AttributeType::String))
            .with_attribute(Attribute::new("name", AttributeType::String))
            .with_attribute(Attribute::xref("bestFriend", "Person"))
            .with_attribute(Attribute::mref("pets", "Pet"))
    }

    #[test]
    fn test_schema_reference_attributes() {
        let schema = person();
        let refs: Vec<_> = schema
            .reference_attributes()
            .map(|(a, target)| (a.name.as_str(), target))
            .collect();
        assert_eq!(refs, vec![("bestFriend", "Person"), ("pets", "Pet")]);
        assert!(schema.attribute("name").is_some());
        assert!(schema.attribute("missing").is_none());
    }

    #[test]
    fn test_schema_deserialization_requires_identity() {
        let schema = person();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(serde_json::from_value::<Schema>(json).unwrap(), schema);

        let err = serde_json::from_value::<Schema>(serde_json::json!({
            "id": "Empty",
            "attributes": []
        }))
        .unwrap_err();
        assert!(err.to_string().contains("Schema Empty has no identity attribute"));
    }

    #[test]
    fn test_parse_identity() {
        assert_eq!(
            AttributeType::Long.parse_identity("42").unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            AttributeType::String.parse_identity("A").unwrap(),
            Value::from("A")
        );
        assert!(AttributeType::Int.parse_identity("A").is_err());
        assert!(AttributeType::Bool.parse_identity("true").is_err());
    }

    #[test]
    fn test_reference_identity_forms() {
        let by_id = Value::reference("A");
        let nested = Value::nested(Record::new("A").with("name", "Alice"));
        let bare = Value::from("A");

        for value in [&by_id, &nested, &bare] {
            assert_eq!(value.referenced_identity(), Some(&Value::from("A")));
        }
    }

    #[test]
    fn test_mref_references() {
        let pets = Value::List(vec![Value::reference(1), Value::nested(Record::new(2))]);
        let ids: Vec<_> = pets.references().into_iter().cloned().collect();
        assert_eq!(ids, vec![Value::Int(1), Value::Int(2)]);
        assert!(Value::Null.references().is_empty());
    }

    #[test]
    fn test_value_json_projection() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(Value::Date(date).to_json(), serde_json::json!("2024-02-29"));
        assert_eq!(Value::Decimal(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(Value::reference(7).to_json(), serde_json::json!(7));
    }

    #[test]
    fn test_fetch_spec() {
        let all = FetchSpec::for_reindexing();
        assert!(all.includes("anything"));
        assert!(all.expand_references);

        let some = FetchSpec {
            attributes: Some(vec!["name".to_string()]),
            expand_references: false,
        };
        assert!(some.includes("name"));
        assert!(!some.includes("bestFriend"));
    }

    #[test]
    fn test_indexing_mode() {
        assert!(!IndexingMode::Add.cascades());
        assert!(IndexingMode::Update.cascades());
        assert_eq!(IndexingMode::default(), IndexingMode::Add);
    }
}
