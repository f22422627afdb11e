//! JSON query DSL translation
//!
//! | Rule          | Emitted                                   |
//! |---------------|-------------------------------------------|
//! | none          | `{"match_all": {}}`                       |
//! | `Eq`          | `{"term": {path: value}}`                 |
//! | `Eq` on null  | `bool.must_not: [{"exists": {field}}]`    |
//! | `In`          | `{"terms": {path: [values]}}`             |
//! | `Not`         | `{"bool": {"must_not": [..]}}`            |
//! | `And` / `Or`  | `{"bool": {"must" / "should": [..]}}`     |
//!
//! Reference attributes are matched on the nested identity field
//! (`bestFriend` -> `bestFriend.id`).

use serde_json::{json, Value as Json};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::domain::{
    AggregateQuery, AggregateResult, AggregationRequest, AggregationResponse, BackendQuery, Query,
    QueryRule, QueryTranslator, Schema, SchemaRegistry,
};
use crate::error::{Result, SyncError};

pub struct JsonQueryTranslator {
    registry: Arc<dyn SchemaRegistry>,
}

impl JsonQueryTranslator {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self { registry }
    }

    /// Document path an attribute is matched on
    pub fn field_path(&self, schema: &Schema, attribute: &str) -> Result<String> {
        if let Some(attr) = schema.attribute(attribute) {
            return match attr.kind.reference_target() {
                Some(target) => {
                    let target = self
                        .registry
                        .schema(target)
                        .ok_or_else(|| SyncError::unknown_schema(target))?;
                    Ok(format!("{}.{}", attribute, target.id_attribute().name))
                }
                None => Ok(attribute.to_string()),
            };
        }

        // Explicit path into a nested reference, e.g. `bestFriend.name`
        match attribute.split_once('.') {
            Some((head, _)) if schema.attribute(head).is_some_and(|a| a.kind.is_reference()) => {
                Ok(attribute.to_string())
            }
            _ => Err(SyncError::invalid_query(format!(
                "Unknown attribute {}.{}",
                schema.id, attribute
            ))),
        }
    }

    fn rule(&self, schema: &Schema, rule: &QueryRule) -> Result<Json> {
        Ok(match rule {
            QueryRule::Eq { attribute, value } => {
                let path = self.field_path(schema, attribute)?;
                if value.is_null() {
                    json!({ "bool": { "must_not": [ { "exists": { "field": path } } ] } })
                } else {
                    json!({ "term": { path: value.to_json() } })
                }
            }
            QueryRule::In { attribute, values } => {
                let path = self.field_path(schema, attribute)?;
                let values: Vec<Json> = values.iter().map(|v| v.to_json()).collect();
                json!({ "terms": { path: values } })
            }
            QueryRule::Not(inner) => {
                json!({ "bool": { "must_not": [ self.rule(schema, inner)? ] } })
            }
            QueryRule::And(rules) => json!({ "bool": { "must": self.rules(schema, rules)? } }),
            QueryRule::Or(rules) => json!({ "bool": { "should": self.rules(schema, rules)? } }),
        })
    }

    fn rules(&self, schema: &Schema, rules: &[QueryRule]) -> Result<Vec<Json>> {
        rules.iter().map(|rule| self.rule(schema, rule)).collect()
    }
}

impl QueryTranslator for JsonQueryTranslator {
    fn translate(&self, schema: &Schema, query: &Query) -> Result<BackendQuery> {
        match &query.rule {
            Some(rule) => Ok(BackendQuery(self.rule(schema, rule)?)),
            None => Ok(BackendQuery::match_all()),
        }
    }

    fn translate_aggregate(
        &self,
        schema: &Schema,
        index: &str,
        query: &AggregateQuery,
    ) -> Result<AggregationRequest> {
        let mut group_by = vec![self.field_path(schema, &query.attribute_x)?];
        if let Some(y) = &query.attribute_y {
            group_by.push(self.field_path(schema, y)?);
        }
        let distinct_field = query
            .attribute_distinct
            .as_deref()
            .map(|attribute| self.field_path(schema, attribute))
            .transpose()?;

        Ok(AggregationRequest {
            index: index.to_string(),
            query: self.translate(schema, &query.query)?,
            group_by,
            distinct_field,
        })
    }

    fn parse_aggregate(
        &self,
        query: &AggregateQuery,
        response: AggregationResponse,
    ) -> Result<AggregateResult> {
        let two_dimensional = query.attribute_y.is_some();

        let mut cells: BTreeMap<String, BTreeMap<String, u64>> = BTreeMap::new();
        let mut y_labels = BTreeSet::new();
        for bucket in response.buckets {
            let row = cells.entry(label(&bucket.key)).or_default();
            if two_dimensional {
                for inner in bucket.buckets {
                    let y = label(&inner.key);
                    *row.entry(y.clone()).or_insert(0) += inner.count;
                    y_labels.insert(y);
                }
            } else {
                *row.entry(String::new()).or_insert(0) += bucket.count;
            }
        }

        let y_labels: Vec<String> = y_labels.into_iter().collect();
        let matrix: Vec<Vec<u64>> = cells
            .values()
            .map(|row| {
                if two_dimensional {
                    y_labels
                        .iter()
                        .map(|y| row.get(y).copied().unwrap_or(0))
                        .collect()
                } else {
                    vec![row.values().sum()]
                }
            })
            .collect();

        Ok(AggregateResult {
            x_labels: cells.into_keys().collect(),
            y_labels,
            matrix,
        })
    }
}

fn label(key: &Json) -> String {
    match key {
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}
