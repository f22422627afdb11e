//! In-memory primary store (for testing)
//!
//! Ordered per-schema tables. `records_for_schema` reads one batch per poll,
//! so writes that land between batches are seen by later batches only.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::Arc;

use crate::domain::{FetchSpec, PrimaryStore, Record, Schema, SchemaRegistry, Value};
use crate::error::{Result, SyncError};

/// Table key: integer identities sort numerically, string ones lexically
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum RowKey {
    Int(i64),
    Str(String),
}

impl RowKey {
    fn of(id: &Value) -> Result<Self> {
        match id.referenced_identity() {
            Some(Value::Int(i)) => Ok(RowKey::Int(*i)),
            Some(Value::String(s)) => Ok(RowKey::Str(s.clone())),
            _ => Err(SyncError::primary_store(format!(
                "Unsupported identity value: {}",
                id
            ))),
        }
    }
}

type Table = BTreeMap<RowKey, Record>;

pub struct InMemoryPrimaryStore {
    registry: Arc<dyn SchemaRegistry>,
    tables: RwLock<HashMap<String, Table>>,
}

impl InMemoryPrimaryStore {
    pub fn new(registry: Arc<dyn SchemaRegistry>) -> Self {
        Self {
            registry,
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a record of a registered schema
    pub fn upsert(&self, schema_id: &str, record: Record) -> Result<()> {
        if self.registry.schema(schema_id).is_none() {
            return Err(SyncError::unknown_schema(schema_id));
        }
        let key = RowKey::of(&record.id)?;
        self.tables
            .write()
            .entry(schema_id.to_string())
            .or_default()
            .insert(key, record);
        Ok(())
    }

    pub fn remove(&self, schema_id: &str, id: &Value) -> Option<Record> {
        let key = RowKey::of(id).ok()?;
        self.tables.write().get_mut(schema_id)?.remove(&key)
    }

    pub fn get(&self, schema_id: &str, id: &Value) -> Option<Record> {
        let key = RowKey::of(id).ok()?;
        self.tables.read().get(schema_id)?.get(&key).cloned()
    }

    pub fn len(&self, schema_id: &str) -> usize {
        self.tables.read().get(schema_id).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self, schema_id: &str) -> bool {
        self.len(schema_id) == 0
    }

    /// Up to `limit` records after `after`, plus the key of the last one
    fn batch_after(
        &self,
        schema: &Schema,
        fetch: &FetchSpec,
        after: Option<&RowKey>,
        limit: usize,
    ) -> Result<(Vec<Record>, Option<RowKey>)> {
        let tables = self.tables.read();
        let Some(table) = tables.get(&schema.id) else {
            return Ok((Vec::new(), None));
        };

        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        let rows: Vec<(&RowKey, &Record)> = table.range((lower, Bound::Unbounded)).take(limit).collect();
        let last = rows.last().map(|(key, _)| (*key).clone());

        let records = rows
            .into_iter()
            .map(|(_, record)| self.project(&tables, schema, record, fetch))
            .collect::<Result<Vec<_>>>()?;
        Ok((records, last))
    }

    /// Apply the fetch spec: attribute selection and one level of
    /// reference expansion
    fn project(
        &self,
        tables: &HashMap<String, Table>,
        schema: &Schema,
        record: &Record,
        fetch: &FetchSpec,
    ) -> Result<Record> {
        let mut projected = Record::new(record.id.clone());

        for (name, value) in &record.values {
            if !fetch.includes(name) {
                continue;
            }

            let target = schema
                .attribute(name)
                .and_then(|a| a.kind.reference_target());
            let value = match target {
                Some(target) if fetch.expand_references => {
                    if self.registry.schema(target).is_none() {
                        return Err(SyncError::unknown_schema(target));
                    }
                    expand(tables.get(target), value)
                }
                _ => value.clone(),
            };
            projected.values.insert(name.clone(), value);
        }

        Ok(projected)
    }
}

fn expand(table: Option<&Table>, value: &Value) -> Value {
    match value {
        Value::List(items) => Value::List(items.iter().map(|item| expand(table, item)).collect()),
        Value::Nested(_) | Value::Null => value.clone(),
        reference => {
            let found = RowKey::of(reference)
                .ok()
                .and_then(|key| table?.get(&key).cloned());
            match found {
                Some(target) => Value::nested(target),
                None => reference.clone(),
            }
        }
    }
}

#[async_trait]
impl PrimaryStore for InMemoryPrimaryStore {
    fn records_for_schema<'a>(
        &'a self,
        schema: &'a Schema,
        fetch: &'a FetchSpec,
        batch_size: usize,
    ) -> BoxStream<'a, Result<Vec<Record>>> {
        let batch_size = batch_size.max(1);

        // State: `None` once finished, otherwise the last key handed out
        stream::unfold(Some(None::<RowKey>), move |state| async move {
            let after = state?;
            match self.batch_after(schema, fetch, after.as_ref(), batch_size) {
                Ok((records, _)) if records.is_empty() => None,
                Ok((records, last)) => {
                    let next = if records.len() < batch_size { None } else { Some(last) };
                    Some((Ok(records), next))
                }
                Err(err) => Some((Err(err), None)),
            }
        })
        .boxed()
    }

    async fn fetch_by_ids(
        &self,
        schema: &Schema,
        ids: &[Value],
        fetch: &FetchSpec,
    ) -> Result<Vec<Record>> {
        let tables = self.tables.read();
        let Some(table) = tables.get(&schema.id) else {
            return Ok(Vec::new());
        };

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = table.get(&RowKey::of(id)?) {
                records.push(self.project(&tables, schema, record, fetch)?);
            }
        }
        Ok(records)
    }
}
