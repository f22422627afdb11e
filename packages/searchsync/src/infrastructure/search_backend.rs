//! In-memory search backend (for testing)
//!
//! Evaluates the JSON DSL emitted by `JsonQueryTranslator` over stored
//! documents. Behaves like a strict search cluster:
//!
//! - writes into a missing index are item failures, indices are never
//!   auto-created
//! - scroll contexts snapshot the matching ids when opened and stay pinned
//!   until cleared
//! - with manual refresh enabled, searches only see writes made before the
//!   last `refresh`
//!
//! Failure injection and call statistics exist for tests only.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::trace;

use crate::config::IndexSettings;
use crate::domain::{
    AggregationRequest, AggregationResponse, BackendQuery, Bucket, BulkAction, BulkItemResult,
    BulkRequest, BulkResponse, DocumentId, IndexOutcome, ItemStatus, Mapping, ScrollId,
    SearchPage, SearchRequest, SearchTransport,
};
use crate::error::{Result, SyncError};

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub bulk_requests: usize,
    pub search_requests: usize,
    pub scroll_requests: usize,
    pub cleared_scrolls: usize,
}

#[derive(Debug)]
struct IndexState {
    settings: IndexSettings,
    mapping: Mapping,
    /// Latest documents
    documents: BTreeMap<String, Json>,
    /// What searches see under manual refresh
    visible: BTreeMap<String, Json>,
    /// Successful writes per document id
    writes: HashMap<String, u64>,
}

impl IndexState {
    fn new(settings: IndexSettings, mapping: Mapping) -> Self {
        Self {
            settings,
            mapping,
            documents: BTreeMap::new(),
            visible: BTreeMap::new(),
            writes: HashMap::new(),
        }
    }
}

#[derive(Debug)]
struct ScrollContext {
    remaining: VecDeque<DocumentId>,
    page_size: usize,
    total: u64,
}

#[derive(Debug, Default)]
struct Faults {
    rejected_mappings: HashSet<String>,
    rejected_documents: HashSet<(String, String)>,
    /// Successful bulk calls left before every bulk fails
    bulk_budget: Option<usize>,
    fail_next_scroll: bool,
}

#[derive(Debug, Default)]
pub struct InMemorySearchBackend {
    indices: RwLock<HashMap<String, IndexState>>,
    scrolls: Mutex<HashMap<String, ScrollContext>>,
    next_scroll: Mutex<u64>,
    faults: Mutex<Faults>,
    stats: Mutex<BackendStats>,
    manual_refresh: bool,
}

impl InMemorySearchBackend {
    /// Writes are searchable immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes become searchable on `refresh` only
    pub fn with_manual_refresh() -> Self {
        Self {
            manual_refresh: true,
            ..Self::default()
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inspection
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    pub fn stats(&self) -> BackendStats {
        *self.stats.lock()
    }

    pub fn open_scrolls(&self) -> usize {
        self.scrolls.lock().len()
    }

    /// Stored documents, visible or not; 0 for a missing index
    pub fn document_count(&self, index: &str) -> usize {
        self.indices
            .read()
            .get(index)
            .map_or(0, |state| state.documents.len())
    }

    pub fn document(&self, index: &str, id: &str) -> Option<Json> {
        self.indices.read().get(index)?.documents.get(id).cloned()
    }

    /// How many times a document was (re)written
    pub fn write_count(&self, index: &str, id: &str) -> u64 {
        self.indices
            .read()
            .get(index)
            .and_then(|state| state.writes.get(id).copied())
            .unwrap_or(0)
    }

    pub fn mapping(&self, index: &str) -> Option<Mapping> {
        self.indices.read().get(index).map(|state| state.mapping.clone())
    }

    pub fn settings(&self, index: &str) -> Option<IndexSettings> {
        self.indices.read().get(index).map(|state| state.settings.clone())
    }

    pub fn index_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn reset_stats(&self) {
        *self.stats.lock() = BackendStats::default();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Failure injection
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Reject index creation for `index`
    pub fn reject_mapping(&self, index: &str) {
        self.faults.lock().rejected_mappings.insert(index.to_string());
    }

    /// Fail every write of one document as an item failure
    pub fn reject_document(&self, index: &str, id: &str) {
        self.faults
            .lock()
            .rejected_documents
            .insert((index.to_string(), id.to_string()));
    }

    /// Let `successes` bulk calls through, then fail every bulk call
    pub fn fail_bulk_after(&self, successes: usize) {
        self.faults.lock().bulk_budget = Some(successes);
    }

    pub fn fail_next_scroll(&self) {
        self.faults.lock().fail_next_scroll = true;
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    fn searchable<'a>(&self, state: &'a IndexState) -> &'a BTreeMap<String, Json> {
        if self.manual_refresh {
            &state.visible
        } else {
            &state.documents
        }
    }

    fn open_scroll(&self, context: ScrollContext) -> ScrollId {
        let mut next = self.next_scroll.lock();
        *next += 1;
        let id = format!("scroll-{}", *next);
        self.scrolls.lock().insert(id.clone(), context);
        ScrollId(id)
    }

    fn apply(&self, state: Option<&mut IndexState>, index: &str, id: &DocumentId, action: BulkAction) -> ItemStatus {
        let Some(state) = state else {
            return ItemStatus::IndexNotFound;
        };

        match action {
            BulkAction::Index { source } => {
                let rejected = self
                    .faults
                    .lock()
                    .rejected_documents
                    .contains(&(index.to_string(), id.0.clone()));
                if rejected {
                    return ItemStatus::Failed(format!(
                        "mapper_parsing_exception: failed to parse document [{}]",
                        id
                    ));
                }
                state.documents.insert(id.0.clone(), source);
                *state.writes.entry(id.0.clone()).or_insert(0) += 1;
                ItemStatus::Applied
            }
            BulkAction::Delete => match state.documents.remove(id.as_str()) {
                Some(_) => ItemStatus::Applied,
                None => ItemStatus::NotFound,
            },
        }
    }
}

#[async_trait]
impl SearchTransport for InMemorySearchBackend {
    async fn create_index(
        &self,
        index: &str,
        settings: &IndexSettings,
        mapping: &Mapping,
    ) -> Result<()> {
        if self.faults.lock().rejected_mappings.contains(index) {
            return Err(SyncError::index_creation(index, "mapper_parsing_exception"));
        }

        let mut indices = self.indices.write();
        if indices.contains_key(index) {
            return Err(SyncError::index_creation(
                index,
                "resource_already_exists_exception",
            ));
        }
        indices.insert(
            index.to_string(),
            IndexState::new(settings.clone(), mapping.clone()),
        );
        trace!("Created index [{}]", index);
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool> {
        Ok(self.indices.read().contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> Result<IndexOutcome<()>> {
        Ok(match self.indices.write().remove(index) {
            Some(_) => IndexOutcome::Done(()),
            None => IndexOutcome::IndexNotFound,
        })
    }

    async fn refresh(&self, index: Option<&str>) -> Result<()> {
        let mut indices = self.indices.write();
        match index {
            Some(name) => {
                let state = indices
                    .get_mut(name)
                    .ok_or_else(|| SyncError::index_not_found(name))?;
                state.visible = state.documents.clone();
            }
            None => {
                for state in indices.values_mut() {
                    state.visible = state.documents.clone();
                }
            }
        }
        Ok(())
    }

    async fn bulk(&self, request: BulkRequest) -> Result<BulkResponse> {
        let start = Instant::now();
        self.stats.lock().bulk_requests += 1;

        {
            let mut faults = self.faults.lock();
            if let Some(budget) = faults.bulk_budget.as_mut() {
                if *budget == 0 {
                    return Err(SyncError::search_backend(format!(
                        "Bulk #{} failed: connection reset",
                        request.execution_id
                    )));
                }
                *budget -= 1;
            }
        }

        let mut indices = self.indices.write();
        let items = request
            .operations
            .into_iter()
            .map(|op| {
                let status = self.apply(indices.get_mut(&op.index), &op.index, &op.id, op.action);
                BulkItemResult {
                    index: op.index,
                    id: op.id,
                    status,
                }
            })
            .collect();

        Ok(BulkResponse {
            items,
            took: start.elapsed(),
        })
    }

    async fn delete_document(&self, index: &str, id: &DocumentId) -> Result<IndexOutcome<bool>> {
        let mut indices = self.indices.write();
        let Some(state) = indices.get_mut(index) else {
            return Ok(IndexOutcome::IndexNotFound);
        };
        Ok(IndexOutcome::Done(state.documents.remove(id.as_str()).is_some()))
    }

    async fn search(&self, request: SearchRequest) -> Result<IndexOutcome<SearchPage>> {
        self.stats.lock().search_requests += 1;

        let matched: Vec<DocumentId> = {
            let indices = self.indices.read();
            let Some(state) = indices.get(&request.index) else {
                return Ok(IndexOutcome::IndexNotFound);
            };
            let mut matched = Vec::new();
            for (id, doc) in self.searchable(state) {
                if matches(&request.query.0, doc)? {
                    matched.push(DocumentId(id.clone()));
                }
            }
            matched
        };
        let total = matched.len() as u64;

        if request.scroll.is_some() {
            let page_size = request.size.max(1);
            let mut remaining: VecDeque<DocumentId> = matched.into();
            let first: Vec<DocumentId> = remaining
                .drain(..page_size.min(remaining.len()))
                .collect();
            let scroll_id = self.open_scroll(ScrollContext {
                remaining,
                page_size,
                total,
            });
            return Ok(IndexOutcome::Done(SearchPage {
                ids: first,
                total,
                scroll_id: Some(scroll_id),
            }));
        }

        let ids = matched
            .into_iter()
            .skip(request.from)
            .take(request.size)
            .collect();
        Ok(IndexOutcome::Done(SearchPage {
            ids,
            total,
            scroll_id: None,
        }))
    }

    async fn scroll(&self, scroll_id: &ScrollId, _keep_alive: Duration) -> Result<SearchPage> {
        self.stats.lock().scroll_requests += 1;

        if std::mem::take(&mut self.faults.lock().fail_next_scroll) {
            return Err(SyncError::search_backend("Scroll request failed: connection reset"));
        }

        let mut scrolls = self.scrolls.lock();
        let context = scrolls.get_mut(&scroll_id.0).ok_or_else(|| {
            SyncError::search_backend(format!("No search context found for id [{}]", scroll_id.0))
        })?;

        let take = context.page_size.min(context.remaining.len());
        Ok(SearchPage {
            ids: context.remaining.drain(..take).collect(),
            total: context.total,
            scroll_id: Some(scroll_id.clone()),
        })
    }

    async fn clear_scroll(&self, scroll_id: &ScrollId) -> Result<()> {
        if self.scrolls.lock().remove(&scroll_id.0).is_some() {
            self.stats.lock().cleared_scrolls += 1;
        }
        Ok(())
    }

    async fn count(&self, index: &str, query: Option<&BackendQuery>) -> Result<IndexOutcome<u64>> {
        let indices = self.indices.read();
        let Some(state) = indices.get(index) else {
            return Ok(IndexOutcome::IndexNotFound);
        };

        let mut count = 0u64;
        for doc in self.searchable(state).values() {
            let hit = match query {
                Some(query) => matches(&query.0, doc)?,
                None => true,
            };
            if hit {
                count += 1;
            }
        }
        Ok(IndexOutcome::Done(count))
    }

    async fn aggregate(
        &self,
        request: AggregationRequest,
    ) -> Result<IndexOutcome<AggregationResponse>> {
        let indices = self.indices.read();
        let Some(state) = indices.get(&request.index) else {
            return Ok(IndexOutcome::IndexNotFound);
        };

        let mut docs = Vec::new();
        for doc in self.searchable(state).values() {
            if matches(&request.query.0, doc)? {
                docs.push(doc);
            }
        }

        Ok(IndexOutcome::Done(AggregationResponse {
            buckets: group(&docs, &request.group_by, request.distinct_field.as_deref()),
        }))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Query evaluation
// ═══════════════════════════════════════════════════════════════════════════

/// Values at a dotted path, flattening arrays at every step
fn values_at<'a>(doc: &'a Json, path: &str) -> Vec<&'a Json> {
    let mut current = vec![doc];
    for part in path.split('.') {
        let mut next = Vec::new();
        for value in current {
            match value.get(part) {
                Some(Json::Array(items)) => next.extend(items.iter()),
                Some(found) => next.push(found),
                None => {}
            }
        }
        current = next;
    }
    current
}

fn matches(query: &Json, doc: &Json) -> Result<bool> {
    let Some((kind, body)) = query.as_object().and_then(|o| o.iter().next()) else {
        return Err(SyncError::invalid_query(format!("Malformed query: {}", query)));
    };

    match kind.as_str() {
        "match_all" => Ok(true),
        "term" => {
            let (path, expected) = single_field(body)?;
            Ok(values_at(doc, path).iter().any(|v| *v == expected))
        }
        "terms" => {
            let (path, expected) = single_field(body)?;
            let candidates = expected.as_array().ok_or_else(|| {
                SyncError::invalid_query(format!("terms on [{}] expects an array", path))
            })?;
            Ok(values_at(doc, path).iter().any(|v| candidates.contains(*v)))
        }
        "exists" => {
            let path = body.get("field").and_then(Json::as_str).ok_or_else(|| {
                SyncError::invalid_query(format!("exists without field: {}", body))
            })?;
            Ok(values_at(doc, path).iter().any(|v| !v.is_null()))
        }
        "bool" => {
            for clause in clauses(body, "must") {
                if !matches(clause, doc)? {
                    return Ok(false);
                }
            }
            for clause in clauses(body, "must_not") {
                if matches(clause, doc)? {
                    return Ok(false);
                }
            }
            let should = clauses(body, "should");
            if should.is_empty() {
                return Ok(true);
            }
            for clause in should {
                if matches(clause, doc)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        other => Err(SyncError::invalid_query(format!(
            "Unsupported query type: {}",
            other
        ))),
    }
}

fn clauses<'a>(body: &'a Json, key: &str) -> &'a [Json] {
    body.get(key)
        .and_then(Json::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn single_field(body: &Json) -> Result<(&str, &Json)> {
    body.as_object()
        .and_then(|o| o.iter().next())
        .map(|(path, value)| (path.as_str(), value))
        .ok_or_else(|| SyncError::invalid_query(format!("Expected one field: {}", body)))
}

// ═══════════════════════════════════════════════════════════════════════════
// Aggregation
// ═══════════════════════════════════════════════════════════════════════════

/// Terms buckets over `group_by[0]`, recursing into the remaining paths.
/// A document lands in one bucket per distinct value it holds.
fn group(docs: &[&Json], group_by: &[String], distinct: Option<&str>) -> Vec<Bucket> {
    let Some((path, rest)) = group_by.split_first() else {
        return Vec::new();
    };

    let mut grouped: BTreeMap<String, (Json, Vec<&Json>)> = BTreeMap::new();
    for doc in docs {
        let mut seen = HashSet::new();
        for value in values_at(doc, path) {
            if value.is_null() || !seen.insert(value.to_string()) {
                continue;
            }
            grouped
                .entry(value.to_string())
                .or_insert_with(|| (value.clone(), Vec::new()))
                .1
                .push(*doc);
        }
    }

    let mut buckets: Vec<Bucket> = grouped
        .into_values()
        .map(|(key, members)| Bucket {
            key,
            count: bucket_count(&members, distinct),
            buckets: group(&members, rest, distinct),
        })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count));
    buckets
}

fn bucket_count(docs: &[&Json], distinct: Option<&str>) -> u64 {
    match distinct {
        Some(path) => {
            let values: HashSet<String> = docs
                .iter()
                .flat_map(|doc| values_at(doc, path))
                .filter(|v| !v.is_null())
                .map(|v| v.to_string())
                .collect();
            values.len() as u64
        }
        None => docs.len() as u64,
    }
}
