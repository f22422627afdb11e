//! Bulk write batching
//!
//! Operations are cut into chunks of `batch_size` and submitted one chunk at
//! a time, so neither the request nor the buffered operations grow with the
//! input. Item-level failures are logged and left out of the counts; a
//! transport failure aborts the submission. A write into an index that does
//! not exist is a failure and marks the index as missing; a delete from one
//! is a no-op.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace, warn};

use crate::domain::{
    BulkOperation, BulkRequest, BulkResponse, DocumentId, IndexOutcome, ItemStatus,
    SearchTransport,
};
use crate::error::{Result, SyncError};

/// Observer for bulk submissions
///
/// Purely observational: returning from a callback never changes what the
/// batcher does next.
pub trait BulkListener: Send + Sync {
    fn before_bulk(&self, _execution_id: u64, _actions: usize) {}

    fn after_bulk(&self, _execution_id: u64, _actions: usize, _response: &BulkResponse) {}

    fn on_bulk_failure(&self, _execution_id: u64, _actions: usize, _error: &SyncError) {}
}

/// Default listener: trace on begin/end, warn on failure
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingBulkListener;

impl BulkListener for TracingBulkListener {
    fn before_bulk(&self, execution_id: u64, actions: usize) {
        trace!(
            "Going to execute bulk #{} composed of {} actions",
            execution_id,
            actions
        );
    }

    fn after_bulk(&self, execution_id: u64, actions: usize, response: &BulkResponse) {
        trace!(
            "Executed bulk #{} composed of {} actions in {}ms",
            execution_id,
            actions,
            response.took.as_millis()
        );
    }

    fn on_bulk_failure(&self, execution_id: u64, actions: usize, error: &SyncError) {
        warn!(
            "Error executing bulk #{} ({} actions): {}",
            execution_id, actions, error
        );
    }
}

/// Applied operations per index name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkCounts {
    counts: HashMap<String, u64>,
    /// Indices a write was addressed to but which did not exist
    missing: BTreeSet<String>,
}

impl BulkCounts {
    pub fn get(&self, index: &str) -> u64 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Applied count, or `IndexNotFound` if a write hit a missing index
    pub fn outcome(&self, index: &str) -> IndexOutcome<u64> {
        if self.missing.contains(index) {
            IndexOutcome::IndexNotFound
        } else {
            IndexOutcome::Done(self.get(index))
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(index, count)| (index.as_str(), *count))
    }

    pub fn merge(&mut self, other: BulkCounts) {
        for (index, count) in other.counts {
            *self.counts.entry(index).or_insert(0) += count;
        }
        self.missing.extend(other.missing);
    }

    fn increment(&mut self, index: &str) {
        *self.counts.entry(index.to_string()).or_insert(0) += 1;
    }

    fn mark_missing(&mut self, index: &str) {
        if !self.missing.contains(index) {
            self.missing.insert(index.to_string());
        }
    }
}

/// Size-bounded bulk submitter
pub struct BulkWriter {
    transport: Arc<dyn SearchTransport>,
    listener: Arc<dyn BulkListener>,
    batch_size: usize,
    next_execution_id: AtomicU64,
}

impl BulkWriter {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        listener: Arc<dyn BulkListener>,
        batch_size: usize,
    ) -> Self {
        Self {
            transport,
            listener,
            batch_size: batch_size.max(1),
            next_execution_id: AtomicU64::new(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Submit operations in chunks of `batch_size`
    ///
    /// # Returns
    /// * `Ok(counts)` - per-index number of operations the backend applied
    /// * `Err(...)` - a chunk failed at the transport level; earlier chunks
    ///   stay applied
    pub async fn submit<I>(&self, operations: I) -> Result<BulkCounts>
    where
        I: IntoIterator<Item = BulkOperation>,
        I::IntoIter: Send,
    {
        let mut counts = BulkCounts::default();
        let mut chunk = Vec::with_capacity(self.batch_size);

        for operation in operations {
            chunk.push(operation);
            if chunk.len() == self.batch_size {
                let full = std::mem::replace(&mut chunk, Vec::with_capacity(self.batch_size));
                self.send_chunk(full, &mut counts).await?;
            }
        }
        if !chunk.is_empty() {
            self.send_chunk(chunk, &mut counts).await?;
        }

        Ok(counts)
    }

    /// Delete documents from one index in chunks of `batch_size`
    ///
    /// Ids that do not exist, or an index that does not exist, are not
    /// errors; they simply do not count.
    pub async fn delete_batch<I>(&self, index: &str, ids: I) -> Result<BulkCounts>
    where
        I: IntoIterator<Item = DocumentId>,
        I::IntoIter: Send,
    {
        let index = index.to_string();
        self.submit(
            ids.into_iter()
                .map(move |id| BulkOperation::delete(index.clone(), id)),
        )
        .await
    }

    async fn send_chunk(&self, chunk: Vec<BulkOperation>, counts: &mut BulkCounts) -> Result<()> {
        let execution_id = self.next_execution_id.fetch_add(1, Ordering::Relaxed);
        let actions = chunk.len();
        let start = Instant::now();

        self.listener.before_bulk(execution_id, actions);
        let deletes: Vec<bool> = chunk.iter().map(BulkOperation::is_delete).collect();
        let request = BulkRequest {
            execution_id,
            operations: chunk,
        };

        let response = match self.transport.bulk(request).await {
            Ok(response) => response,
            Err(err) => {
                self.listener.on_bulk_failure(execution_id, actions, &err);
                return Err(err);
            }
        };
        self.listener.after_bulk(execution_id, actions, &response);

        for (item, is_delete) in response.items.iter().zip(deletes) {
            match &item.status {
                ItemStatus::Applied => counts.increment(&item.index),
                ItemStatus::NotFound => {
                    trace!("Nothing to delete for [{}] in index [{}]", item.id, item.index);
                }
                ItemStatus::IndexNotFound if is_delete => {
                    trace!("No index [{}] to delete [{}] from", item.index, item.id);
                }
                ItemStatus::IndexNotFound => {
                    warn!(
                        "Bulk #{}: index [{}] does not exist, [{}] was not written",
                        execution_id, item.index, item.id
                    );
                    counts.mark_missing(&item.index);
                }
                ItemStatus::Failed(reason) => {
                    warn!(
                        "Bulk #{}: operation on [{}] in index [{}] failed: {}",
                        execution_id, item.id, item.index, reason
                    );
                }
            }
        }
        let failed = response.failures().count();

        debug!(
            "Bulk #{}: {} actions, {} failed, {}ms",
            execution_id,
            actions,
            failed,
            start.elapsed().as_millis()
        );
        Ok(())
    }
}
