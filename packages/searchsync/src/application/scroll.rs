//! Scroll cursors
//!
//! # Lifecycle
//!
//! ```text
//! open ──► initial page ──► next()* ──► scroll page ──► ... ──► empty page ──► release
//!   │                          │
//!   └── no index: empty        └── close() / drop: release early
//! ```
//!
//! A cursor pins backend state until released. Draining releases it, so do
//! `close()` and, as a last resort, dropping the cursor (which schedules the
//! release on the current tokio runtime).

use futures::stream::{self, Stream};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::ScrollConfig;
use crate::domain::{
    BackendQuery, DocumentId, DocumentIdGenerator, IndexOutcome, Query, QueryTranslator, Schema,
    ScrollId, SearchPage, SearchRequest, SearchTransport,
};
use crate::error::Result;

/// Opens scroll cursors for schema-level queries
pub struct Scroller {
    transport: Arc<dyn SearchTransport>,
    translator: Arc<dyn QueryTranslator>,
    ids: DocumentIdGenerator,
    config: ScrollConfig,
}

impl Scroller {
    pub fn new(
        transport: Arc<dyn SearchTransport>,
        translator: Arc<dyn QueryTranslator>,
        config: ScrollConfig,
    ) -> Self {
        Self {
            transport,
            translator,
            ids: DocumentIdGenerator,
            config,
        }
    }

    /// Open a cursor over every document of `schema` matching `query`
    ///
    /// Paging fields of `query` are ignored; the cursor walks all matches.
    pub async fn open(&self, schema: &Schema, query: &Query) -> Result<ScrollCursor> {
        let index = self.ids.index_name(&schema.id);
        let backend_query = self.translator.translate(schema, query)?;
        ScrollCursor::open(
            self.transport.clone(),
            index,
            backend_query,
            self.config.page_size,
            self.config.keep_alive(),
        )
        .await
    }
}

/// Lazy, single-pass sequence of matching document ids
pub struct ScrollCursor {
    transport: Arc<dyn SearchTransport>,
    index: String,
    keep_alive: Duration,
    buffer: VecDeque<DocumentId>,
    /// Held while backend state is pinned
    scroll_id: Option<ScrollId>,
    pages: usize,
}

impl ScrollCursor {
    /// Issue the initial request; a missing index yields an empty cursor
    /// without touching scroll state
    pub async fn open(
        transport: Arc<dyn SearchTransport>,
        index: String,
        query: BackendQuery,
        page_size: usize,
        keep_alive: Duration,
    ) -> Result<Self> {
        let mut cursor = Self {
            transport,
            index,
            keep_alive,
            buffer: VecDeque::new(),
            scroll_id: None,
            pages: 0,
        };

        if !cursor.transport.index_exists(&cursor.index).await? {
            debug!("No index [{}], nothing to scroll", cursor.index);
            return Ok(cursor);
        }

        let request = SearchRequest {
            index: cursor.index.clone(),
            query,
            from: 0,
            size: page_size.max(1),
            scroll: Some(keep_alive),
        };
        match cursor.transport.search(request).await? {
            IndexOutcome::Done(page) => cursor.accept(page).await?,
            // Deleted between the probe and the search
            IndexOutcome::IndexNotFound => {
                debug!("Index [{}] vanished before scrolling", cursor.index);
            }
        }

        Ok(cursor)
    }

    /// Next document id, fetching the next page when the current one is used up
    ///
    /// A transport error releases the cursor and ends the sequence.
    pub async fn next(&mut self) -> Result<Option<DocumentId>> {
        loop {
            if let Some(id) = self.buffer.pop_front() {
                return Ok(Some(id));
            }

            let Some(scroll_id) = self.scroll_id.clone() else {
                return Ok(None);
            };

            match self.transport.scroll(&scroll_id, self.keep_alive).await {
                Ok(page) => self.accept(page).await?,
                Err(err) => {
                    if let Err(release_err) = self.release().await {
                        warn!(
                            "Failed to release scroll on [{}] after error: {}",
                            self.index, release_err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Drain the remaining ids; the cursor is released either way
    pub async fn collect_ids(mut self) -> Result<Vec<DocumentId>> {
        let mut ids = Vec::new();
        while let Some(id) = self.next().await? {
            ids.push(id);
        }
        Ok(ids)
    }

    /// Abandon the cursor, releasing backend state now
    pub async fn close(mut self) -> Result<()> {
        self.buffer.clear();
        self.release().await
    }

    /// Adapt into a `Stream`; dropping the stream early still releases
    pub fn into_stream(self) -> impl Stream<Item = Result<DocumentId>> + Send {
        stream::try_unfold(self, |mut cursor| async move {
            Ok(cursor.next().await?.map(|id| (id, cursor)))
        })
    }

    pub fn is_open(&self) -> bool {
        self.scroll_id.is_some()
    }

    /// Pages received so far
    pub fn pages(&self) -> usize {
        self.pages
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    async fn accept(&mut self, page: SearchPage) -> Result<()> {
        self.pages += 1;
        trace!(
            "Scroll page {} on [{}]: {} hits of {}",
            self.pages,
            self.index,
            page.ids.len(),
            page.total
        );

        if page.ids.is_empty() {
            // Exhausted; the last token issued is the one to release
            if page.scroll_id.is_some() {
                self.scroll_id = page.scroll_id;
            }
            return self.release().await;
        }

        self.buffer.extend(page.ids);
        if page.scroll_id.is_some() {
            self.scroll_id = page.scroll_id;
        }
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(scroll_id) = self.scroll_id.take() {
            trace!("Releasing scroll on [{}]", self.index);
            self.transport.clear_scroll(&scroll_id).await?;
        }
        Ok(())
    }
}

impl Drop for ScrollCursor {
    fn drop(&mut self) {
        let Some(scroll_id) = self.scroll_id.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let transport = self.transport.clone();
                let index = std::mem::take(&mut self.index);
                handle.spawn(async move {
                    if let Err(err) = transport.clear_scroll(&scroll_id).await {
                        warn!("Failed to release abandoned scroll on [{}]: {}", index, err);
                    }
                });
            }
            Err(_) => warn!(
                "Scroll on [{}] dropped outside a runtime; left to backend expiry",
                self.index
            ),
        }
    }
}
