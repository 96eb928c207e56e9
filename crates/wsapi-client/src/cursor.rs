//! Forward-only result cursor
//!
//! The cursor serves hydrated records until exactly `min(total, limit)` have
//! been delivered. Records come out of a buffer that is refilled one page
//! group at a time; a terminal error ends iteration for good.

use std::collections::VecDeque;

use futures::stream::{self, Stream};
use serde_json::Value;
use tracing::{debug, info};
use wsapi_error::{TrackerError, TrackerResult};
use wsapi_query::{compile, FilterExpression};

use crate::context::QueryContext;
use crate::entity::Entity;
use crate::fetcher::{worker_count, PageFetcher};
use crate::hydrator::Hydrator;
use crate::request::{QueryRequest, QueryUrl};

pub struct ResultCursor {
    fetcher: PageFetcher,
    hydrator: Hydrator,
    expression: Option<FilterExpression>,
    buffer: VecDeque<Value>,

    /// Whether records came from a `fetch=true` query
    full_records: bool,

    /// Total reported with the first page
    total: usize,

    /// `min(total, limit)`
    bound: usize,

    served: usize,

    /// Start index of the next page not yet requested
    next_start: usize,

    /// Fixed after the first page
    workers: usize,

    finished: bool,
}

impl ResultCursor {
    /// Compiles the request, fetches the first page and sizes the worker group.
    pub async fn open(context: QueryContext, request: QueryRequest) -> TrackerResult<Self> {
        let expression = request.filter.as_ref().map(compile).transpose()?;
        let kind = context.registry().resolve(&request.entity)?;
        let page_size = request.effective_page_size(context.config().page_size);
        let scope = request.scope.clone().unwrap_or_else(|| context.scope().clone());

        let url = QueryUrl::build(
            context.config().base(),
            &kind,
            &request,
            expression.as_ref(),
            page_size,
            &scope,
        );

        info!(
            entity = %kind,
            filter = %expression.as_ref().map(|e| e.decoded()).unwrap_or_default(),
            page_size,
            limit = ?request.limit,
            "starting query"
        );

        let fetcher = PageFetcher::new(context.clone(), url);
        let first = fetcher.fetch_first().await?;

        let total = first.reported_total;
        let bound = request.limit.map_or(total, |limit| limit.min(total));
        let remaining = bound.saturating_sub(first.len().min(bound));
        let pages_remaining = remaining.div_ceil(page_size);
        let workers = worker_count(pages_remaining, context.config().max_workers);

        debug!(total, bound, pages_remaining, workers, "first page received");

        Ok(Self {
            fetcher,
            hydrator: Hydrator::new(context),
            expression,
            buffer: first.records.into(),
            full_records: request.fetch.is_full(),
            total,
            bound,
            served: 0,
            next_start: 1 + page_size,
            workers,
            finished: false,
        })
    }

    /// Total the service reported for the query
    pub fn total_result_count(&self) -> usize {
        self.total
    }

    /// How many records this cursor will deliver
    pub fn bound(&self) -> usize {
        self.bound
    }

    pub fn served(&self) -> usize {
        self.served
    }

    /// Concurrent page fetches per group
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn expression(&self) -> Option<&FilterExpression> {
        self.expression.as_ref()
    }

    /// Next record, hydrated.
    ///
    /// A record of an unknown type yields `UnknownEntityType` and iteration
    /// continues; page fetch failures and a stream that runs dry early end it.
    pub async fn next(&mut self) -> Option<TrackerResult<Entity>> {
        if self.finished || self.served >= self.bound {
            return None;
        }

        if self.buffer.is_empty() {
            if let Err(e) = self.fill().await {
                self.finished = true;
                return Some(Err(e));
            }
        }

        let Some(record) = self.buffer.pop_front() else {
            self.finished = true;
            return Some(Err(TrackerError::ShortResultStream {
                served: self.served,
                expected: self.bound,
            }));
        };

        self.served += 1;
        Some(self.hydrator.hydrate(record, self.full_records))
    }

    /// Fetches the next page group into the buffer.
    async fn fill(&mut self) -> TrackerResult<()> {
        let page_size = self.fetcher.page_size();
        // Wire position of the last record the cursor will need
        let last_needed = self.bound;
        if self.next_start > last_needed {
            return Ok(());
        }

        let pages_needed = (last_needed - self.next_start) / page_size + 1;
        let starts: Vec<usize> = (0..pages_needed.min(self.workers.max(1)))
            .map(|i| self.next_start + i * page_size)
            .collect();

        let windows = self.fetcher.fetch_group(&starts, Some(self.total)).await?;
        for window in windows {
            self.buffer.extend(window.records);
        }
        self.next_start += starts.len() * page_size;
        Ok(())
    }

    /// Adapts the cursor into a `Stream`
    pub fn into_stream(self) -> impl Stream<Item = TrackerResult<Entity>> {
        stream::unfold(self, |mut cursor| async move {
            let item = cursor.next().await?;
            Some((item, cursor))
        })
    }

    /// Drains the cursor, stopping at the first error
    pub async fn collect_entities(mut self) -> TrackerResult<Vec<Entity>> {
        let mut entities = Vec::with_capacity(self.bound.saturating_sub(self.served));
        while let Some(item) = self.next().await {
            entities.push(item?);
        }
        Ok(entities)
    }
}

impl std::fmt::Debug for ResultCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCursor")
            .field("total", &self.total)
            .field("bound", &self.bound)
            .field("served", &self.served)
            .field("buffered", &self.buffer.len())
            .field("workers", &self.workers)
            .field("finished", &self.finished)
            .finish()
    }
}
