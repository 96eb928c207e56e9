//! Concurrent paginated fetching
//!
//! Pages are requested in groups. A group of one page is fetched inline; a
//! larger group spawns one task per page into a `JoinSet`, joins every task,
//! and places each page in the slot of its start index, never in completion
//! order. Any failing page fails the whole group, and the whole group is
//! retried on the configured delay schedule. A final error such as a 401 ends
//! the retries at once.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, warn};
use wsapi_error::{TrackerError, TrackerResult};

use crate::config::MAX_WORKERS;
use crate::context::QueryContext;
use crate::envelope;
use crate::request::QueryUrl;

//-----------------------------------------------------------------------------
// Page Window
//-----------------------------------------------------------------------------

/// One fetched page
#[derive(Debug, Clone)]
pub struct PageWindow {
    /// 1-based index of the first record
    pub start_index: usize,

    /// Requested page size
    pub page_size: usize,

    /// Total the service reported with this page
    pub reported_total: usize,

    /// Raw records in service order
    pub records: Vec<Value>,
}

impl PageWindow {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Number of concurrent workers for the pages still needed, capped at `cap`.
pub fn worker_count(pages_remaining: usize, cap: usize) -> usize {
    let workers = match pages_remaining {
        0 => return 0,
        1 => 1,
        2..=3 => 2,
        4..=7 => 4,
        8..=9 => 8,
        _ => MAX_WORKERS,
    };
    workers.min(cap.max(1))
}

/// Records a page starting at `start` must hold when the result set has `total`
pub fn expected_page_len(start: usize, page_size: usize, total: usize) -> usize {
    page_size.min(total.saturating_sub(start.saturating_sub(1)))
}

/// Keeps the first failure of a group unless a later one is final.
fn note_failure(kept: &mut Option<(usize, TrackerError)>, start: usize, error: TrackerError) {
    let replace = match kept {
        None => true,
        Some((_, first)) => first.is_transient() && !error.is_transient(),
    };
    if replace {
        *kept = Some((start, error));
    }
}

//-----------------------------------------------------------------------------
// Page Fetcher
//-----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PageFetcher {
    context: QueryContext,
    url: Arc<QueryUrl>,
}

impl PageFetcher {
    pub fn new(context: QueryContext, url: QueryUrl) -> Self {
        Self {
            context,
            url: Arc::new(url),
        }
    }

    pub fn page_size(&self) -> usize {
        self.url.page_size()
    }

    pub fn url(&self) -> &QueryUrl {
        &self.url
    }

    /// Fetches the first page; its reported total bounds the query.
    pub async fn fetch_first(&self) -> TrackerResult<PageWindow> {
        let mut windows = self.fetch_group(&[1], None).await?;
        windows
            .pop()
            .ok_or_else(|| TrackerError::MalformedResponse("first page missing".to_string()))
    }

    /// Fetches the pages at `starts` and returns them in the same order.
    ///
    /// `total` is the bound established by the first page; `None` means each
    /// page is checked against its own reported total.
    pub async fn fetch_group(&self, starts: &[usize], total: Option<usize>) -> TrackerResult<Vec<PageWindow>> {
        let Some(&first_start) = starts.first() else {
            return Ok(Vec::new());
        };

        let schedule = self.context.config().retry_schedule();
        let mut last_reason = String::new();

        for (attempt, delay) in schedule.iter().enumerate() {
            if !delay.is_zero() {
                sleep(*delay).await;
            }

            match self.attempt_group(starts, total).await {
                Ok(windows) => {
                    debug!(start_index = first_start, pages = starts.len(), attempt = attempt + 1, "page group fetched");
                    return Ok(windows);
                }
                Err((start, error)) => {
                    let reason = format!("start {start}: {error}");
                    let transient = error.is_transient();
                    warn!(
                        start_index = first_start,
                        pages = starts.len(),
                        attempt = attempt + 1,
                        attempts = schedule.len(),
                        transient,
                        %reason,
                        "page group failed"
                    );
                    if !transient {
                        return Err(TrackerError::PageFetch {
                            start_index: first_start,
                            attempts: attempt + 1,
                            reason,
                        });
                    }
                    last_reason = reason;
                }
            }
        }

        Err(TrackerError::PageFetch {
            start_index: first_start,
            attempts: schedule.len(),
            reason: last_reason,
        })
    }

    /// One pass over the group. A failure carries the start index of the page
    /// that caused it.
    async fn attempt_group(
        &self,
        starts: &[usize],
        total: Option<usize>,
    ) -> Result<Vec<PageWindow>, (usize, TrackerError)> {
        if let [start] = starts {
            return self
                .fetch_page(*start, total)
                .await
                .map(|window| vec![window])
                .map_err(|e| (*start, e));
        }

        let mut join_set = JoinSet::new();
        for (slot, start) in starts.iter().copied().enumerate() {
            let fetcher = self.clone();
            join_set.spawn(async move { (slot, start, fetcher.fetch_page(start, total).await) });
        }

        // Every worker is joined before anything is reassembled
        let mut slots: Vec<Option<PageWindow>> = vec![None; starts.len()];
        let mut failure = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, _, Ok(window))) => slots[slot] = Some(window),
                Ok((_, start, Err(e))) => note_failure(&mut failure, start, e),
                Err(e) => note_failure(
                    &mut failure,
                    starts[0],
                    TrackerError::MalformedResponse(format!("page worker failed: {e}")),
                ),
            }
        }

        if let Some(failure) = failure {
            return Err(failure);
        }
        slots
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                (
                    starts[0],
                    TrackerError::MalformedResponse("page worker returned no result".to_string()),
                )
            })
    }

    async fn fetch_page(&self, start: usize, total: Option<usize>) -> TrackerResult<PageWindow> {
        let url = self.url.page(start);
        debug!(start, url = %url, "fetching page");

        let body = self.context.get_json(&url).await?;
        let result = envelope::parse_query_result(body)?;

        let page_size = self.url.page_size();
        let received = result.results.len();
        if received > page_size {
            return Err(TrackerError::MalformedResponse(format!(
                "page at {start} returned {received} records for page size {page_size}"
            )));
        }

        let expected = expected_page_len(start, page_size, total.unwrap_or(result.total_result_count));
        if received < expected {
            return Err(TrackerError::MalformedResponse(format!(
                "short page at {start}: {received} of {expected} records"
            )));
        }

        Ok(PageWindow {
            start_index: start,
            page_size,
            reported_total: result.total_result_count,
            records: result.results,
        })
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
