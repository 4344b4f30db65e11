//! Lazy, self-terminating page cursors over the platform's list endpoints.
//!
//! Two pagination styles exist on the wire. Bulk endpoints (comments) use
//! `page`/`per_page` parameters and signal exhaustion by returning a short
//! page. The thread-listing endpoint uses a `start` offset and marks the
//! final element of every non-final batch with a `_more` flag. Both cursors
//! tolerate an empty final page, and both yield every record they saw — the
//! caller accumulates batches, so nothing is dropped on exhaustion.

use serde_json::Value;

use super::error::RemoteError;
use super::fetcher::RateLimitedFetcher;

/// Page size for bulk listing endpoints.
pub const BULK_PAGE_SIZE: usize = 100;

/// Page size for the thread-listing endpoint.
pub const REVIEW_PAGE_SIZE: usize = 25;

/// Field on the last element of a batch signalling further pages.
pub const MORE_RECORDS_FIELD: &str = "_more";

/// Cursor over `page`/`per_page` style endpoints.
///
/// Terminates when a page comes back shorter than the page size.
pub struct NumberedPages<'a> {
    fetcher: &'a RateLimitedFetcher<'a>,
    url: String,
    base_query: Vec<(String, String)>,
    page_size: usize,
    next_page: u64,
    finished: bool,
}

impl<'a> NumberedPages<'a> {
    /// Creates a cursor starting at page 1 with the bulk page size.
    #[must_use]
    pub fn new(
        fetcher: &'a RateLimitedFetcher<'a>,
        url: impl Into<String>,
        base_query: Vec<(String, String)>,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
            base_query,
            page_size: BULK_PAGE_SIZE,
            next_page: 1,
            finished: false,
        }
    }

    /// Overrides the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Iterator for NumberedPages<'_> {
    type Item = Result<Vec<Value>, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut query = self.base_query.clone();
        query.push(("page".to_owned(), self.next_page.to_string()));
        query.push(("per_page".to_owned(), self.page_size.to_string()));

        let batch = match fetch_record_array(self.fetcher, &self.url, &query) {
            Ok(batch) => batch,
            Err(error) => {
                self.finished = true;
                return Some(Err(error));
            }
        };

        self.next_page += 1;
        if batch.len() < self.page_size {
            self.finished = true;
        }
        if batch.is_empty() {
            return None;
        }
        Some(Ok(batch))
    }
}

/// Cursor over offset/continuation style endpoints.
///
/// Tracks the cumulative yielded count as the `start` offset and terminates
/// when the final element of a batch lacks a true `_more` flag.
pub struct ContinuationPages<'a> {
    fetcher: &'a RateLimitedFetcher<'a>,
    url: String,
    base_query: Vec<(String, String)>,
    page_size: usize,
    offset: usize,
    finished: bool,
}

impl<'a> ContinuationPages<'a> {
    /// Creates a cursor starting at offset 0 with the review page size.
    #[must_use]
    pub fn new(
        fetcher: &'a RateLimitedFetcher<'a>,
        url: impl Into<String>,
        base_query: Vec<(String, String)>,
    ) -> Self {
        Self {
            fetcher,
            url: url.into(),
            base_query,
            page_size: REVIEW_PAGE_SIZE,
            offset: 0,
            finished: false,
        }
    }

    /// Overrides the page size.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }
}

impl Iterator for ContinuationPages<'_> {
    type Item = Result<Vec<Value>, RemoteError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let mut query = self.base_query.clone();
        query.push(("start".to_owned(), self.offset.to_string()));
        query.push(("n".to_owned(), self.page_size.to_string()));

        let batch = match fetch_record_array(self.fetcher, &self.url, &query) {
            Ok(batch) => batch,
            Err(error) => {
                self.finished = true;
                return Some(Err(error));
            }
        };

        if batch.is_empty() {
            self.finished = true;
            return None;
        }

        let more = batch
            .last()
            .and_then(|record| record.get(MORE_RECORDS_FIELD))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        self.offset += batch.len();
        if !more {
            self.finished = true;
        }
        Some(Ok(batch))
    }
}

/// Drains a cursor into the full accumulated record sequence.
///
/// # Errors
///
/// Propagates the first batch error; records from earlier batches are
/// discarded because the caller cannot make progress on a partial page set.
pub fn collect_records<I>(pages: I) -> Result<Vec<Value>, RemoteError>
where
    I: Iterator<Item = Result<Vec<Value>, RemoteError>>,
{
    let mut records = Vec::new();
    for batch in pages {
        records.extend(batch?);
    }
    Ok(records)
}

fn fetch_record_array(
    fetcher: &RateLimitedFetcher<'_>,
    url: &str,
    query: &[(String, String)],
) -> Result<Vec<Value>, RemoteError> {
    match fetcher.get_json(url, query)? {
        Value::Array(records) => Ok(records),
        other => Err(RemoteError::MalformedResponse {
            message: format!("expected a JSON array of records, got {other}"),
        }),
    }
}
