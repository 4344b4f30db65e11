//! Shared test utilities.

use std::collections::HashMap;
use std::sync::Mutex;

use http::{HeaderMap, StatusCode};
use revue::RemoteError;
use revue::remote::{HttpResponse, HttpTransport};
use serde_json::Value;
use tempfile::TempDir;

/// Creates a temporary directory for database tests.
///
/// # Panics
///
/// Panics if the temporary directory cannot be created.
pub fn create_temp_dir() -> TempDir {
    TempDir::new().unwrap_or_else(|error| panic!("failed to create temporary directory: {error}"))
}

/// Scripted in-process stand-in for the remote review platform.
///
/// Serves a thread listing under continuation pagination (`start`/`n`, with
/// a `_more` flag on the final element of non-final batches) and per-thread
/// comment lists under page-number pagination (`page`/`per_page`), slicing
/// whatever records the test scripted. Every request is logged for
/// assertions.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    threads: Mutex<Vec<Value>>,
    comments: Mutex<HashMap<String, Vec<Value>>>,
    requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl ScriptedTransport {
    /// Creates a transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the scripted thread listing.
    pub fn set_threads(&self, threads: Vec<Value>) {
        if let Ok(mut stored) = self.threads.lock() {
            *stored = threads;
        }
    }

    /// Replaces the scripted comments for one thread.
    pub fn set_comments(&self, thread_external_id: &str, comments: Vec<Value>) {
        if let Ok(mut stored) = self.comments.lock() {
            stored.insert(thread_external_id.to_owned(), comments);
        }
    }

    /// Returns every `(url, query)` pair observed so far.
    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn comment_page(&self, thread_external_id: &str, query: &[(String, String)]) -> Value {
        let page = query_usize(query, "page").max(1);
        let per_page = query_usize(query, "per_page").max(1);
        let records = self
            .comments
            .lock()
            .map(|stored| stored.get(thread_external_id).cloned().unwrap_or_default())
            .unwrap_or_default();

        let slice: Vec<Value> = records
            .iter()
            .skip((page - 1) * per_page)
            .take(per_page)
            .cloned()
            .collect();
        Value::Array(slice)
    }

    fn listing_page(&self, query: &[(String, String)]) -> Value {
        let start = query_usize(query, "start");
        let n = query_usize(query, "n").max(1);
        let records = self
            .threads
            .lock()
            .map(|stored| stored.clone())
            .unwrap_or_default();

        let mut slice: Vec<Value> = records.iter().skip(start).take(n).cloned().collect();
        let has_more = start + slice.len() < records.len();
        if has_more {
            if let Some(last) = slice.last_mut() {
                if let Some(object) = last.as_object_mut() {
                    object.insert("_more".to_owned(), Value::Bool(true));
                }
            }
        }
        Value::Array(slice)
    }
}

fn query_usize(query: &[(String, String)], name: &str) -> usize {
    query
        .iter()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(0)
}

impl HttpTransport for ScriptedTransport {
    fn get(&self, url: &str, query: &[(String, String)]) -> Result<HttpResponse, RemoteError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((url.to_owned(), query.to_vec()));
        }

        let payload = match url.strip_suffix("/comments") {
            Some(prefix) => {
                let thread_external_id = prefix.rsplit('/').next().unwrap_or_default();
                self.comment_page(thread_external_id, query)
            }
            None => self.listing_page(query),
        };

        Ok(HttpResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: payload.to_string(),
        })
    }
}
