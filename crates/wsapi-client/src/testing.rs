//! In-memory transport for tests
//!
//! `MockTransport` serves a synthetic paged dataset for one entity type plus
//! canned objects and collections keyed by URL. Per-page latency and injected
//! failures make ordering and retry behavior observable, and every request is
//! recorded so tests can count calls.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;
use wsapi_error::TransportError;

use crate::transport::Transport;

/// A failure injected into a page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Non-success HTTP status
    Status(u16),

    /// `QueryResult.Errors` populated
    ErrorEnvelope,

    /// One record fewer than the page should hold
    ShortPage,
}

fn query_usize(url: &Url, name: &str) -> Option<usize> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.parse().ok())
}

#[derive(Debug, Clone)]
struct Dataset {
    path: String,
    type_name: String,
    total: usize,
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<String>,
    failures: HashMap<usize, Vec<MockFailure>>,
}

#[derive(Debug)]
pub struct MockTransport {
    base: String,
    dataset: Option<Dataset>,
    objects: HashMap<String, Value>,
    collections: HashMap<String, Vec<Value>>,
    statuses: HashMap<String, u16>,
    latency: HashMap<usize, Duration>,
    object_latency: Duration,
    state: Mutex<MockState>,
}

impl MockTransport {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
            dataset: None,
            objects: HashMap::new(),
            collections: HashMap::new(),
            statuses: HashMap::new(),
            latency: HashMap::new(),
            object_latency: Duration::ZERO,
            state: Mutex::new(MockState::default()),
        }
    }

    /// Serves `total` synthetic records of `type_name` under `path`
    pub fn with_dataset(mut self, path: &str, type_name: &str, total: usize) -> Self {
        self.dataset = Some(Dataset {
            path: path.to_ascii_lowercase(),
            type_name: type_name.to_string(),
            total,
        });
        self
    }

    /// Serves `record` wrapped as `{"<Type>": record}` at its own `_ref`
    pub fn with_object(mut self, record: Value) -> Self {
        let url = record["_ref"].as_str().unwrap_or_default().to_string();
        let type_name = record["_type"].as_str().unwrap_or("Object").to_string();
        self.objects.insert(url, json!({ type_name: record }));
        self
    }

    /// Serves `members` as a `QueryResult` at `url`
    pub fn with_collection(mut self, url: &str, members: Vec<Value>) -> Self {
        self.collections.insert(url.to_string(), members);
        self
    }

    /// Answers every request to `url` with a non-success status
    pub fn with_status(mut self, url: &str, status: u16) -> Self {
        self.statuses.insert(url.to_string(), status);
        self
    }

    /// Delays the dataset page starting at `start`
    pub fn with_latency(mut self, start: usize, delay: Duration) -> Self {
        self.latency.insert(start, delay);
        self
    }

    /// Delays every object and collection read
    pub fn with_object_latency(mut self, delay: Duration) -> Self {
        self.object_latency = delay;
        self
    }

    /// Fails the next requests for the page at `start`, one failure per request
    pub fn fail_page(self, start: usize, failures: &[MockFailure]) -> Self {
        self.lock()
            .failures
            .entry(start)
            .or_default()
            .extend_from_slice(failures);
        self
    }

    /// Every requested URL, in arrival order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Requests whose URL starts with `prefix`
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|url| url.starts_with(prefix))
            .count()
    }

    /// Start indices of dataset page requests, in arrival order
    pub fn page_starts(&self) -> Vec<usize> {
        self.calls()
            .iter()
            .filter_map(|url| Url::parse(url).ok())
            .filter_map(|url| {
                url.query_pairs()
                    .find(|(key, _)| key == "start")
                    .and_then(|(_, value)| value.parse().ok())
            })
            .collect()
    }

    pub fn record_ref(&self, path: &str, object_id: usize) -> String {
        format!("{}/{}/{}", self.base, path, object_id)
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock transport state poisoned")
    }

    fn synthetic_record(&self, dataset: &Dataset, index: usize) -> Value {
        json!({
            "_ref": self.record_ref(&dataset.path, index),
            "_type": dataset.type_name,
            "_refObjectName": format!("{} {index}", dataset.type_name),
            "ObjectID": index,
            "FormattedID": format!("DE{index}"),
            "Name": format!("{} {index}", dataset.type_name),
        })
    }

    /// One window of a canned collection, honoring `start` and `pagesize`
    fn serve_collection(url: &Url, members: &[Value]) -> Value {
        let start = query_usize(url, "start").unwrap_or(1).max(1);
        let page_size = query_usize(url, "pagesize").unwrap_or(200).max(1);
        let window: Vec<Value> = members
            .iter()
            .skip(start - 1)
            .take(page_size)
            .cloned()
            .collect();

        json!({
            "QueryResult": {
                "TotalResultCount": members.len(),
                "StartIndex": start,
                "PageSize": page_size,
                "Results": window,
                "Errors": [],
                "Warnings": []
            }
        })
    }

    async fn serve_page(&self, url: &Url, dataset: &Dataset) -> Result<Value, TransportError> {
        let start = query_usize(url, "start").unwrap_or(1).max(1);
        let page_size = query_usize(url, "pagesize").unwrap_or(200).max(1);

        if let Some(delay) = self.latency.get(&start) {
            tokio::time::sleep(*delay).await;
        }

        let failure = {
            let mut state = self.lock();
            state
                .failures
                .get_mut(&start)
                .filter(|pending| !pending.is_empty())
                .map(|pending| pending.remove(0))
        };

        let last = dataset.total.min(start + page_size - 1);
        let mut results: Vec<Value> = (start..=last)
            .map(|index| self.synthetic_record(dataset, index))
            .collect();
        let mut errors: Vec<String> = Vec::new();

        match failure {
            Some(MockFailure::Status(status)) => {
                return Err(TransportError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Some(MockFailure::ErrorEnvelope) => errors.push("Injected query failure".to_string()),
            Some(MockFailure::ShortPage) => {
                results.pop();
            }
            None => {}
        }

        Ok(json!({
            "QueryResult": {
                "TotalResultCount": dataset.total,
                "StartIndex": start,
                "PageSize": page_size,
                "Results": results,
                "Errors": errors,
                "Warnings": []
            }
        }))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, url: &str) -> Result<Value, TransportError> {
        self.lock().calls.push(url.to_string());

        let parsed = Url::parse(url).map_err(|e| TransportError::Connection {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        let mut bare = parsed.clone();
        bare.set_query(None);
        let key = bare.to_string();

        if let Some(status) = self.statuses.get(&key) {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: *status,
            });
        }

        if let Some(object) = self.objects.get(&key) {
            tokio::time::sleep(self.object_latency).await;
            return Ok(object.clone());
        }

        if let Some(members) = self.collections.get(&key) {
            tokio::time::sleep(self.object_latency).await;
            return Ok(Self::serve_collection(&parsed, members));
        }

        if let Some(dataset) = &self.dataset {
            if key == format!("{}/{}", self.base, dataset.path) {
                return self.serve_page(&parsed, dataset).await;
            }
        }

        Err(TransportError::Status {
            url: url.to_string(),
            status: 404,
        })
    }
}
