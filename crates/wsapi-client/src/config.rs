//! Client configuration
//!
//! Settings are plain serde structs with defaults, so a caller can build them
//! in code or deserialize them from TOML text it loaded itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use wsapi_error::{TrackerError, TrackerResult};

/// Largest page size the service accepts
pub const MAX_PAGE_SIZE: usize = 2000;

/// Upper bound on concurrent page workers
pub const MAX_WORKERS: usize = 10;

//-----------------------------------------------------------------------------
// Client Configuration
//-----------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the web services API, e.g. `https://host/slm/webservice/v2.0`
    pub base_url: String,

    /// Default records per page
    pub page_size: usize,

    /// Cap on concurrent page fetches per group
    pub max_workers: usize,

    /// Delay before each attempt of a page group; the length is the attempt budget
    pub retry_delays_ms: Vec<u64>,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,

    /// How many levels of embedded objects are expanded during hydration
    pub max_inline_depth: usize,

    /// Page size used when chasing a collection URL
    pub collection_page_size: usize,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/slm/webservice/v2.0".to_string(),
            page_size: 200,
            max_workers: MAX_WORKERS,
            retry_delays_ms: vec![0, 2000, 5000],
            request_timeout_secs: 30,
            max_inline_depth: 4,
            collection_page_size: MAX_PAGE_SIZE,
            user_agent: format!("wsapi-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Parses and validates a TOML document
    pub fn from_toml_str(text: &str) -> TrackerResult<Self> {
        let config: ClientConfig =
            toml::from_str(text).map_err(|e| TrackerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_retry_delays(mut self, delays: &[Duration]) -> Self {
        self.retry_delays_ms = delays.iter().map(|d| d.as_millis() as u64).collect();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_max_inline_depth(mut self, depth: usize) -> Self {
        self.max_inline_depth = depth;
        self
    }

    pub fn with_collection_page_size(mut self, page_size: usize) -> Self {
        self.collection_page_size = page_size;
        self
    }

    /// Rejects settings the pipeline cannot run with
    pub fn validate(&self) -> TrackerResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(TrackerError::Config("base_url must not be empty".to_string()));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(TrackerError::Config(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.max_workers == 0 {
            return Err(TrackerError::Config("max_workers must be at least 1".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(TrackerError::Config(
                "request_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.collection_page_size == 0 || self.collection_page_size > MAX_PAGE_SIZE {
            return Err(TrackerError::Config(format!(
                "collection_page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Delays preceding each attempt; never empty
    pub fn retry_schedule(&self) -> Vec<Duration> {
        if self.retry_delays_ms.is_empty() {
            return vec![Duration::ZERO];
        }
        self.retry_delays_ms
            .iter()
            .map(|ms| Duration::from_millis(*ms))
            .collect()
    }

    /// Base URL without a trailing slash
    pub fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

//-----------------------------------------------------------------------------
// Scope
//-----------------------------------------------------------------------------

/// Workspace/project qualifiers, resolved by the caller before querying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scope {
    /// Opaque workspace ref
    pub workspace: Option<String>,

    /// Opaque project ref
    pub project: Option<String>,

    /// Include parent projects
    pub project_scope_up: bool,

    /// Include child projects
    pub project_scope_down: bool,
}

impl Scope {
    pub fn workspace(workspace: impl Into<String>) -> Self {
        Self {
            workspace: Some(workspace.into()),
            ..Self::default()
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_scope(mut self, up: bool, down: bool) -> Self {
        self.project_scope_up = up;
        self.project_scope_down = down;
        self
    }

    /// Query-string pairs for this scope, in wire order
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(workspace) = &self.workspace {
            pairs.push(("workspace", workspace.clone()));
        }
        if let Some(project) = &self.project {
            pairs.push(("project", project.clone()));
            pairs.push(("projectScopeUp", self.project_scope_up.to_string()));
            pairs.push(("projectScopeDown", self.project_scope_down.to_string()));
        }
        pairs
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
