//! Per-client query context
//!
//! Everything the fetcher and hydrator need travels in this value: the shared
//! transport, the settings, the type registry and the default scope. It is
//! cheap to clone and there is no process-wide state.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::time::timeout;
use wsapi_error::{TrackerResult, TransportError};

use crate::config::{ClientConfig, Scope};
use crate::registry::EntityRegistry;
use crate::transport::Transport;

#[derive(Clone)]
pub struct QueryContext {
    /// Transport shared read-only by every worker
    transport: Arc<dyn Transport>,

    /// Validated settings
    config: Arc<ClientConfig>,

    /// Known entity types
    registry: Arc<EntityRegistry>,

    /// Workspace/project applied to queries without their own scope
    scope: Scope,
}

impl QueryContext {
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> TrackerResult<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            config: Arc::new(config),
            registry: Arc::new(EntityRegistry::default()),
            scope: Scope::default(),
        })
    }

    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    /// Issues one GET bounded by the configured request timeout
    pub async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let limit = self.config.request_timeout();
        match timeout(limit, self.transport.get(url)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: url.to_string(),
                timeout: limit,
            }),
        }
    }

    /// Absolute URL for a resource path; absolute refs pass through
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.config.base(), path.trim_start_matches('/'))
        }
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("base_url", &self.config.base_url)
            .field("registered_types", &self.registry.len())
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Appends query parameters to a URL that may already carry some
pub(crate) fn with_params(url: &str, params: &str) -> String {
    if params.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{url}&{params}")
    } else {
        format!("{url}?{params}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_params() {
        assert_eq!(with_params("http://h/defect/1", "fetch=true"), "http://h/defect/1?fetch=true");
        assert_eq!(
            with_params("http://h/defect/1/Tasks?x=1", "fetch=true"),
            "http://h/defect/1/Tasks?x=1&fetch=true"
        );
        assert_eq!(with_params("http://h/defect/1", ""), "http://h/defect/1");
    }
}
