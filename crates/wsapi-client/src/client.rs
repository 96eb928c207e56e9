//! Client facade
//!
//! `WsapiClient` owns a `QueryContext` and is the usual entry point: it opens
//! cursors, counts, reads single entities and loads schema-reported types.

use std::sync::Arc;

use tracing::info;
use wsapi_error::TrackerResult;
use wsapi_query::FilterSpec;

use crate::config::{ClientConfig, Scope};
use crate::context::QueryContext;
use crate::cursor::ResultCursor;
use crate::entity::Entity;
use crate::hydrator::Hydrator;
use crate::registry::EntityRegistry;
use crate::request::{Fetch, QueryRequest};
use crate::transport::{HttpTransport, Transport};

#[derive(Debug, Clone)]
pub struct WsapiClient {
    context: QueryContext,
}

impl WsapiClient {
    /// Client over HTTP, authenticating with `api_key` when given
    pub fn new(config: ClientConfig, api_key: Option<&str>) -> TrackerResult<Self> {
        let transport = HttpTransport::new(&config, api_key)?;
        Self::with_transport(Arc::new(transport), config)
    }

    /// Client over any transport
    pub fn with_transport(transport: Arc<dyn Transport>, config: ClientConfig) -> TrackerResult<Self> {
        Ok(Self {
            context: QueryContext::new(transport, config)?,
        })
    }

    /// Default workspace/project for queries that carry no scope
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.context = self.context.with_scope(scope);
        self
    }

    pub fn with_registry(mut self, registry: EntityRegistry) -> Self {
        self.context = self.context.with_registry(registry);
        self
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    pub fn registry(&self) -> &EntityRegistry {
        self.context.registry()
    }

    /// Opens a cursor over the query's results
    pub async fn query(&self, request: QueryRequest) -> TrackerResult<ResultCursor> {
        ResultCursor::open(self.context.clone(), request).await
    }

    /// Number of matching records, read from a one-record page
    pub async fn count(&self, entity: &str, filter: Option<FilterSpec>) -> TrackerResult<usize> {
        let mut request = QueryRequest::new(entity).page_size(1);
        request.filter = filter;
        let cursor = self.query(request).await?;
        Ok(cursor.total_result_count())
    }

    /// Reads one entity in full by its ref URL
    pub async fn get(&self, reference: &str) -> TrackerResult<Entity> {
        let url = self.context.url_for(reference);
        Hydrator::new(self.context.clone()).fetch_entity(&url).await
    }

    /// Reads one entity in full by type and object id
    pub async fn get_by_id(&self, entity: &str, object_id: u64) -> TrackerResult<Entity> {
        let kind = self.context.registry().resolve(entity)?;
        self.get(&format!("{}/{}", kind.path(), object_id)).await
    }

    /// Registers every type the subscription's schema reports.
    ///
    /// Cursors opened earlier keep the registry they started with. Returns how
    /// many types were new.
    pub async fn load_type_definitions(&mut self) -> TrackerResult<usize> {
        let request = QueryRequest::new("TypeDefinition")
            .fetch(Fetch::fields(["Name", "ElementName", "TypePath"]));
        let definitions = self.query(request).await?.collect_entities().await?;

        let type_paths: Vec<String> = definitions
            .iter()
            .filter_map(|definition| {
                ["TypePath", "ElementName", "Name"]
                    .iter()
                    .find_map(|field| definition.scalar(field).and_then(|v| v.as_str()))
                    .map(str::to_string)
            })
            .collect();

        let mut registry = self.context.registry().clone();
        let added = registry.register_type_definitions(&type_paths);
        info!(definitions = definitions.len(), added, "loaded type definitions");

        self.context = self.context.clone().with_registry(registry);
        Ok(added)
    }
}
