//! Lazy entity hydration
//!
//! Turning JSON into an `Entity` is synchronous: scalars are stored as they
//! arrive, embedded objects are expanded inline up to the configured depth,
//! and anything that would need a round trip is stored as a `Pending` marker.
//! The async half resolves one marker at a time and is only reached from
//! `Entity::field`.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;
use wsapi_error::{TrackerError, TrackerResult};

use crate::context::{with_params, QueryContext};
use crate::entity::{Entity, FieldState, FieldValue, HydrationState, Pending, Reference};
use crate::envelope;

const REVISION_HISTORY: &str = "RevisionHistory";

fn is_meta_key(key: &str) -> bool {
    key.starts_with('_')
}

fn has_data_keys(object: &Map<String, Value>) -> bool {
    object.keys().any(|key| !is_meta_key(key))
}

fn meta_str(object: &Map<String, Value>, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn has_ref(object: &Map<String, Value>) -> bool {
    object.get("_ref").map(Value::is_string).unwrap_or(false)
}

fn is_reference(value: &Value) -> bool {
    value.as_object().map(has_ref).unwrap_or(false)
}

//-----------------------------------------------------------------------------
// Hydrator
//-----------------------------------------------------------------------------

/// Builds entities from raw records and resolves their lazy fields.
#[derive(Debug, Clone)]
pub struct Hydrator {
    context: QueryContext,
}

impl Hydrator {
    pub fn new(context: QueryContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &QueryContext {
        &self.context
    }

    /// Materializes one result record.
    ///
    /// `full` marks records that came from a `fetch=true` read.
    pub fn hydrate(&self, record: Value, full: bool) -> TrackerResult<Entity> {
        match record {
            Value::Object(object) => self.hydrate_object(object, full, 0),
            other => Err(TrackerError::MalformedResponse(format!(
                "result record is not an object: {other}"
            ))),
        }
    }

    /// An identity-only entity for a bare reference
    pub fn shell(&self, url: &str, type_name: Option<&str>, name: Option<&str>) -> TrackerResult<Entity> {
        let reference = Reference::parse(url)?;
        let kind = self
            .context
            .registry()
            .resolve(type_name.unwrap_or(reference.path()))?;
        Ok(Entity::new(
            kind,
            reference,
            name.map(str::to_string),
            BTreeMap::new(),
            HydrationState::Shell,
            self.clone(),
        ))
    }

    fn hydrate_object(&self, mut object: Map<String, Value>, full: bool, depth: usize) -> TrackerResult<Entity> {
        let url = meta_str(&object, "_ref")
            .ok_or_else(|| TrackerError::MalformedResponse("record has no _ref".to_string()))?;
        let reference = Reference::parse(&url)?;

        // The type tag wins over the ref path when both are present
        let kind = match meta_str(&object, "_type") {
            Some(type_name) => self.context.registry().resolve(&type_name)?,
            None => self.context.registry().resolve(reference.path())?,
        };
        let name = meta_str(&object, "_refObjectName");

        let state = if !has_data_keys(&object) {
            HydrationState::Shell
        } else if full {
            HydrationState::Full
        } else {
            HydrationState::Partial
        };

        object.retain(|key, _| !is_meta_key(key));
        let mut fields = BTreeMap::new();
        for (field, value) in object {
            let state = self.classify(value, depth)?;
            fields.insert(field, state);
        }

        Ok(Entity::new(kind, reference, name, fields, state, self.clone()))
    }

    /// Decides how a field value is stored.
    fn classify(&self, value: Value, depth: usize) -> TrackerResult<FieldState> {
        match value {
            Value::Object(object) if has_ref(&object) => {
                self.classify_reference(object, depth)
            }
            Value::Array(items) if !items.is_empty() && items.iter().all(is_reference) => {
                let members = items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::Object(object) => Some(object),
                        _ => None,
                    })
                    .map(|object| self.hydrate_object(object, false, depth + 1))
                    .collect::<TrackerResult<Vec<_>>>()?;
                Ok(FieldState::Resolved(FieldValue::Collection(members)))
            }
            other => Ok(FieldState::Resolved(FieldValue::Scalar(other))),
        }
    }

    fn classify_reference(&self, object: Map<String, Value>, depth: usize) -> TrackerResult<FieldState> {
        // has_ref guarantees a string _ref
        let url = meta_str(&object, "_ref").unwrap_or_default();
        let type_name = meta_str(&object, "_type");

        if type_name.as_deref() == Some(REVISION_HISTORY) {
            return Ok(FieldState::Unresolved(Pending::RevisionHistory { url }));
        }

        if let Some(count) = object.get("Count").and_then(Value::as_u64) {
            return Ok(FieldState::Unresolved(Pending::Collection {
                url,
                count: Some(count as usize),
            }));
        }

        let nested = depth + 1;
        if has_data_keys(&object) && nested <= self.context.config().max_inline_depth {
            let entity = self.hydrate_object(object, false, nested)?;
            return Ok(FieldState::Resolved(FieldValue::Entity(Box::new(entity))));
        }

        Ok(FieldState::Unresolved(Pending::Reference {
            url,
            type_name,
            name: meta_str(&object, "_refObjectName"),
        }))
    }

    //-------------------------------------------------------------------------
    // Lazy resolution
    //-------------------------------------------------------------------------

    /// Resolves one pending marker into a value.
    pub(crate) async fn resolve(&self, pending: &Pending) -> TrackerResult<FieldValue> {
        match pending {
            Pending::Reference { url, .. } => {
                let entity = self.fetch_entity(url).await?;
                Ok(FieldValue::Entity(Box::new(entity)))
            }
            Pending::Collection { url, count } => {
                let members = self.fetch_collection(url, *count).await?;
                Ok(FieldValue::Collection(members))
            }
            Pending::RevisionHistory { url } => {
                let revisions = self.fetch_revisions(url).await?;
                Ok(FieldValue::Collection(revisions))
            }
        }
    }

    /// Reads one entity in full by its ref URL
    pub async fn fetch_entity(&self, url: &str) -> TrackerResult<Entity> {
        let object = self.fetch_object(url).await?;
        self.hydrate_object(object, true, 0)
    }

    async fn fetch_object(&self, url: &str) -> TrackerResult<Map<String, Value>> {
        let target = with_params(url, "fetch=true");
        debug!(url = %target, "fetching entity");
        let body = self
            .context
            .get_json(&target)
            .await
            .map_err(|e| TrackerError::unresolvable(url, e))?;
        envelope::unwrap_single(body).map_err(|e| TrackerError::unresolvable(url, e))
    }

    /// Reads every member of a collection, one page of
    /// `collection_page_size` at a time, until `count` members have arrived.
    /// Without a count the total reported by the first page is the target.
    /// Fewer members than the target is an error, never a short list.
    async fn fetch_collection(&self, url: &str, count: Option<usize>) -> TrackerResult<Vec<Entity>> {
        if count == Some(0) {
            return Ok(Vec::new());
        }

        let page_size = self.context.config().collection_page_size;
        let mut expected = count;
        let mut members = Vec::new();

        loop {
            let start = members.len() + 1;
            let target = with_params(url, &format!("fetch=true&pagesize={page_size}&start={start}"));
            debug!(url = %target, count = ?expected, "fetching collection page");

            let body = self
                .context
                .get_json(&target)
                .await
                .map_err(|e| TrackerError::unresolvable(url, e))?;
            let page = envelope::parse_query_result(body).map_err(|e| TrackerError::unresolvable(url, e))?;

            let wanted = *expected.get_or_insert(page.total_result_count);
            if page.results.is_empty() {
                break;
            }
            for record in page.results {
                members.push(self.hydrate(record, true)?);
            }
            if members.len() >= wanted {
                break;
            }
        }

        let wanted = expected.unwrap_or_default();
        if members.len() < wanted {
            return Err(TrackerError::unresolvable(
                url,
                format!("collection returned {} of {wanted} members", members.len()),
            ));
        }
        Ok(members)
    }

    async fn fetch_revisions(&self, url: &str) -> TrackerResult<Vec<Entity>> {
        let history = self.fetch_object(url).await?;

        match history.get("Revisions") {
            Some(Value::Object(stub)) => {
                let revisions_url = meta_str(stub, "_ref")
                    .ok_or_else(|| TrackerError::unresolvable(url, "Revisions stub has no _ref"))?;
                let count = stub.get("Count").and_then(Value::as_u64).map(|count| count as usize);
                self.fetch_collection(&revisions_url, count).await
            }
            Some(Value::Array(items)) => items
                .iter()
                .cloned()
                .map(|record| self.hydrate(record, true))
                .collect(),
            _ => Err(TrackerError::unresolvable(url, "revision history has no Revisions")),
        }
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
