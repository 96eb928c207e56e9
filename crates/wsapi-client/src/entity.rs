//! Materialized entities
//!
//! An `Entity` is one generic tagged record: a registered kind, an immutable
//! reference, and a map of fields. Fields that need a round trip are held as
//! `Pending` markers and resolved on first access through the entity's own
//! hydrator. Access takes `&mut self`, so a field moves from unresolved to
//! resolved exactly once per handle without any locking.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;
use tracing::debug;
use url::Url;
use wsapi_error::{TrackerError, TrackerResult};

use crate::hydrator::Hydrator;
use crate::registry::EntityKind;

//-----------------------------------------------------------------------------
// Reference
//-----------------------------------------------------------------------------

/// Immutable identity of an entity: its ref URL, resource path and object id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Ref URL as the service reported it
    url: String,

    /// Resource path, e.g. `defect` or `portfolioitem/feature`
    path: String,

    /// Numeric object id
    object_id: u64,
}

impl Reference {
    /// Parses `.../defect/123` or `.../portfolioitem/feature/123`.
    pub fn parse(url: &str) -> TrackerResult<Self> {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_string(),
            Err(_) => url.split('?').next().unwrap_or_default().to_string(),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        let invalid = || TrackerError::MalformedResponse(format!("not an entity reference: {url}"));

        let (id_segment, rest) = segments.split_last().ok_or_else(invalid)?;
        let object_id = id_segment
            .trim_end_matches(".js")
            .parse::<u64>()
            .map_err(|_| invalid())?;

        let entity = rest.last().ok_or_else(invalid)?.to_ascii_lowercase();
        let path = match rest.len().checked_sub(2).map(|i| rest[i]) {
            Some(parent) if parent.eq_ignore_ascii_case("portfolioitem") => {
                format!("portfolioitem/{entity}")
            }
            _ => entity,
        };

        Ok(Self {
            url: url.to_string(),
            path,
            object_id,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.path, self.object_id)
    }
}

//-----------------------------------------------------------------------------
// Field States
//-----------------------------------------------------------------------------

/// A field value that is known locally
#[derive(Debug, Clone)]
pub enum FieldValue {
    /// Any JSON value that is not an entity
    Scalar(Value),

    /// A related entity
    Entity(Box<Entity>),

    /// An ordered list of related entities
    Collection(Vec<Entity>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_scalar().and_then(Value::as_str)
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            FieldValue::Entity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&[Entity]> {
        match self {
            FieldValue::Collection(items) => Some(items),
            _ => None,
        }
    }

    /// The related entity, for resolving its own lazy fields in place
    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            FieldValue::Entity(entity) => Some(&mut **entity),
            _ => None,
        }
    }

    /// The member list, for resolving members' lazy fields in place
    pub fn as_collection_mut(&mut self) -> Option<&mut [Entity]> {
        match self {
            FieldValue::Collection(items) => Some(items.as_mut_slice()),
            _ => None,
        }
    }
}

/// What a lazy field will be resolved from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pending {
    /// A bare reference to another entity
    Reference {
        url: String,
        type_name: Option<String>,
        name: Option<String>,
    },

    /// A collection stub: chase-able URL plus member count. `None` means the
    /// stub carried no count and the service total is used instead.
    Collection { url: String, count: Option<usize> },

    /// Revision history stub; the revisions sit one level further in
    RevisionHistory { url: String },
}

impl Pending {
    pub fn url(&self) -> &str {
        match self {
            Pending::Reference { url, .. }
            | Pending::Collection { url, .. }
            | Pending::RevisionHistory { url } => url,
        }
    }
}

/// Per-field resolution state
#[derive(Debug, Clone)]
pub enum FieldState {
    Unresolved(Pending),
    Resolving(Pending),
    Resolved(FieldValue),
}

impl FieldState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, FieldState::Resolved(_))
    }
}

/// How much of an entity has been loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationState {
    /// Identity only
    Shell,

    /// Some fields from a narrowed fetch
    Partial,

    /// Everything a `fetch=true` read returns
    Full,
}

//-----------------------------------------------------------------------------
// Entity
//-----------------------------------------------------------------------------

/// One materialized record of any registered type
#[derive(Debug, Clone)]
pub struct Entity {
    kind: EntityKind,
    reference: Reference,
    name: Option<String>,
    fields: BTreeMap<String, FieldState>,
    state: HydrationState,
    hydrator: Hydrator,
}

impl Entity {
    pub(crate) fn new(
        kind: EntityKind,
        reference: Reference,
        name: Option<String>,
        fields: BTreeMap<String, FieldState>,
        state: HydrationState,
        hydrator: Hydrator,
    ) -> Self {
        Self {
            kind,
            reference,
            name,
            fields,
            state,
            hydrator,
        }
    }

    pub fn kind(&self) -> &EntityKind {
        &self.kind
    }

    pub fn type_name(&self) -> &str {
        self.kind.name()
    }

    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    pub fn ref_url(&self) -> &str {
        self.reference.url()
    }

    pub fn object_id(&self) -> u64 {
        self.reference.object_id()
    }

    /// Display name (`_refObjectName`)
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn hydration_state(&self) -> HydrationState {
        self.state
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Current state of a field, without any I/O
    pub fn field_state(&self, name: &str) -> Option<&FieldState> {
        self.fields.get(name)
    }

    /// A field's value if it is already resolved, without any I/O
    pub fn resolved(&self, name: &str) -> Option<&FieldValue> {
        match self.fields.get(name) {
            Some(FieldState::Resolved(value)) => Some(value),
            _ => None,
        }
    }

    /// Mutable access to a resolved field, without any I/O
    pub fn resolved_mut(&mut self, name: &str) -> Option<&mut FieldValue> {
        match self.fields.get_mut(name) {
            Some(FieldState::Resolved(value)) => Some(value),
            _ => None,
        }
    }

    /// A resolved scalar field, without any I/O
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.resolved(name).and_then(FieldValue::as_scalar)
    }

    /// Returns a field, resolving it first if needed.
    ///
    /// A field absent from a shell or partial entity triggers one full re-fetch
    /// of the entity. A pending reference, collection or revision history is
    /// fetched once and cached; a failed fetch leaves the field unresolved and
    /// returns `UnresolvableReference`. `Ok(None)` means the field does not
    /// exist on the fully loaded entity.
    pub async fn field(&mut self, name: &str) -> TrackerResult<Option<&FieldValue>> {
        self.load(name).await?;
        Ok(self.resolved(name))
    }

    /// Like `field`, but hands back the value mutably so that nested entities
    /// and collection members resolve their own fields on this handle.
    pub async fn field_mut(&mut self, name: &str) -> TrackerResult<Option<&mut FieldValue>> {
        self.load(name).await?;
        Ok(self.resolved_mut(name))
    }

    async fn load(&mut self, name: &str) -> TrackerResult<()> {
        if !self.fields.contains_key(name) {
            if self.state == HydrationState::Full {
                return Ok(());
            }
            self.refresh().await?;
        }

        let pending = match self.fields.get(name) {
            Some(FieldState::Unresolved(pending)) | Some(FieldState::Resolving(pending)) => {
                Some(pending.clone())
            }
            _ => None,
        };

        if let Some(pending) = pending {
            debug!(entity = %self.reference, field = name, url = pending.url(), "resolving field");
            self.fields
                .insert(name.to_string(), FieldState::Resolving(pending.clone()));

            match self.hydrator.resolve(&pending).await {
                Ok(value) => {
                    self.fields.insert(name.to_string(), FieldState::Resolved(value));
                }
                Err(e) => {
                    self.fields
                        .insert(name.to_string(), FieldState::Unresolved(pending));
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    /// Re-reads the whole entity with `fetch=true` and merges every field
    /// that is not already resolved.
    pub async fn refresh(&mut self) -> TrackerResult<()> {
        let fetched = self.hydrator.fetch_entity(self.reference.url()).await?;
        let Entity { name, fields, .. } = fetched;

        for (field, state) in fields {
            let keep = self
                .fields
                .get(&field)
                .map(FieldState::is_resolved)
                .unwrap_or(false);
            if !keep {
                self.fields.insert(field, state);
            }
        }
        if name.is_some() {
            self.name = name;
        }
        self.state = HydrationState::Full;
        Ok(())
    }
}
