//! Entity type registry
//!
//! Every entity is materialized as the same tagged record; the registry only
//! decides whether a type tag is known and what its canonical name and URL
//! path are. Schema-reported types can be added at runtime.

use std::collections::HashMap;
use std::fmt;

use wsapi_error::{TrackerError, TrackerResult};

/// Types every subscription exposes
const BUILTIN_TYPES: &[&str] = &[
    "AllowedAttributeValue",
    "Artifact",
    "Attachment",
    "AttributeDefinition",
    "Blocker",
    "Build",
    "BuildDefinition",
    "Change",
    "Changeset",
    "ConversationPost",
    "Defect",
    "DefectSuite",
    "HierarchicalRequirement",
    "Iteration",
    "Milestone",
    "PortfolioItem",
    "PortfolioItem/Feature",
    "PortfolioItem/Initiative",
    "PortfolioItem/Theme",
    "Preference",
    "Project",
    "Release",
    "Revision",
    "RevisionHistory",
    "SCMRepository",
    "State",
    "Subscription",
    "Tag",
    "Task",
    "TestCase",
    "TestCaseResult",
    "TestCaseStep",
    "TestFolder",
    "TestSet",
    "TypeDefinition",
    "User",
    "UserPermission",
    "UserProfile",
    "Workspace",
    "WorkspaceConfiguration",
];

const BUILTIN_ALIASES: &[(&str, &str)] = &[
    ("Story", "HierarchicalRequirement"),
    ("UserStory", "HierarchicalRequirement"),
    ("Feature", "PortfolioItem/Feature"),
    ("Initiative", "PortfolioItem/Initiative"),
    ("Theme", "PortfolioItem/Theme"),
];

//-----------------------------------------------------------------------------
// Entity Kind
//-----------------------------------------------------------------------------

/// Canonical type name plus the URL path it is served under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityKind {
    /// Canonical name, e.g. `PortfolioItem/Feature`
    name: String,

    /// Lower-case resource path, e.g. `portfolioitem/feature`
    path: String,
}

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let path = name.to_ascii_lowercase();
        Self { name, path }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn lookup_key(name: &str) -> String {
    name.trim().trim_matches('/').to_ascii_lowercase()
}

//-----------------------------------------------------------------------------
// Registry
//-----------------------------------------------------------------------------

/// Case-insensitive map from type names, aliases and paths to kinds
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    kinds: HashMap<String, EntityKind>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl EntityRegistry {
    /// A registry that knows nothing
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    /// A registry preloaded with the service's standard types and aliases
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for name in BUILTIN_TYPES {
            registry.register(*name);
        }
        for (alias, target) in BUILTIN_ALIASES {
            if let Some(kind) = registry.kinds.get(&lookup_key(target)).cloned() {
                registry.kinds.insert(lookup_key(alias), kind);
            }
        }
        registry
    }

    /// Registers a type under its own name; an existing entry wins.
    pub fn register(&mut self, name: &str) -> EntityKind {
        let key = lookup_key(name);
        self.kinds
            .entry(key)
            .or_insert_with(|| EntityKind::new(name.trim().trim_matches('/')))
            .clone()
    }

    /// Makes `alias` resolve to an already registered type
    pub fn alias(&mut self, alias: &str, target: &str) -> TrackerResult<()> {
        let kind = self.resolve(target)?;
        self.kinds.insert(lookup_key(alias), kind);
        Ok(())
    }

    /// Registers schema-reported type paths such as `PortfolioItem/Epic`.
    ///
    /// The last path segment becomes an alias unless it is taken. Returns how
    /// many types were new.
    pub fn register_type_definitions<I, S>(&mut self, type_paths: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for type_path in type_paths {
            let type_path = type_path.as_ref().trim();
            if type_path.is_empty() {
                continue;
            }
            if !self.contains(type_path) {
                added += 1;
            }
            let kind = self.register(type_path);
            if let Some((_, element)) = type_path.rsplit_once('/') {
                self.kinds.entry(lookup_key(element)).or_insert(kind);
            }
        }
        added
    }

    /// Looks a type up by name, alias or path
    pub fn resolve(&self, name: &str) -> TrackerResult<EntityKind> {
        self.kinds
            .get(&lookup_key(name))
            .cloned()
            .ok_or_else(|| TrackerError::UnknownEntityType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kinds.contains_key(&lookup_key(name))
    }

    /// Number of distinct lookup keys
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
