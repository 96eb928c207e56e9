//! Query requests and URL assembly
//!
//! A `QueryRequest` is what a caller asks for. `QueryUrl` is the compiled form:
//! every parameter fixed except the start index, which the fetcher fills in
//! per page.

use wsapi_query::{encode, FilterExpression, FilterSpec};

use crate::config::{Scope, MAX_PAGE_SIZE};
use crate::registry::EntityKind;

//-----------------------------------------------------------------------------
// Fetch Selection
//-----------------------------------------------------------------------------

/// Which fields the service should return for each record
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Fetch {
    /// `fetch=true`
    All,

    /// `fetch=Name,State,...`
    Fields(Vec<String>),

    /// No fetch parameter: references only
    #[default]
    Shallow,
}

impl Fetch {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Fetch::Fields(fields.into_iter().map(Into::into).collect())
    }

    fn param(&self) -> Option<String> {
        match self {
            Fetch::All => Some("true".to_string()),
            Fetch::Fields(fields) if !fields.is_empty() => Some(fields.join(",")),
            Fetch::Fields(_) | Fetch::Shallow => None,
        }
    }

    /// Whether records fetched this way are complete
    pub fn is_full(&self) -> bool {
        matches!(self, Fetch::All)
    }
}

//-----------------------------------------------------------------------------
// Query Request
//-----------------------------------------------------------------------------

/// A query against one entity type
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// Type name, alias or path
    pub entity: String,

    /// Optional filter
    pub filter: Option<FilterSpec>,

    /// Fields to return
    pub fetch: Fetch,

    /// Order clause, e.g. `Rank` or `CreationDate desc`
    pub order: Option<String>,

    /// Records per page; the client default when unset
    pub page_size: Option<usize>,

    /// Upper bound on delivered records
    pub limit: Option<usize>,

    /// Overrides the client's default scope
    pub scope: Option<Scope>,
}

impl QueryRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            filter: None,
            fetch: Fetch::default(),
            order: None,
            page_size: None,
            limit: None,
            scope: None,
        }
    }

    pub fn filter(mut self, filter: impl Into<FilterSpec>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn fetch(mut self, fetch: Fetch) -> Self {
        self.fetch = fetch;
        self
    }

    pub fn order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Page size actually requested: clamped to what the service accepts and
    /// never larger than the limit.
    pub fn effective_page_size(&self, default: usize) -> usize {
        let requested = self.page_size.unwrap_or(default).clamp(1, MAX_PAGE_SIZE);
        match self.limit {
            Some(limit) if limit > 0 && limit < requested => limit,
            _ => requested,
        }
    }
}

//-----------------------------------------------------------------------------
// Query URL
//-----------------------------------------------------------------------------

/// A page URL template parameterized by start index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryUrl {
    /// Everything up to and including `pagesize=`
    head: String,

    /// Scope parameters following `start=`
    tail: String,

    page_size: usize,
}

impl QueryUrl {
    pub fn build(
        base: &str,
        kind: &EntityKind,
        request: &QueryRequest,
        expression: Option<&FilterExpression>,
        page_size: usize,
        scope: &Scope,
    ) -> Self {
        let mut params = Vec::new();
        if let Some(fetch) = request.fetch.param() {
            params.push(format!("fetch={fetch}"));
        }
        if let Some(expression) = expression {
            params.push(format!("query={}", expression.to_query_param()));
        }
        if let Some(order) = request.order.as_deref().filter(|o| !o.trim().is_empty()) {
            params.push(format!("order={}", encode::encode_spaces(order.trim())));
        }
        params.push(format!("pagesize={page_size}"));

        let tail: String = scope
            .query_pairs()
            .into_iter()
            .map(|(key, value)| format!("&{key}={}", encode::encode_spaces(&value)))
            .collect();

        Self {
            head: format!("{}/{}?{}", base.trim_end_matches('/'), kind.path(), params.join("&")),
            tail,
            page_size,
        }
    }

    /// URL of the page starting at the 1-based `start` index
    pub fn page(&self, start: usize) -> String {
        format!("{}&start={start}{}", self.head, self.tail)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}
