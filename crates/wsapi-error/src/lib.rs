// WSAPI Error Handling
// Central location for the error types shared by the compiler, fetcher and hydrator

use std::time::Duration;
use thiserror::Error;

// Re-export for crates that define their own error enums on top of these
pub use thiserror;

/// Standard result type for the query pipeline
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

//-----------------------------------------------------------------------------
// Query Grammar Errors
//-----------------------------------------------------------------------------

/// A filter specification that could not be compiled into a wire expression.
///
/// These are raised before any network call is made and are never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryGrammarError {
    #[error("empty filter expression")]
    Empty,

    #[error("unbalanced parentheses in `{0}`")]
    UnbalancedParens(String),

    #[error("unterminated quoted value in `{0}`")]
    UnterminatedQuote(String),

    #[error("conjunction without a condition on both sides in `{0}`")]
    DanglingConjunction(String),

    #[error("unrecognized conjunction `{token}` in `{criteria}`")]
    UnrecognizedConjunction { token: String, criteria: String },

    #[error("malformed condition `{0}`: expected `field operator value`")]
    MalformedCondition(String),
}

//-----------------------------------------------------------------------------
// Transport Errors
//-----------------------------------------------------------------------------

/// Failure of a single outbound request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {reason}")]
    Connection { url: String, reason: String },

    #[error("response from {url} is not valid JSON: {reason}")]
    Decode { url: String, reason: String },
}

impl TransportError {
    /// Whether the same request could succeed later.
    ///
    /// Client errors other than 408 and 429 are final.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { status, .. } => {
                !(400..500).contains(status) || matches!(*status, 408 | 429)
            }
            _ => true,
        }
    }

    /// The URL of the request that failed
    pub fn url(&self) -> &str {
        match self {
            TransportError::Timeout { url, .. }
            | TransportError::Status { url, .. }
            | TransportError::Connection { url, .. }
            | TransportError::Decode { url, .. } => url,
        }
    }
}

//-----------------------------------------------------------------------------
// Pipeline Errors
//-----------------------------------------------------------------------------

/// Top-level error for compiling, fetching and hydrating query results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrackerError {
    #[error("query grammar error: {0}")]
    QueryGrammar(#[from] QueryGrammarError),

    #[error("page fetch at start index {start_index} failed after {attempts} attempts: {reason}")]
    PageFetch {
        start_index: usize,
        attempts: usize,
        reason: String,
    },

    #[error("unresolvable reference {reference}: {reason}")]
    UnresolvableReference { reference: String, reason: String },

    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("result stream ended after {served} of {expected} records")]
    ShortResultStream { served: usize, expected: usize },

    #[error("configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Returns a stable code string for this error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            TrackerError::QueryGrammar(_) => "QUERY_GRAMMAR",
            TrackerError::PageFetch { .. } => "PAGE_FETCH",
            TrackerError::UnresolvableReference { .. } => "UNRESOLVABLE_REFERENCE",
            TrackerError::UnknownEntityType(_) => "UNKNOWN_ENTITY_TYPE",
            TrackerError::Transport(_) => "TRANSPORT",
            TrackerError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            TrackerError::ShortResultStream { .. } => "SHORT_RESULT_STREAM",
            TrackerError::Config(_) => "CONFIG",
        }
    }

    /// Indicates whether retrying the same request might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            TrackerError::Transport(e) => e.is_transient(),
            TrackerError::MalformedResponse(_) | TrackerError::ShortResultStream { .. } => true,
            _ => false,
        }
    }

    /// Wraps a failed lazy fetch as an unresolvable reference.
    pub fn unresolvable(reference: impl Into<String>, reason: impl ToString) -> Self {
        TrackerError::UnresolvableReference {
            reference: reference.into(),
            reason: reason.to_string(),
        }
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
