//! The compiled, wire-ready filter expression.

use std::fmt;

use crate::encode;

/// A filter in the service's binary-parenthesized grammar, already encoded.
///
/// Only the compiler constructs these. The text is what goes between the
/// parentheses of the `query=(...)` URL parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FilterExpression(String);

impl FilterExpression {
    pub(crate) fn new(encoded: String) -> Self {
        Self(encoded)
    }

    /// The encoded expression
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The expression with percent-encoding reversed
    pub fn decoded(&self) -> String {
        encode::decode(&self.0)
    }

    /// Renders the `query=(...)` parameter value
    pub fn to_query_param(&self) -> String {
        format!("({})", self.0)
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FilterExpression {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
