//! WSAPI Query Compiler
//!
//! Turns a caller's filter specification (a condition string, a list of
//! conditions, or a field/value mapping) into the single filter expression the
//! service accepts: strictly binary, fully parenthesized and percent-encoded.
//!
//! ## Module Organization
//!
//! * **Filter input**: the accepted input shapes (`filter`)
//! * **Conditions**: `field operator value` grammar and subset/range rewrites (`condition`)
//! * **Lexing**: quote-aware word, parenthesis and conjunction handling (`lexer`)
//! * **Compilation**: right-associated reduction and the escape hatch (`compiler`)
//! * **Encoding**: wire percent-encoding (`encode`)

//-----------------------------------------------------------------------------
// Modules
//-----------------------------------------------------------------------------

pub mod compiler;
pub mod condition;
pub mod encode;
pub mod expression;
pub mod filter;
mod lexer;

//-----------------------------------------------------------------------------
// Re-exports
//-----------------------------------------------------------------------------

pub use compiler::compile;
pub use condition::{Condition, Operand, Operator};
pub use expression::FilterExpression;
pub use filter::{FilterSpec, FilterValue};
pub use lexer::Conjunction;

pub use wsapi_error::QueryGrammarError;
