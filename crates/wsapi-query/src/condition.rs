//! Single-condition grammar: `identifier operator value`.
//!
//! Subset (`in`, `!in`) and range (`between`, `!between`) operators are not
//! understood natively by the service for every form, so a parsed condition
//! renders itself into the wire text the service does accept.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use wsapi_error::QueryGrammarError;

use crate::compiler::right_associate;
use crate::lexer::{self, Conjunction};

/// Field followed by a symbolic operator; spaces around the operator are optional.
static SYMBOLIC_CONDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<field>[A-Za-z_][A-Za-z0-9_.]*)\s*(?P<op>!=|>=|<=|=|>|<)\s*(?P<value>.*)$")
        .expect("symbolic condition pattern is valid")
});

/// Field followed by a word operator, which needs whitespace on both sides.
static WORD_CONDITION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<field>[A-Za-z_][A-Za-z0-9_.]*)\s+(?P<op>(?i:!?contains|!?in|!?between))\s+(?P<value>.*)$")
        .expect("word condition pattern is valid")
});

//-----------------------------------------------------------------------------
// Operators
//-----------------------------------------------------------------------------

/// Relational operators accepted in a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    NotEq,
    Gt,
    Lt,
    Ge,
    Le,
    Contains,
    NotContains,
    In,
    NotIn,
    Between,
    NotBetween,
}

impl Operator {
    /// Parses an operator token, word operators in any letter case
    pub fn parse(token: &str) -> Option<Self> {
        let op = match token.to_ascii_lowercase().as_str() {
            "=" => Operator::Eq,
            "!=" => Operator::NotEq,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "contains" => Operator::Contains,
            "!contains" => Operator::NotContains,
            "in" => Operator::In,
            "!in" => Operator::NotIn,
            "between" => Operator::Between,
            "!between" => Operator::NotBetween,
            _ => return None,
        };
        Some(op)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Contains => "contains",
            Operator::NotContains => "!contains",
            Operator::In => "in",
            Operator::NotIn => "!in",
            Operator::Between => "between",
            Operator::NotBetween => "!between",
        }
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(
            self,
            Operator::Eq | Operator::NotEq | Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le
        )
    }

    pub fn is_subset(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Operator::Between | Operator::NotBetween)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//-----------------------------------------------------------------------------
// Conditions
//-----------------------------------------------------------------------------

/// Right-hand side of a condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// One value, quoted or bare
    Single(String),

    /// Value list of a subset test
    Set(Vec<String>),

    /// Bounds of a range test
    Range { low: String, high: String },
}

/// One validated `field operator value` condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub operand: Operand,
}

impl Condition {
    /// Parses one condition. A single enclosing pair of parentheses is allowed.
    pub fn parse(text: &str) -> Result<Self, QueryGrammarError> {
        let text = lexer::strip_enclosing(text)?;
        let captures = SYMBOLIC_CONDITION
            .captures(text)
            .or_else(|| WORD_CONDITION.captures(text))
            .ok_or_else(|| QueryGrammarError::MalformedCondition(text.to_string()))?;

        let field = captures["field"].to_string();
        let operator = Operator::parse(&captures["op"])
            .ok_or_else(|| QueryGrammarError::MalformedCondition(text.to_string()))?;
        let value = captures["value"].trim();

        let operand = if operator.is_subset() {
            Operand::Set(parse_set(value, text)?)
        } else if operator.is_range() {
            parse_range(value, text)?
        } else {
            Operand::Single(normalize_value(value, text)?)
        };

        Ok(Self {
            field,
            operator,
            operand,
        })
    }

    /// Renders the condition as unencoded wire text.
    ///
    /// `in` keeps the native list form. `!in` becomes a conjunction of
    /// inequalities, since every exclusion must hold. Ranges become a pair of
    /// comparisons.
    pub fn to_wire_text(&self) -> String {
        let field = &self.field;
        match (&self.operand, self.operator) {
            (Operand::Set(values), Operator::NotIn) => {
                let clauses: Vec<String> = values
                    .iter()
                    .map(|value| format!("{field} != {}", quoted(value)))
                    .collect();
                let conjunctions = vec![Conjunction::And; clauses.len() - 1];
                right_associate(&clauses, &conjunctions)
            }
            (Operand::Set(values), _) => format!("{field} in {}", values.join(",")),
            (Operand::Range { low, high }, Operator::NotBetween) => {
                format!("({field} < {low}) OR ({field} > {high})")
            }
            (Operand::Range { low, high }, _) => {
                format!("({field} >= {low}) AND ({field} <= {high})")
            }
            (Operand::Single(value), operator) => format!("{field} {operator} {value}"),
        }
    }
}

//-----------------------------------------------------------------------------
// Value helpers
//-----------------------------------------------------------------------------

/// Validates a single value; a bare multi-word value gets quoted.
fn normalize_value(value: &str, condition: &str) -> Result<String, QueryGrammarError> {
    if value.is_empty() {
        return Err(QueryGrammarError::MalformedCondition(condition.to_string()));
    }

    let words = lexer::words(value)?;
    if words.len() == 1 {
        return Ok(words.into_iter().next().unwrap_or_default());
    }

    // A comparison inside a bare value means two conditions were joined by
    // something other than AND/OR.
    if let Some(position) = words
        .iter()
        .position(|word| Operator::parse(word).is_some_and(|op| op.is_symbolic()))
    {
        return Err(if position >= 2 {
            QueryGrammarError::UnrecognizedConjunction {
                token: words[position - 2].clone(),
                criteria: condition.to_string(),
            }
        } else {
            QueryGrammarError::MalformedCondition(condition.to_string())
        });
    }
    if words.iter().any(|word| word.contains('"')) {
        return Err(QueryGrammarError::MalformedCondition(condition.to_string()));
    }

    Ok(format!("\"{value}\""))
}

fn parse_set(value: &str, condition: &str) -> Result<Vec<String>, QueryGrammarError> {
    let items = lexer::comma_items(value)?;
    if items.iter().any(|item| item.is_empty()) {
        return Err(QueryGrammarError::MalformedCondition(condition.to_string()));
    }
    items
        .iter()
        .map(|item| normalize_value(item, condition))
        .collect()
}

fn parse_range(value: &str, condition: &str) -> Result<Operand, QueryGrammarError> {
    match lexer::words(value)?.as_slice() {
        [low, and, high] if Conjunction::parse(and) == Some(Conjunction::And) => Ok(Operand::Range {
            low: low.clone(),
            high: high.clone(),
        }),
        _ => Err(QueryGrammarError::MalformedCondition(condition.to_string())),
    }
}

fn quoted(value: &str) -> String {
    if value.starts_with('"') {
        value.to_string()
    } else {
        format!("\"{value}\"")
    }
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
