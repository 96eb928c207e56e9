//! Filter compilation.
//!
//! The service only understands binary boolean expressions of the form
//! `(x) OP (y)`; `(x) AND (y) AND (z)` must be written `(x) AND ((y) AND (z))`.
//! Input with more than one opening parenthesis is assumed to be grouped by the
//! caller already and is passed through with spaces encoded. Everything else is
//! split on its conjunctions, validated condition by condition, and folded
//! right-to-left into that binary shape.

use tracing::debug;
use wsapi_error::QueryGrammarError;

use crate::condition::Condition;
use crate::encode;
use crate::expression::FilterExpression;
use crate::filter::{FilterSpec, FilterValue};
use crate::lexer::{self, Conjunction};

//-----------------------------------------------------------------------------
// Entry point
//-----------------------------------------------------------------------------

/// Compiles a filter specification into the wire expression.
pub fn compile(spec: &FilterSpec) -> Result<FilterExpression, QueryGrammarError> {
    let expression = match spec {
        FilterSpec::Text(text) => compile_text(text)?,
        FilterSpec::Conditions(conditions) => compile_conditions(conditions)?,
        FilterSpec::Mapping(mapping) => compile_mapping(mapping)?,
    };

    debug!(filter = %expression.decoded(), "compiled filter expression");
    Ok(expression)
}

fn compile_conditions(conditions: &[String]) -> Result<FilterExpression, QueryGrammarError> {
    if conditions.is_empty() {
        return Err(QueryGrammarError::Empty);
    }
    if let Some(blank) = conditions.iter().find(|c| c.trim().is_empty()) {
        return Err(QueryGrammarError::MalformedCondition(blank.clone()));
    }
    compile_text(&conditions.join(" AND "))
}

fn compile_mapping(
    mapping: &std::collections::BTreeMap<String, FilterValue>,
) -> Result<FilterExpression, QueryGrammarError> {
    let rendered: Vec<String> = mapping
        .iter()
        .map(|(field, value)| value.render(field))
        .collect();

    match rendered.as_slice() {
        [] => Err(QueryGrammarError::Empty),
        [only] => {
            let condition = Condition::parse(only)?;
            Ok(FilterExpression::new(encode::encode_expression(
                &condition.to_wire_text(),
            )))
        }
        _ => compile_text(&rendered.join(" AND ")),
    }
}

fn compile_text(criteria: &str) -> Result<FilterExpression, QueryGrammarError> {
    let criteria = criteria.trim();
    if criteria.is_empty() {
        return Err(QueryGrammarError::Empty);
    }

    let profile = lexer::paren_profile(criteria)?;

    // Caller-grouped expression: trust it, minus the pair the URL adds back.
    if profile.opening > 1 {
        let interior = if profile.enclosed {
            criteria[1..criteria.len() - 1].trim()
        } else {
            criteria
        };
        return Ok(FilterExpression::new(encode::encode_spaces(interior)));
    }

    let criteria = if profile.enclosed {
        criteria[1..criteria.len() - 1].trim()
    } else {
        criteria
    };

    let segments = lexer::split_conjunctions(criteria)?;
    let operands = segments
        .operands
        .iter()
        .map(|segment| Condition::parse(segment).map(|condition| condition.to_wire_text()))
        .collect::<Result<Vec<_>, _>>()?;

    let raw = right_associate(&operands, &segments.conjunctions);
    Ok(FilterExpression::new(encode::encode_expression(&raw)))
}

//-----------------------------------------------------------------------------
// Binary reduction
//-----------------------------------------------------------------------------

/// Folds operands right-to-left: the last operand is the seed, and each earlier
/// operand/conjunction pair wraps it as `(operand) CONJ (accumulator)`.
///
/// A lone operand is returned as-is; the URL supplies its parentheses.
pub(crate) fn right_associate(operands: &[String], conjunctions: &[Conjunction]) -> String {
    debug_assert_eq!(operands.len(), conjunctions.len() + 1);

    let Some((last, rest)) = operands.split_last() else {
        return String::new();
    };

    rest.iter()
        .zip(conjunctions)
        .rev()
        .fold(last.clone(), |accumulator, (operand, conjunction)| {
            format!("({operand}) {conjunction} ({accumulator})")
        })
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compiled(spec: impl Into<FilterSpec>) -> String {
        compile(&spec.into()).unwrap().into_inner()
    }

    #[test]
    fn test_right_associate_shapes() {
        let ops = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(right_associate(&ops(&["a"]), &[]), "a");
        assert_eq!(
            right_associate(&ops(&["a", "b"]), &[Conjunction::And]),
            "(a) AND (b)"
        );
        assert_eq!(
            right_associate(&ops(&["a", "b", "c"]), &[Conjunction::And, Conjunction::Or]),
            "(a) AND ((b) OR (c))"
        );
    }

    #[test]
    fn test_single_condition_has_no_wrapping() {
        assert_eq!(compiled("State = Open"), "State%20=%20Open");
    }

    #[test]
    fn test_condition_list_is_anded() {
        assert_eq!(
            compiled(vec!["State = Submitted", "Priority != High"]),
            "(State%20=%20Submitted)%20AND%20(Priority%20!=%20High)"
        );
    }

    #[test]
    fn test_mixed_conjunctions_right_associate() {
        assert_eq!(
            compiled("A = 1 and B = 2 OR C = 3"),
            "(A%20=%201)%20AND%20((B%20=%202)%20OR%20(C%20=%203))"
        );
    }

    #[test]
    fn test_single_entry_mapping() {
        assert_eq!(
            compiled(FilterSpec::mapping([("State", "Open")])),
            "State%20=%20\"Open\""
        );
    }

    #[test]
    fn test_multi_entry_mapping() {
        assert_eq!(
            compiled(FilterSpec::mapping([
                ("State", FilterValue::from("Open")),
                ("Priority", FilterValue::literal(2)),
            ])),
            "(Priority%20=%202)%20AND%20(State%20=%20\"Open\")"
        );
    }

    #[test]
    fn test_grouped_expression_is_trusted() {
        assert_eq!(
            compiled(r#"((State = Open) AND (Owner.Name = "jo"))"#),
            r#"(State%20=%20Open)%20AND%20(Owner.Name%20=%20"jo")"#
        );
        assert_eq!(
            compiled("(A = 1) OR (B = 2)"),
            "(A%20=%201)%20OR%20(B%20=%202)"
        );
    }

    #[test]
    fn test_single_enclosed_condition_is_unwrapped() {
        assert_eq!(compiled("(State = Open)"), "State%20=%20Open");
    }

    #[test]
    fn test_range_inside_conjunction_is_one_operand() {
        assert_eq!(
            compile(&"Estimate between 1 and 3 AND State = Open".into())
                .unwrap()
                .decoded(),
            "((Estimate >= 1) AND (Estimate <= 3)) AND (State = Open)"
        );
    }

    #[test]
    fn test_grammar_errors() {
        assert_eq!(compile(&"".into()), Err(QueryGrammarError::Empty));
        assert_eq!(compile(&FilterSpec::Conditions(vec![])), Err(QueryGrammarError::Empty));
        assert!(matches!(
            compile(&"(State = Open".into()),
            Err(QueryGrammarError::UnbalancedParens(_))
        ));
        assert!(matches!(
            compile(&"State = Open AND".into()),
            Err(QueryGrammarError::DanglingConjunction(_))
        ));
        assert!(matches!(
            compile(&"State = Open XOR Priority = High".into()),
            Err(QueryGrammarError::UnrecognizedConjunction { .. })
        ));
        assert!(matches!(
            compile(&vec!["State = Open", "Priority"].into()),
            Err(QueryGrammarError::MalformedCondition(_))
        ));
    }
}
