// Quote-aware lexing of filter text: words, parentheses and conjunctions

use std::fmt;

use wsapi_error::QueryGrammarError;

use crate::condition::Operator;

//-----------------------------------------------------------------------------
// Conjunctions
//-----------------------------------------------------------------------------

/// Boolean connective between two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    /// Recognizes `AND` / `OR` in any letter case
    pub fn parse(word: &str) -> Option<Self> {
        if word.eq_ignore_ascii_case("and") {
            Some(Conjunction::And)
        } else if word.eq_ignore_ascii_case("or") {
            Some(Conjunction::Or)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Conjunction::And => "AND",
            Conjunction::Or => "OR",
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//-----------------------------------------------------------------------------
// Words
//-----------------------------------------------------------------------------

/// Splits text on whitespace, keeping double-quoted runs inside one word.
pub(crate) fn words(text: &str) -> Result<Vec<String>, QueryGrammarError> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in text.chars() {
        if ch == '"' {
            quoted = !quoted;
            current.push(ch);
        } else if ch.is_whitespace() && !quoted {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }

    if quoted {
        return Err(QueryGrammarError::UnterminatedQuote(text.to_string()));
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

/// Splits text on commas outside double quotes, trimming each item.
pub(crate) fn comma_items(text: &str) -> Result<Vec<String>, QueryGrammarError> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut quoted = false;

    for ch in text.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                current.push(ch);
            }
            ',' if !quoted => items.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(ch),
        }
    }

    if quoted {
        return Err(QueryGrammarError::UnterminatedQuote(text.to_string()));
    }
    items.push(current.trim().to_string());
    Ok(items)
}

//-----------------------------------------------------------------------------
// Parentheses
//-----------------------------------------------------------------------------

/// Shape of the parentheses in a piece of filter text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParenProfile {
    /// Opening parentheses outside quoted values
    pub opening: usize,

    /// Whether the first character opens a group closed by the last character
    pub enclosed: bool,
}

/// Counts parentheses outside quotes and rejects unbalanced text.
pub(crate) fn paren_profile(text: &str) -> Result<ParenProfile, QueryGrammarError> {
    let mut depth = 0usize;
    let mut opening = 0usize;
    let mut quoted = false;
    let mut first_group_end = None;
    let starts_with_group = text.starts_with('(');

    for (index, ch) in text.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            '(' if !quoted => {
                depth += 1;
                opening += 1;
            }
            ')' if !quoted => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| QueryGrammarError::UnbalancedParens(text.to_string()))?;
                if depth == 0 && first_group_end.is_none() {
                    first_group_end = Some(index);
                }
            }
            _ => {}
        }
    }

    if quoted {
        return Err(QueryGrammarError::UnterminatedQuote(text.to_string()));
    }
    if depth != 0 {
        return Err(QueryGrammarError::UnbalancedParens(text.to_string()));
    }

    let enclosed = starts_with_group && first_group_end == Some(text.len() - 1);
    Ok(ParenProfile { opening, enclosed })
}

/// Removes one enclosing pair of parentheses, if the whole text is enclosed.
pub(crate) fn strip_enclosing(text: &str) -> Result<&str, QueryGrammarError> {
    let text = text.trim();
    let profile = paren_profile(text)?;
    if profile.enclosed {
        Ok(text[1..text.len() - 1].trim())
    } else {
        Ok(text)
    }
}

//-----------------------------------------------------------------------------
// Conjunction splitting
//-----------------------------------------------------------------------------

/// Operands of a flat boolean expression and the conjunctions between them.
/// `conjunctions.len() == operands.len() - 1` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Segments {
    pub operands: Vec<String>,
    pub conjunctions: Vec<Conjunction>,
}

/// Splits text on whole-word `AND`/`OR` outside quotes.
///
/// The `AND` inside `field between lo and hi` is kept with its condition.
pub(crate) fn split_conjunctions(text: &str) -> Result<Segments, QueryGrammarError> {
    let mut operands = Vec::new();
    let mut conjunctions = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for word in words(text)? {
        match Conjunction::parse(&word) {
            Some(Conjunction::And) if awaiting_range_bound(&current) => current.push(word),
            Some(conjunction) => {
                if current.is_empty() {
                    return Err(QueryGrammarError::DanglingConjunction(text.to_string()));
                }
                operands.push(current.join(" "));
                current.clear();
                conjunctions.push(conjunction);
            }
            None => current.push(word),
        }
    }

    if current.is_empty() {
        return Err(if operands.is_empty() {
            QueryGrammarError::Empty
        } else {
            QueryGrammarError::DanglingConjunction(text.to_string())
        });
    }
    operands.push(current.join(" "));

    Ok(Segments {
        operands,
        conjunctions,
    })
}

/// `field between lo` is waiting for its `and hi`
fn awaiting_range_bound(words: &[String]) -> bool {
    words.len() == 3 && Operator::parse(&words[1]).is_some_and(|op| op.is_range())
}

//-----------------------------------------------------------------------------
// Tests
//-----------------------------------------------------------------------------
