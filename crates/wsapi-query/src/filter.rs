//! Filter specifications as callers write them.

use std::collections::BTreeMap;

//-----------------------------------------------------------------------------
// Filter Values
//-----------------------------------------------------------------------------

/// Right-hand side of a mapping entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Rendered double-quoted: `field = "value"`
    Text(String),

    /// Rendered bare: numbers, booleans, `null`, refs
    Literal(String),

    /// Rendered as the native subset form: `field in a,b`
    List(Vec<String>),
}

impl FilterValue {
    pub fn literal(value: impl ToString) -> Self {
        FilterValue::Literal(value.to_string())
    }

    /// Renders the `field operator value` condition for this value.
    pub fn render(&self, field: &str) -> String {
        match self {
            FilterValue::Text(text) => format!("{field} = \"{text}\""),
            FilterValue::Literal(literal) => format!("{field} = {literal}"),
            FilterValue::List(values) => format!("{field} in {}", values.join(",")),
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::literal(value)
    }
}

impl From<u64> for FilterValue {
    fn from(value: u64) -> Self {
        FilterValue::literal(value)
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        FilterValue::literal(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::literal(value)
    }
}

impl From<Vec<String>> for FilterValue {
    fn from(values: Vec<String>) -> Self {
        FilterValue::List(values)
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::List(values.into_iter().map(str::to_string).collect())
    }
}

//-----------------------------------------------------------------------------
// Filter Specifications
//-----------------------------------------------------------------------------

/// A caller-supplied filter in one of the three accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterSpec {
    /// One condition, or a complete expression the caller grouped by hand
    Text(String),

    /// Conditions that are AND-ed together
    Conditions(Vec<String>),

    /// Equality tests that are AND-ed together, in key order
    Mapping(BTreeMap<String, FilterValue>),
}

impl FilterSpec {
    /// Builds a mapping filter from field/value pairs
    pub fn mapping<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FilterValue>,
    {
        FilterSpec::Mapping(
            pairs
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        )
    }

    /// `field in v1,v2,...` from an explicit value list
    pub fn any_of<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FilterSpec::Text(format!("{field} in {}", join_values(values)))
    }

    /// `field !in v1,v2,...` from an explicit value list
    pub fn none_of<I, S>(field: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        FilterSpec::Text(format!("{field} !in {}", join_values(values)))
    }
}

fn join_values<I, S>(values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|value| value.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

impl From<&str> for FilterSpec {
    fn from(text: &str) -> Self {
        FilterSpec::Text(text.to_string())
    }
}

impl From<String> for FilterSpec {
    fn from(text: String) -> Self {
        FilterSpec::Text(text)
    }
}

impl From<Vec<String>> for FilterSpec {
    fn from(conditions: Vec<String>) -> Self {
        FilterSpec::Conditions(conditions)
    }
}

impl From<Vec<&str>> for FilterSpec {
    fn from(conditions: Vec<&str>) -> Self {
        FilterSpec::Conditions(conditions.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for FilterSpec {
    fn from(conditions: [&str; N]) -> Self {
        FilterSpec::Conditions(conditions.iter().map(|c| c.to_string()).collect())
    }
}

impl From<BTreeMap<String, FilterValue>> for FilterSpec {
    fn from(mapping: BTreeMap<String, FilterValue>) -> Self {
        FilterSpec::Mapping(mapping)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_rendering() {
        assert_eq!(FilterValue::from("Open").render("State"), "State = \"Open\"");
        assert_eq!(FilterValue::from(3i64).render("Priority"), "Priority = 3");
        assert_eq!(FilterValue::from(true).render("Blocked"), "Blocked = true");
        assert_eq!(
            FilterValue::from(vec!["Open", "Fixed"]).render("State"),
            "State in Open,Fixed"
        );
    }

    #[test]
    fn test_mapping_orders_by_field() {
        let spec = FilterSpec::mapping([("State", "Open"), ("Priority", "High")]);
        match spec {
            FilterSpec::Mapping(map) => {
                let fields: Vec<_> = map.keys().cloned().collect();
                assert_eq!(fields, vec!["Priority", "State"]);
            }
            other => panic!("unexpected spec: {other:?}"),
        }
    }

    #[test]
    fn test_subset_helpers() {
        assert_eq!(
            FilterSpec::none_of("ScheduleState", ["Defined", "Completed"]),
            FilterSpec::Text("ScheduleState !in Defined,Completed".to_string())
        );
        assert_eq!(
            FilterSpec::any_of("State", vec!["Open".to_string()]),
            FilterSpec::Text("State in Open".to_string())
        );
    }
}
