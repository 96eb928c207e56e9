//! Wire encoding for filter expressions and other query-string components.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters that pass through unescaped: alphanumerics plus `_ . - ~ /`.
const WIRE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Escapes the backend expects as literal characters. Double-encoding these
/// breaks matching on the service side.
const LITERAL_RESTORES: [(&str, &str); 5] = [
    ("%3D", "="),
    ("%28", "("),
    ("%29", ")"),
    ("%21", "!"),
    ("%22", "\""),
];

/// Percent-encodes an assembled expression, then restores `=`, `(`, `)`, `!`
/// and `"` to their literal form. Spaces come out as `%20`.
pub fn encode_expression(raw: &str) -> String {
    let mut encoded = utf8_percent_encode(raw, WIRE_ENCODE_SET).to_string();
    for (escaped, literal) in LITERAL_RESTORES {
        encoded = encoded.replace(escaped, literal);
    }
    encoded
}

/// Encodes spaces only, leaving everything else as written.
pub fn encode_spaces(raw: &str) -> String {
    raw.replace(' ', "%20")
}

/// Reverses percent-encoding, for diagnostics and assertions.
pub fn decode(encoded: &str) -> String {
    percent_decode_str(encoded).decode_utf8_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literals_survive_encoding() {
        assert_eq!(
            encode_expression("(Name = \"x\") AND (State != Open)"),
            "(Name%20=%20\"x\")%20AND%20(State%20!=%20Open)"
        );
    }

    #[test]
    fn test_comparison_and_list_characters_are_escaped() {
        assert_eq!(encode_expression("Estimate >= 3"), "Estimate%20%3E=%203");
        assert_eq!(encode_expression("State in A,B"), "State%20in%20A%2CB");
        assert_eq!(encode_expression("Owner.Name = a/b"), "Owner.Name%20=%20a/b");
    }

    #[test]
    fn test_percent_in_value_is_not_mistaken_for_escape() {
        // A literal "%3D" in a value must stay encoded as "%253D".
        assert_eq!(encode_expression("Name = %3D"), "Name%20=%20%253D");
    }

    #[test]
    fn test_decode_reverses_encoding() {
        let raw = "(Estimate >= 3) AND (Tags in a,b)";
        assert_eq!(decode(&encode_expression(raw)), raw);
    }
}
