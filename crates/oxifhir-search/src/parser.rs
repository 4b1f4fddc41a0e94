//! Raw search value parsing: comparison prefix extraction.

use crate::parameters::SearchPrefix;

/// A raw search value split into its comparison prefix and payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedValue {
    pub prefix: SearchPrefix,
    pub value: String,
}

/// Splits a leading two-letter comparison prefix off a raw value.
///
/// `"ge2024-01-01"` becomes `(Ge, "2024-01-01")`; a value without a prefix
/// gets the default `(Eq, value)`.
///
/// Stripping is applied uniformly to every value type; builders for
/// non-ordinal types ignore the prefix. This means any literal code value
/// beginning with `eq|ne|gt|lt|ge|le|sa|eb|ap` would lose its first two
/// characters here. No FHIR administrative-gender or common status code
/// collides today, but a domain vocabulary that does would need a
/// resource-specific override routing it away from prefix parsing.
#[must_use]
pub fn split_prefix(raw: &str) -> (SearchPrefix, &str) {
    if raw.len() >= 2
        && raw.is_char_boundary(2)
        && let Some(prefix) = SearchPrefix::parse(&raw[..2])
    {
        return (prefix, &raw[2..]);
    }
    (SearchPrefix::Eq, raw)
}

/// Returns `true` if the value carries an explicit comparison prefix.
#[must_use]
pub fn has_comparison_prefix(raw: &str) -> bool {
    raw.len() >= 2 && raw.is_char_boundary(2) && SearchPrefix::parse(&raw[..2]).is_some()
}

/// Convenience wrapper producing an owned [`ParsedValue`].
#[must_use]
pub fn parse_value(raw: &str) -> ParsedValue {
    let (prefix, value) = split_prefix(raw);
    ParsedValue {
        prefix,
        value: value.to_string(),
    }
}
