//! Token search: exact equality, plus the identifier compound matcher.

use crate::sql_builder::{SqlBuilder, SqlBuilderError};

/// Parse a token value into system and code parts.
///
/// Token values can be in the following formats:
/// - `system|code` - match both system and code
/// - `|code` - explicit empty system
/// - `code` - match code in any system
#[must_use]
pub fn parse_token_value(value: &str) -> (Option<&str>, &str) {
    match value.split_once('|') {
        Some((system, code)) => (Some(system), code),
        None => (None, value),
    }
}

/// Builds an exact-equality condition for one accessor.
pub fn token_condition(builder: &mut SqlBuilder, accessor: &str, value: &str) -> String {
    let p = builder.add_text_param(value);
    format!("{accessor} = ${p}")
}

/// Builds the identifier compound condition.
///
/// Identifier search always uses JSONB containment over the identifier
/// array, bypassing path resolution and the functional index registry:
/// - `system|value` requires an element matching both fields
/// - `|value` and bare `value` require an element matching `value`,
///   with `system` ignored
pub fn identifier_condition(
    builder: &mut SqlBuilder,
    array_accessor: &str,
    raw_value: &str,
) -> Result<String, SqlBuilderError> {
    let (system, code) = parse_token_value(raw_value);

    if code.is_empty() {
        return Err(SqlBuilderError::InvalidSearchValue(format!(
            "identifier search requires a value: {raw_value:?}"
        )));
    }

    let payload = match system {
        Some(sys) if !sys.is_empty() => {
            serde_json::json!([{ "system": sys, "value": code }])
        }
        _ => serde_json::json!([{ "value": code }]),
    };

    let p = builder.add_json_param(payload.to_string());
    Ok(format!("{array_accessor} @> ${p}::jsonb"))
}
