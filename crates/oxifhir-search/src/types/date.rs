//! Date search: timestamp comparison driven by the value's prefix.

use crate::parameters::SearchPrefix;
use crate::sql_builder::{SqlBuilder, SqlBuilderError};

/// Builds a timestamp comparison condition for one accessor.
///
/// The accessor text is cast to `timestamptz` and compared with the
/// operator mapped from the prefix. The value must start with a
/// `YYYY-MM-DD` calendar date; an optional time component is passed
/// through to PostgreSQL untouched.
pub fn date_condition(
    builder: &mut SqlBuilder,
    accessor: &str,
    prefix: SearchPrefix,
    value: &str,
) -> Result<String, SqlBuilderError> {
    if !is_date_shaped(value) {
        return Err(SqlBuilderError::InvalidSearchValue(format!(
            "not a date value: {value:?}"
        )));
    }

    let op = prefix.as_sql_operator();
    let p = builder.add_timestamp_param(value);
    Ok(format!("({accessor})::timestamptz {op} ${p}::timestamptz"))
}

/// Checks that a value starts with a `YYYY-MM-DD` calendar date.
fn is_date_shaped(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.len() < 10 {
        return false;
    }
    bytes[..10].iter().enumerate().all(|(i, b)| match i {
        4 | 7 => *b == b'-',
        _ => b.is_ascii_digit(),
    })
}
