//! String search: case-insensitive substring match.

use crate::sql_builder::SqlBuilder;

/// Builds a case-insensitive substring condition for one accessor.
pub fn string_condition(builder: &mut SqlBuilder, accessor: &str, value: &str) -> String {
    let p = builder.add_text_param(format!("%{value}%"));
    format!("{accessor} ILIKE ${p}")
}
