//! Predicate builders for the search parameter shapes.
//!
//! Each submodule turns one accessor expression plus a parsed value into a
//! SQL condition fragment. [`build_parameter_condition`] dispatches on the
//! parameter type and OR-combines the fragments when a parameter resolved
//! to several candidate paths; every fragment binds its own `$n` parameter,
//! so the combined condition is collision-free within one query.

pub mod date;
pub mod number;
pub mod reference;
pub mod string;
pub mod token;

pub use token::{identifier_condition, parse_token_value};

use crate::parameters::{SearchParameterType, SearchPrefix};
use crate::sql_builder::{SqlBuilder, SqlBuilderError};

/// Builds and registers the condition for one search parameter.
///
/// `accessors` holds either the single indexed accessor (fast path) or one
/// compiled accessor per candidate document path (fallback). Non-ordinal
/// types ignore `prefix`.
pub fn build_parameter_condition(
    builder: &mut SqlBuilder,
    accessors: &[String],
    param_type: SearchParameterType,
    prefix: SearchPrefix,
    value: &str,
) -> Result<(), SqlBuilderError> {
    if value.is_empty() {
        return Err(SqlBuilderError::InvalidSearchValue(
            "empty search value".to_string(),
        ));
    }
    if accessors.is_empty() {
        return Err(SqlBuilderError::InvalidPath(
            "no accessor expressions".to_string(),
        ));
    }

    let mut fragments = Vec::with_capacity(accessors.len());
    for accessor in accessors {
        let fragment = match param_type {
            SearchParameterType::String => string::string_condition(builder, accessor, value),
            SearchParameterType::Token => token::token_condition(builder, accessor, value),
            SearchParameterType::Date => date::date_condition(builder, accessor, prefix, value)?,
            SearchParameterType::Number | SearchParameterType::Quantity => {
                number::number_condition(builder, accessor, prefix, value)?
            }
            SearchParameterType::Reference => {
                reference::reference_condition(builder, accessor, value)
            }
        };
        fragments.push(fragment);
    }

    builder.add_condition(SqlBuilder::build_or_clause(&fragments));
    Ok(())
}
