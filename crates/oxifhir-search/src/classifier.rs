//! Parameter type inference for parameters with no registry entry.
//!
//! The rule order is load-bearing: a parameter named `status` with the value
//! `"true"` must classify as a token before the date rules ever run, and a
//! reference-shaped name wins over a date-shaped value.

use std::sync::LazyLock;

use regex::Regex;

use crate::parameters::SearchParameterType;
use crate::parser::has_comparison_prefix;

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap_or_else(|e| panic!("invalid date regex: {e}"))
});

/// Infers a [`SearchParameterType`] from the parameter name and raw value.
///
/// First match wins:
/// 1. `_id`, or a name containing `identifier`/`status`/`code`/`gender`/
///    `active`, or a boolean-looking value → Token
/// 2. a name containing `patient`/`subject`/`encounter`/`practitioner`,
///    or a value containing `/` → Reference
/// 3. a name containing `date`/`time`, a `YYYY-MM-DD`-shaped value, or a
///    value with a comparison prefix → Date
/// 4. everything else → String
#[must_use]
pub fn infer_type(name: &str, value: &str) -> SearchParameterType {
    let name_lower = name.to_ascii_lowercase();

    if name == "_id"
        || contains_any(&name_lower, &["identifier", "status", "code", "gender", "active"])
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("false")
    {
        return SearchParameterType::Token;
    }

    if contains_any(
        &name_lower,
        &["patient", "subject", "encounter", "practitioner"],
    ) || value.contains('/')
    {
        return SearchParameterType::Reference;
    }

    if contains_any(&name_lower, &["date", "time"])
        || DATE_SHAPE.is_match(value)
        || has_comparison_prefix(value)
    {
        return SearchParameterType::Date;
    }

    SearchParameterType::String
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
