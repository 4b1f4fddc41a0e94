//! Reference search: substring match over the stored reference string.
//!
//! References are stored as `"Type/id"`; a substring match lets callers
//! search with either the bare id or the fully qualified form.

use crate::sql_builder::SqlBuilder;

/// Builds a reference condition for one accessor.
pub fn reference_condition(builder: &mut SqlBuilder, accessor: &str, value: &str) -> String {
    let p = builder.add_text_param(format!("%{value}%"));
    format!("{accessor} LIKE ${p}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_builder::SqlParam;

    #[test]
    fn test_reference_condition_tolerates_both_forms() {
        let mut builder = SqlBuilder::new();
        let condition =
            reference_condition(&mut builder, "resource->'subject'->>'reference'", "123");

        assert_eq!(condition, "resource->'subject'->>'reference' LIKE $1");
        // "%123%" matches both "123" and "Patient/123"
        assert_eq!(builder.params(), &[SqlParam::Text("%123%".to_string())]);
    }

    #[test]
    fn test_qualified_reference_value() {
        let mut builder = SqlBuilder::new();
        reference_condition(
            &mut builder,
            "resource->'subject'->>'reference'",
            "Patient/123",
        );
        assert_eq!(
            builder.params(),
            &[SqlParam::Text("%Patient/123%".to_string())]
        );
    }
}
