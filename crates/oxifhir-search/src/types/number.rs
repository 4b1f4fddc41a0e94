//! Number and quantity search: numeric comparison driven by the prefix.

use crate::parameters::SearchPrefix;
use crate::sql_builder::{SqlBuilder, SqlBuilderError};

/// Builds a numeric comparison condition for one accessor.
///
/// The accessor text is cast to `numeric` and compared with the operator
/// mapped from the prefix; quantities share the same shape.
pub fn number_condition(
    builder: &mut SqlBuilder,
    accessor: &str,
    prefix: SearchPrefix,
    value: &str,
) -> Result<String, SqlBuilderError> {
    let parsed: f64 = value.parse().map_err(|_| {
        SqlBuilderError::InvalidSearchValue(format!("not a numeric value: {value:?}"))
    })?;

    let op = prefix.as_sql_operator();
    let p = builder.add_float_param(parsed);
    Ok(format!("({accessor})::numeric {op} ${p}::numeric"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql_builder::SqlParam;

    #[test]
    fn test_number_condition() {
        let mut builder = SqlBuilder::new();
        let condition = number_condition(
            &mut builder,
            "resource->'valueQuantity'->>'value'",
            SearchPrefix::Gt,
            "100",
        )
        .unwrap();

        assert_eq!(
            condition,
            "(resource->'valueQuantity'->>'value')::numeric > $1::numeric"
        );
        assert_eq!(builder.params(), &[SqlParam::Float(100.0)]);
    }

    #[test]
    fn test_decimal_values() {
        let mut builder = SqlBuilder::new();
        number_condition(
            &mut builder,
            "resource->>'probability'",
            SearchPrefix::Le,
            "0.75",
        )
        .unwrap();
        assert_eq!(builder.params(), &[SqlParam::Float(0.75)]);
    }

    #[test]
    fn test_non_numeric_rejected() {
        let mut builder = SqlBuilder::new();
        let err = number_condition(
            &mut builder,
            "resource->>'probability'",
            SearchPrefix::Eq,
            "many",
        )
        .unwrap_err();
        assert!(matches!(err, SqlBuilderError::InvalidSearchValue(_)));
        assert_eq!(builder.param_count(), 0);
    }
}
