//! SQL building blocks: the document-accessor compiler and the bound
//! parameter accumulator.
//!
//! All user input flows through numbered bind parameters; the only strings
//! interpolated into SQL are validated path segments and accessor
//! expressions from the functional index registry.

use thiserror::Error;

/// Errors that can occur while compiling paths or assembling conditions.
#[derive(Debug, Error)]
pub enum SqlBuilderError {
    #[error("Invalid JSON path: {0}")]
    InvalidPath(String),

    #[error("Unsupported path expression: {0}")]
    UnsupportedPath(String),

    #[error("Invalid search value: {0}")]
    InvalidSearchValue(String),
}

/// One navigation step of a compiled accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
enum PathStep {
    Field(String),
    Index(usize),
}

/// Compiles a dotted/bracket path into a JSONB accessor expression.
///
/// - `[*]` navigates to the first array element
/// - `[n]` navigates to the literal index `n`
/// - interior steps use `->`, the terminal step uses `->>` when `as_text`
///
/// Filter expressions (`[?(...)]`) are not compilable; paths that need them
/// must be pre-resolved to plain paths in the override or standard tables.
///
/// Compilation is deterministic: the same path always yields the same
/// accessor expression.
pub fn compile_accessor(
    resource_col: &str,
    path: &str,
    as_text: bool,
) -> Result<String, SqlBuilderError> {
    if path.contains("[?") {
        return Err(SqlBuilderError::UnsupportedPath(format!(
            "filter expressions must be pre-resolved via path tables: {path}"
        )));
    }
    if path.is_empty() {
        return Err(SqlBuilderError::InvalidPath("empty path".to_string()));
    }

    let normalized = path.replace("[*]", "[0]");

    let mut steps = Vec::new();
    for segment in normalized.split('.') {
        push_segment_steps(&mut steps, segment, path)?;
    }

    let mut accessor = resource_col.to_string();
    let last = steps.len() - 1;
    for (i, step) in steps.iter().enumerate() {
        let arrow = if i == last && as_text { "->>" } else { "->" };
        match step {
            PathStep::Field(name) => accessor.push_str(&format!("{arrow}'{name}'")),
            PathStep::Index(idx) => accessor.push_str(&format!("{arrow}{idx}")),
        }
    }

    Ok(accessor)
}

fn push_segment_steps(
    steps: &mut Vec<PathStep>,
    segment: &str,
    original: &str,
) -> Result<(), SqlBuilderError> {
    let (name, index) = match segment.split_once('[') {
        Some((name, rest)) => {
            let digits = rest.strip_suffix(']').ok_or_else(|| {
                SqlBuilderError::InvalidPath(format!("unterminated index in {original}"))
            })?;
            let index: usize = digits.parse().map_err(|_| {
                SqlBuilderError::InvalidPath(format!("non-numeric index in {original}"))
            })?;
            (name, Some(index))
        }
        None => (segment, None),
    };

    if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(SqlBuilderError::InvalidPath(format!(
            "invalid segment {segment:?} in {original}"
        )));
    }

    steps.push(PathStep::Field(name.to_string()));
    if let Some(idx) = index {
        steps.push(PathStep::Index(idx));
    }
    Ok(())
}

/// A SQL parameter value with its type information.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Text(String),
    Integer(i64),
    Float(f64),
    Json(String),
    Timestamp(String),
}

impl SqlParam {
    /// Get the value as a string for display/debugging.
    #[must_use]
    pub fn as_display_str(&self) -> String {
        match self {
            Self::Text(s) | Self::Json(s) | Self::Timestamp(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
        }
    }
}

/// Accumulates WHERE conditions and their bound parameters.
///
/// Conditions joined with AND; each added parameter gets the next `$n`
/// placeholder, so predicates over multiple candidate paths can never
/// collide on bind numbers within one query.
#[derive(Debug, Default)]
pub struct SqlBuilder {
    conditions: Vec<String>,
    params: Vec<SqlParam>,
    resource_col: String,
}

impl SqlBuilder {
    /// Creates a new builder with the default resource column name.
    #[must_use]
    pub fn new() -> Self {
        Self::with_resource_column("resource")
    }

    /// Creates a new builder with a custom resource column name.
    #[must_use]
    pub fn with_resource_column(column: impl Into<String>) -> Self {
        Self {
            conditions: Vec::new(),
            params: Vec::new(),
            resource_col: column.into(),
        }
    }

    /// The resource column conditions are built against.
    #[must_use]
    pub fn resource_column(&self) -> &str {
        &self.resource_col
    }

    /// Adds a complete SQL condition (AND semantics).
    pub fn add_condition(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }

    /// Adds a text parameter and returns its placeholder number.
    pub fn add_text_param(&mut self, value: impl Into<String>) -> usize {
        self.params.push(SqlParam::Text(value.into()));
        self.params.len()
    }

    /// Adds a JSON parameter and returns its placeholder number.
    pub fn add_json_param(&mut self, value: impl Into<String>) -> usize {
        self.params.push(SqlParam::Json(value.into()));
        self.params.len()
    }

    /// Adds a float parameter and returns its placeholder number.
    pub fn add_float_param(&mut self, value: f64) -> usize {
        self.params.push(SqlParam::Float(value));
        self.params.len()
    }

    /// Adds a timestamp parameter and returns its placeholder number.
    pub fn add_timestamp_param(&mut self, value: impl Into<String>) -> usize {
        self.params.push(SqlParam::Timestamp(value.into()));
        self.params.len()
    }

    /// Current parameter count.
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// Current condition count.
    #[must_use]
    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    /// All accumulated parameters.
    #[must_use]
    pub fn params(&self) -> &[SqlParam] {
        &self.params
    }

    /// Consumes the builder, returning parameters for binding.
    #[must_use]
    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }

    /// Builds the final WHERE clause by joining conditions with AND.
    ///
    /// Returns `None` if there are no conditions.
    #[must_use]
    pub fn build_where_clause(&self) -> Option<String> {
        if self.conditions.is_empty() {
            return None;
        }
        Some(self.conditions.join(" AND "))
    }

    /// Joins condition fragments with OR, parenthesized when needed.
    ///
    /// Used for the fallback path where one parameter resolves to several
    /// candidate document paths.
    #[must_use]
    pub fn build_or_clause(conditions: &[String]) -> String {
        if conditions.len() == 1 {
            conditions[0].clone()
        } else {
            format!("({})", conditions.join(" OR "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_simple_field() {
        let accessor = compile_accessor("resource", "birthDate", true).unwrap();
        assert_eq!(accessor, "resource->>'birthDate'");

        let accessor = compile_accessor("resource", "birthDate", false).unwrap();
        assert_eq!(accessor, "resource->'birthDate'");
    }

    #[test]
    fn test_compile_nested_path() {
        let accessor = compile_accessor("resource", "subject.reference", true).unwrap();
        assert_eq!(accessor, "resource->'subject'->>'reference'");
    }

    #[test]
    fn test_compile_wildcard_is_first_element() {
        let accessor = compile_accessor("resource", "name[*].family", true).unwrap();
        assert_eq!(accessor, "resource->'name'->0->>'family'");
    }

    #[test]
    fn test_compile_literal_index() {
        let accessor = compile_accessor("resource", "category[*].coding[0].code", true).unwrap();
        assert_eq!(
            accessor,
            "resource->'category'->0->'coding'->0->>'code'"
        );
    }

    #[test]
    fn test_compile_trailing_index_extracts_text() {
        let accessor = compile_accessor("resource", "name[*].given[0]", true).unwrap();
        assert_eq!(accessor, "resource->'name'->0->'given'->>0");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = compile_accessor("resource", "name[*].family", true).unwrap();
        let b = compile_accessor("resource", "name[*].family", true).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_filter_expressions_rejected() {
        let err = compile_accessor("resource", "telecom[?(@.system==\"phone\")].value", true)
            .unwrap_err();
        assert!(matches!(err, SqlBuilderError::UnsupportedPath(_)));
    }

    #[test]
    fn test_malformed_paths_rejected() {
        assert!(compile_accessor("resource", "", true).is_err());
        assert!(compile_accessor("resource", "name[x].family", true).is_err());
        assert!(compile_accessor("resource", "name[0.family", true).is_err());
        assert!(compile_accessor("resource", "na'me", true).is_err());
    }

    #[test]
    fn test_sql_builder_basic() {
        let mut builder = SqlBuilder::new();

        let p1 = builder.add_text_param("%Smith%");
        builder.add_condition(format!(
            "{}->>'family' ILIKE ${}",
            builder.resource_column(),
            p1
        ));

        assert_eq!(builder.param_count(), 1);
        assert_eq!(
            builder.build_where_clause().unwrap(),
            "resource->>'family' ILIKE $1"
        );
    }

    #[test]
    fn test_sql_builder_numbers_params_sequentially() {
        let mut builder = SqlBuilder::new();

        let p1 = builder.add_text_param("a");
        let p2 = builder.add_timestamp_param("2024-01-01");
        let p3 = builder.add_float_param(1.5);

        assert_eq!((p1, p2, p3), (1, 2, 3));
    }

    #[test]
    fn test_sql_builder_empty_where() {
        let builder = SqlBuilder::new();
        assert!(builder.build_where_clause().is_none());
    }

    #[test]
    fn test_or_clause() {
        let single = vec!["a = $1".to_string()];
        assert_eq!(SqlBuilder::build_or_clause(&single), "a = $1");

        let multi = vec!["a = $1".to_string(), "b = $2".to_string()];
        assert_eq!(SqlBuilder::build_or_clause(&multi), "(a = $1 OR b = $2)");
    }
}
