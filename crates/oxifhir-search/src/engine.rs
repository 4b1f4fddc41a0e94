//! The search pipeline: per-parameter resolution, predicate accumulation,
//! guarded execution, and Bundle assembly.
//!
//! Parameter application is an explicit fold over the caller-ordered
//! parameter map: non-fatal errors skip the parameter and continue, the
//! aborted-transaction state aborts the whole search. The fold produces a
//! [`SearchPlan`] — a fully parameterized page query plus count query —
//! which keeps the translation logic testable without a database.

use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use serde_json::Value;
use sqlx_core::query::Query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgArguments, PgPool, Postgres};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use oxifhir_core::{Bundle, BundleEntry, BundleLink};
use oxifhir_db_postgres::{
    GuardedConnection, PostgresError, SchemaManager, SearchIndexSpec, is_aborted_transaction,
};

use crate::classifier;
use crate::parser;
use crate::registry::{FunctionalIndexRegistry, SearchPathRegistry};
use crate::resolver;
use crate::sql_builder::{SqlBuilder, SqlBuilderError, SqlParam, compile_accessor};
use crate::types;

/// Configuration for the search engine.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Page size when `_count` is absent or unparseable.
    pub default_count: usize,
    /// Upper bound applied to `_count`.
    pub max_count: usize,
    /// Schema holding the resource tables.
    pub schema: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_count: 20,
            max_count: 100,
            schema: "public".to_string(),
        }
    }
}

/// Errors produced by the search pipeline.
#[derive(Debug, Error)]
pub enum SearchError {
    /// The resource type is not a usable table name.
    #[error("invalid resource type name: {0}")]
    InvalidResourceType(String),

    /// No usable mapping could be produced for a parameter.
    /// Recovered locally: the parameter is skipped.
    #[error("no usable mapping for parameter {param}")]
    UnresolvedParameter { param: String },

    /// A predicate could not be built or applied for a non-connection
    /// reason. Recovered locally: the parameter is skipped.
    #[error("failed to apply parameter {param}: {source}")]
    PredicateApplication {
        param: String,
        #[source]
        source: SqlBuilderError,
    },

    /// The connection is in an aborted transaction state. Never recovered
    /// silently: one reconnect at acquisition time, fatal anywhere later.
    #[error("connection is in an aborted transaction state: {source}")]
    AbortedTransaction {
        #[source]
        source: PostgresError,
    },

    /// Connection acquisition failed (after the guard's single reconnect).
    #[error("failed to acquire a database connection: {source}")]
    Acquisition {
        #[source]
        source: PostgresError,
    },

    /// Query execution failed.
    #[error("search execution failed after {applied} applied parameters in {elapsed_ms} ms: {source}")]
    Execution {
        applied: usize,
        elapsed_ms: u128,
        #[source]
        source: PostgresError,
    },

    /// Schema preparation failed.
    #[error("schema preparation failed: {source}")]
    Schema {
        #[source]
        source: PostgresError,
    },
}

impl SearchError {
    /// Returns `true` if this error must abort the whole search rather
    /// than skip a single parameter.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::UnresolvedParameter { .. } | Self::PredicateApplication { .. }
        )
    }
}

/// Result of folding the parameter map into predicates.
#[derive(Debug, Default)]
pub struct FoldOutcome {
    /// Parameters that contributed a predicate.
    pub applied: usize,
    /// Parameters dropped after a non-fatal error.
    pub skipped: Vec<String>,
}

/// Folds parameters into predicates with early exit on fatal errors.
///
/// The applier returns `Ok(true)` when the parameter contributed a
/// predicate, `Ok(false)` for control parameters, and an error otherwise.
/// Non-fatal errors are logged and skipped; a fatal error aborts the fold.
pub fn fold_parameters<'a, I, F>(params: I, mut apply: F) -> Result<FoldOutcome, SearchError>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
    F: FnMut(&str, &str) -> Result<bool, SearchError>,
{
    let mut outcome = FoldOutcome::default();
    for (name, value) in params {
        match apply(name, value) {
            Ok(true) => outcome.applied += 1,
            Ok(false) => {}
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                warn!(param = %name, error = %err, "skipping search parameter");
                outcome.skipped.push(name.clone());
            }
        }
    }
    Ok(outcome)
}

/// A fully translated search: parameterized SQL plus pagination metadata.
#[derive(Debug, Clone)]
pub struct SearchPlan {
    pub resource_type: String,
    /// Page query: `SELECT resource, id ... LIMIT ... OFFSET ...`
    pub sql: String,
    /// Count query over the same predicate set.
    pub count_sql: String,
    pub params: Vec<SqlParam>,
    pub limit: usize,
    pub offset: usize,
    /// Parameters that contributed predicates; skipped parameters leave
    /// this short of the request's parameter count.
    pub applied: usize,
    pub skipped: Vec<String>,
    pub self_link: String,
}

/// The search parameter resolution and query translation engine.
///
/// Holds the process-wide, read-only registries; each `search` call builds
/// and executes one plan and shares no mutable state with other calls.
pub struct SearchEngine {
    paths: Arc<SearchPathRegistry>,
    indexes: Arc<FunctionalIndexRegistry>,
    config: SearchConfig,
}

impl SearchEngine {
    /// Creates an engine with the built-in registries.
    #[must_use]
    pub fn new(config: SearchConfig) -> Self {
        Self {
            paths: Arc::new(SearchPathRegistry::with_defaults()),
            indexes: Arc::new(FunctionalIndexRegistry::with_defaults()),
            config,
        }
    }

    /// Creates an engine with caller-provided registries.
    #[must_use]
    pub fn with_registries(
        config: SearchConfig,
        paths: Arc<SearchPathRegistry>,
        indexes: Arc<FunctionalIndexRegistry>,
    ) -> Self {
        Self {
            paths,
            indexes,
            config,
        }
    }

    /// The engine's functional index registry.
    #[must_use]
    pub fn index_registry(&self) -> &FunctionalIndexRegistry {
        &self.indexes
    }

    /// Ensures the table and the expression indexes backing the functional
    /// index registry exist for a resource type.
    pub async fn ensure_resource_schema(
        &self,
        schema: &SchemaManager,
        resource_type: &str,
    ) -> Result<(), SearchError> {
        let specs: Vec<SearchIndexSpec> = self
            .indexes
            .index_definitions(resource_type)
            .into_iter()
            .map(|(name, expr)| SearchIndexSpec::new(name, expr))
            .collect();

        schema
            .ensure_table(resource_type, &specs)
            .await
            .map_err(|source| SearchError::Schema { source })
    }

    /// Translates a raw parameter map into a [`SearchPlan`].
    ///
    /// Pagination comes from `_count`/`_offset`; all other `_`-prefixed
    /// keys are control parameters and are skipped. Parameters that fail
    /// non-fatally are dropped, never the whole request.
    pub fn plan(
        &self,
        resource_type: &str,
        params: &IndexMap<String, String>,
    ) -> Result<SearchPlan, SearchError> {
        validate_resource_type(resource_type)?;

        let (limit, offset) = self.pagination(params);

        let mut builder = SqlBuilder::new();
        let outcome = fold_parameters(params.iter(), |name, value| {
            if name.starts_with('_') {
                return Ok(false);
            }
            self.apply_parameter(&mut builder, resource_type, name, value)
                .map(|()| true)
        })?;

        let table = resource_type.to_lowercase();
        let from = format!("\"{}\".\"{}\"", self.config.schema, table);
        let mut sql = format!("SELECT resource, id FROM {from}");
        let mut count_sql = format!("SELECT COUNT(*) AS total FROM {from}");

        if let Some(where_clause) = builder.build_where_clause() {
            sql.push_str(" WHERE ");
            sql.push_str(&where_clause);
            count_sql.push_str(" WHERE ");
            count_sql.push_str(&where_clause);
        }
        sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}"));

        Ok(SearchPlan {
            resource_type: resource_type.to_string(),
            sql,
            count_sql,
            params: builder.into_params(),
            limit,
            offset,
            applied: outcome.applied,
            skipped: outcome.skipped,
            self_link: self_link(resource_type, params),
        })
    }

    /// Runs a search and assembles the `searchset` Bundle.
    #[instrument(skip(self, pool, params), fields(resource_type = %resource_type))]
    pub async fn search(
        &self,
        pool: &PgPool,
        resource_type: &str,
        params: &IndexMap<String, String>,
    ) -> Result<Bundle, SearchError> {
        let plan = self.plan(resource_type, params)?;
        let started = Instant::now();

        let mut guard = GuardedConnection::acquire(pool)
            .await
            .map_err(|source| SearchError::Acquisition { source })?;

        // Release must happen on both paths before the error propagates.
        let result = execute_plan(&mut guard, &plan, started).await;
        if let Err(release_err) = guard.release().await {
            warn!(error = %release_err, "failed to release search connection");
        }
        let (resources, total) = result?;

        debug!(
            total,
            page = resources.len(),
            applied = plan.applied,
            skipped = plan.skipped.len(),
            "search completed"
        );

        let entries = resources.into_iter().map(BundleEntry::matched).collect();
        Ok(Bundle::searchset(
            total,
            entries,
            vec![BundleLink::self_link(plan.self_link.clone())],
        ))
    }

    /// Applies one search parameter to the accumulating builder.
    fn apply_parameter(
        &self,
        builder: &mut SqlBuilder,
        resource_type: &str,
        name: &str,
        value: &str,
    ) -> Result<(), SearchError> {
        // identifier search always uses containment semantics and bypasses
        // path resolution and the index registry
        if name == "identifier" {
            let accessor = format!("{}->'identifier'", builder.resource_column());
            let condition = types::identifier_condition(builder, &accessor, value)
                .map_err(|source| SearchError::PredicateApplication {
                    param: name.to_string(),
                    source,
                })?;
            builder.add_condition(condition);
            debug!(param = name, "applied identifier containment search");
            return Ok(());
        }

        let param_type = classifier::infer_type(name, value);
        let (prefix, clean_value) = parser::split_prefix(value);

        let paths = resolver::resolve(&self.paths, resource_type, name, param_type);
        let Some(first_path) = paths.first() else {
            return Err(SearchError::UnresolvedParameter {
                param: name.to_string(),
            });
        };

        let accessors = match self.indexes.lookup(resource_type, first_path) {
            Some(indexed) => {
                debug!(param = name, path = %first_path, "using functional index accessor");
                vec![indexed]
            }
            None => paths
                .iter()
                .map(|path| compile_accessor(builder.resource_column(), path, true))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|source| SearchError::PredicateApplication {
                    param: name.to_string(),
                    source,
                })?,
        };

        types::build_parameter_condition(builder, &accessors, param_type, prefix, clean_value)
            .map_err(|source| SearchError::PredicateApplication {
                param: name.to_string(),
                source,
            })
    }

    fn pagination(&self, params: &IndexMap<String, String>) -> (usize, usize) {
        let limit = params
            .get("_count")
            .and_then(|v| v.parse::<usize>().ok())
            .map_or(self.config.default_count, |count| {
                count.clamp(1, self.config.max_count)
            });
        let offset = params
            .get("_offset")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        (limit, offset)
    }
}

/// Rebuilds the request's query string for the Bundle self link.
fn self_link(resource_type: &str, params: &IndexMap<String, String>) -> String {
    if params.is_empty() {
        return resource_type.to_string();
    }
    let query_string = params
        .iter()
        .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    format!("{resource_type}?{query_string}")
}

fn validate_resource_type(resource_type: &str) -> Result<(), SearchError> {
    if resource_type.is_empty() || !resource_type.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SearchError::InvalidResourceType(resource_type.to_string()));
    }
    Ok(())
}

async fn execute_plan(
    guard: &mut GuardedConnection,
    plan: &SearchPlan,
    started: Instant,
) -> Result<(Vec<Value>, u64), SearchError> {
    let conn = guard.connection();

    let mut page_query = sqlx_core::query::query(&plan.sql);
    for param in &plan.params {
        page_query = bind_param(page_query, param);
    }
    let rows = page_query
        .fetch_all(&mut *conn)
        .await
        .map_err(|err| classify_execution_error(plan.applied, started, err))?;

    let mut count_query = sqlx_core::query::query(&plan.count_sql);
    for param in &plan.params {
        count_query = bind_param(count_query, param);
    }
    let count_row = count_query
        .fetch_one(&mut *conn)
        .await
        .map_err(|err| classify_execution_error(plan.applied, started, err))?;
    let total: i64 = count_row
        .try_get("total")
        .map_err(|err| classify_execution_error(plan.applied, started, err))?;

    let mut resources = Vec::with_capacity(rows.len());
    for row in &rows {
        let resource: Value = row
            .try_get("resource")
            .map_err(|err| classify_execution_error(plan.applied, started, err))?;
        resources.push(resource);
    }

    Ok((resources, u64::try_from(total).unwrap_or(0)))
}

fn bind_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q SqlParam,
) -> Query<'q, Postgres, PgArguments> {
    match param {
        SqlParam::Text(s) | SqlParam::Json(s) | SqlParam::Timestamp(s) => query.bind(s.as_str()),
        SqlParam::Integer(i) => query.bind(*i),
        SqlParam::Float(f) => query.bind(*f),
    }
}

fn classify_execution_error(
    applied: usize,
    started: Instant,
    err: sqlx_core::error::Error,
) -> SearchError {
    if is_aborted_transaction(&err) {
        SearchError::AbortedTransaction {
            source: PostgresError::from(err),
        }
    } else {
        SearchError::Execution {
            applied,
            elapsed_ms: started.elapsed().as_millis(),
            source: PostgresError::from(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_params(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn engine() -> SearchEngine {
        SearchEngine::new(SearchConfig::default())
    }

    #[test]
    fn plan_family_search_uses_compiled_accessor_and_pagination() {
        let plan = engine()
            .plan(
                "Patient",
                &make_params(&[("family", "Smith"), ("_count", "5"), ("_offset", "10")]),
            )
            .unwrap();

        assert!(plan.sql.contains("FROM \"public\".\"patient\""));
        assert!(
            plan.sql
                .contains("resource->'name'->0->>'family' ILIKE $1")
        );
        assert!(plan.sql.ends_with("LIMIT 5 OFFSET 10"));
        assert_eq!(plan.params, vec![SqlParam::Text("%Smith%".to_string())]);
        assert_eq!(plan.limit, 5);
        assert_eq!(plan.offset, 10);
        assert_eq!(plan.applied, 1);
        assert_eq!(
            plan.self_link,
            "Patient?family=Smith&_count=5&_offset=10"
        );
    }

    #[test]
    fn plan_observation_date_uses_functional_index() {
        let plan = engine()
            .plan("Observation", &make_params(&[("date", "ge2024-01-01")]))
            .unwrap();

        assert!(
            plan.sql
                .contains("(resource->>'effectiveDateTime')::timestamptz >= $1::timestamptz")
        );
        assert_eq!(
            plan.params,
            vec![SqlParam::Timestamp("2024-01-01".to_string())]
        );
        // the indexed accessor replaces the multi-path fallback entirely
        assert!(!plan.sql.contains("effectivePeriod"));
    }

    #[test]
    fn plan_fallback_matches_same_field_as_index() {
        let config = SearchConfig::default();
        let indexed = SearchEngine::new(config.clone());
        let unindexed = SearchEngine::with_registries(
            config,
            Arc::new(SearchPathRegistry::with_defaults()),
            Arc::new(FunctionalIndexRegistry::new()),
        );
        let params = make_params(&[("date", "ge2024-01-01")]);

        let fast = indexed.plan("Observation", &params).unwrap();
        let slow = unindexed.plan("Observation", &params).unwrap();

        // both target effectiveDateTime with the same operator and value;
        // the fallback additionally ORs the period start path
        assert!(fast.sql.contains("effectiveDateTime"));
        assert!(slow.sql.contains("effectiveDateTime"));
        assert!(slow.sql.contains("effectivePeriod"));
        assert!(fast.sql.contains(">="));
        assert!(slow.sql.contains(">="));
        assert_eq!(fast.params[0], slow.params[0]);
    }

    #[test]
    fn plan_identifier_compound_search() {
        let plan = engine()
            .plan("Patient", &make_params(&[("identifier", "http://sys|MRN-1")]))
            .unwrap();

        assert!(
            plan.sql
                .contains("resource->'identifier' @> $1::jsonb")
        );
        assert_eq!(
            plan.params,
            vec![SqlParam::Json(
                r#"[{"system":"http://sys","value":"MRN-1"}]"#.to_string()
            )]
        );
    }

    #[test]
    fn plan_identifier_value_only() {
        let plan = engine()
            .plan("Patient", &make_params(&[("identifier", "MRN-1")]))
            .unwrap();

        assert_eq!(
            plan.params,
            vec![SqlParam::Json(r#"[{"value":"MRN-1"}]"#.to_string())]
        );
    }

    #[test]
    fn plan_skips_malformed_parameter_and_keeps_the_rest() {
        let plan = engine()
            .plan(
                "Patient",
                &make_params(&[("family", "Smith"), ("recorded-date", "geNOTADATE")]),
            )
            .unwrap();

        assert_eq!(plan.applied, 1);
        assert_eq!(plan.skipped, vec!["recorded-date".to_string()]);
        assert_eq!(plan.params.len(), 1);
        assert!(plan.sql.contains("ILIKE $1"));
    }

    #[test]
    fn plan_unknown_parameter_derives_a_path() {
        // derivation always yields a path, so unknown names still search
        let plan = engine()
            .plan("Patient", &make_params(&[("foo", "bar")]))
            .unwrap();

        assert_eq!(plan.applied, 1);
        assert!(plan.sql.contains("resource->>'foo' ILIKE $1"));
    }

    #[test]
    fn plan_skips_control_parameters() {
        let plan = engine()
            .plan(
                "Patient",
                &make_params(&[("_sort", "name"), ("_total", "accurate")]),
            )
            .unwrap();

        assert_eq!(plan.applied, 0);
        assert!(plan.params.is_empty());
        assert!(!plan.sql.contains("WHERE"));
    }

    #[test]
    fn plan_defaults_and_clamps_pagination() {
        let e = engine();

        let plan = e.plan("Patient", &make_params(&[])).unwrap();
        assert_eq!(plan.limit, 20);
        assert_eq!(plan.offset, 0);

        let plan = e
            .plan("Patient", &make_params(&[("_count", "9999")]))
            .unwrap();
        assert_eq!(plan.limit, 100);

        let plan = e
            .plan("Patient", &make_params(&[("_count", "0")]))
            .unwrap();
        assert_eq!(plan.limit, 1);

        let plan = e
            .plan("Patient", &make_params(&[("_count", "lots")]))
            .unwrap();
        assert_eq!(plan.limit, 20);
    }

    #[test]
    fn plan_gender_token_uses_indexed_equality() {
        let plan = engine()
            .plan("Patient", &make_params(&[("gender", "female")]))
            .unwrap();

        assert!(plan.sql.contains("resource->>'gender' = $1"));
        assert_eq!(plan.params, vec![SqlParam::Text("female".to_string())]);
    }

    #[test]
    fn plan_subject_reference_search() {
        let plan = engine()
            .plan(
                "Observation",
                &make_params(&[("subject", "Patient/123")]),
            )
            .unwrap();

        assert!(
            plan.sql
                .contains("resource->'subject'->>'reference' LIKE $1")
        );
        assert_eq!(
            plan.params,
            vec![SqlParam::Text("%Patient/123%".to_string())]
        );
    }

    #[test]
    fn plan_rejects_invalid_resource_type() {
        let err = engine()
            .plan("patient; DROP TABLE x", &make_params(&[]))
            .unwrap_err();
        assert!(matches!(err, SearchError::InvalidResourceType(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn fold_continues_past_non_fatal_errors() {
        let params = make_params(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let outcome = fold_parameters(params.iter(), |name, _| {
            if name == "b" {
                Err(SearchError::UnresolvedParameter {
                    param: name.to_string(),
                })
            } else {
                Ok(true)
            }
        })
        .unwrap();

        assert_eq!(outcome.applied, 2);
        assert_eq!(outcome.skipped, vec!["b".to_string()]);
    }

    #[test]
    fn fold_aborts_on_aborted_transaction() {
        let params = make_params(&[("a", "1"), ("b", "2"), ("c", "3")]);
        let mut seen = Vec::new();
        let err = fold_parameters(params.iter(), |name, _| {
            seen.push(name.to_string());
            if name == "b" {
                Err(SearchError::AbortedTransaction {
                    source: PostgresError::pool("simulated poisoned connection"),
                })
            } else {
                Ok(true)
            }
        })
        .unwrap_err();

        assert!(matches!(err, SearchError::AbortedTransaction { .. }));
        assert!(err.is_fatal());
        // early exit: "c" is never visited
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn error_fatality_classification() {
        assert!(
            !SearchError::UnresolvedParameter {
                param: "x".to_string()
            }
            .is_fatal()
        );
        assert!(
            !SearchError::PredicateApplication {
                param: "x".to_string(),
                source: SqlBuilderError::InvalidSearchValue("bad".to_string()),
            }
            .is_fatal()
        );
        assert!(
            SearchError::Execution {
                applied: 1,
                elapsed_ms: 5,
                source: PostgresError::pool("boom"),
            }
            .is_fatal()
        );
        assert!(
            SearchError::Acquisition {
                source: PostgresError::pool("no connections"),
            }
            .is_fatal()
        );
    }

    #[test]
    fn self_link_preserves_parameter_order_and_encodes_values() {
        let link = self_link(
            "Patient",
            &make_params(&[("identifier", "http://sys|1"), ("_count", "5")]),
        );
        assert_eq!(link, "Patient?identifier=http%3A%2F%2Fsys%7C1&_count=5");

        assert_eq!(self_link("Patient", &make_params(&[])), "Patient");
    }

    #[test]
    fn count_query_shares_predicates_with_page_query() {
        let plan = engine()
            .plan("Patient", &make_params(&[("family", "Smith")]))
            .unwrap();

        assert!(plan.count_sql.starts_with("SELECT COUNT(*) AS total"));
        assert!(plan.count_sql.contains("ILIKE $1"));
        assert!(!plan.count_sql.contains("LIMIT"));
    }
}
