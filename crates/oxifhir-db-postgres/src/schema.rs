//! Schema management for the PostgreSQL backend.
//!
//! Uses a table-per-resource pattern: each FHIR resource type gets its own
//! table holding the current version of every resource as a JSONB document.
//! History tables and versioning triggers belong to the CRUD service that
//! owns persistence; this crate only creates what search reads.

use std::sync::Arc;

use dashmap::DashSet;
use sqlx_core::row::Row;
use sqlx_postgres::PgPool;
use tracing::{debug, info, instrument};

use crate::error::{PostgresError, Result};

/// A functional search index over an extracted JSONB expression.
///
/// The `expression` must be the exact accessor text that queries will use;
/// PostgreSQL only routes a predicate to an expression index when the two
/// match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndexSpec {
    /// Index name suffix; the full name is `idx_{table}_{name}`.
    pub name: String,
    /// JSONB accessor expression, e.g. `resource->>'birthDate'`.
    pub expression: String,
}

impl SearchIndexSpec {
    pub fn new(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }
}

/// Manages the database schema for FHIR resource tables.
///
/// # Table structure
///
/// For each resource type (e.g. "Patient") the manager creates:
/// - a current-version table (`patient`) with `id`, `txid`, `ts`, `resource`
/// - a GIN index on `resource` for containment predicates
/// - one expression index per registered [`SearchIndexSpec`]
#[derive(Debug, Clone)]
pub struct SchemaManager {
    pool: PgPool,
    schema: String,
    /// Cache of tables that have been verified to exist.
    created_tables: Arc<DashSet<String>>,
}

impl SchemaManager {
    /// Creates a new `SchemaManager` with the given connection pool.
    #[must_use]
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
            created_tables: Arc::new(DashSet::new()),
        }
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Converts a FHIR resource type to a table name.
    ///
    /// Table names are always lowercase to avoid case-sensitivity issues
    /// in PostgreSQL.
    #[must_use]
    pub fn table_name(resource_type: &str) -> String {
        resource_type.to_lowercase()
    }

    /// Ensures the table and search indexes exist for a resource type.
    ///
    /// Idempotent: results are cached in memory and all DDL uses
    /// `IF NOT EXISTS`.
    #[instrument(skip(self, indexes), fields(resource_type = %resource_type))]
    pub async fn ensure_table(
        &self,
        resource_type: &str,
        indexes: &[SearchIndexSpec],
    ) -> Result<()> {
        let table = Self::table_name(resource_type);
        validate_identifier(&table)?;
        validate_identifier(&self.schema)?;

        if self.created_tables.contains(&table) {
            debug!("Table {} found in cache", table);
            return Ok(());
        }

        if self.table_exists(&table).await? {
            debug!("Table {} exists in database, adding to cache", table);
        } else {
            info!("Creating schema for resource type: {}", resource_type);
            self.create_resource_table(&table).await?;
        }

        self.create_search_indexes(&table, indexes).await?;
        self.created_tables.insert(table);
        Ok(())
    }

    async fn table_exists(&self, table: &str) -> Result<bool> {
        let row = sqlx_core::query::query(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = $1 AND table_name = $2
            ) AS present",
        )
        .bind(&self.schema)
        .bind(table)
        .fetch_one(&self.pool)
        .await?;

        row.try_get::<bool, _>("present")
            .map_err(PostgresError::from)
    }

    async fn create_resource_table(&self, table: &str) -> Result<()> {
        let schema = &self.schema;
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{schema}\".\"{table}\" (
                id text PRIMARY KEY,
                txid bigint NOT NULL DEFAULT 0,
                ts timestamptz NOT NULL DEFAULT now(),
                resource jsonb NOT NULL
            )"
        );
        sqlx_core::query::query(&ddl).execute(&self.pool).await?;

        let gin = format!(
            "CREATE INDEX IF NOT EXISTS \"idx_{table}_resource_gin\" \
             ON \"{schema}\".\"{table}\" USING gin (resource)"
        );
        sqlx_core::query::query(&gin).execute(&self.pool).await?;

        Ok(())
    }

    /// Creates the expression indexes backing the functional index registry.
    async fn create_search_indexes(&self, table: &str, indexes: &[SearchIndexSpec]) -> Result<()> {
        let schema = &self.schema;
        for spec in indexes {
            validate_identifier(&spec.name)?;
            let ddl = format!(
                "CREATE INDEX IF NOT EXISTS \"idx_{table}_{name}\" \
                 ON \"{schema}\".\"{table}\" (({expr}))",
                name = spec.name,
                expr = spec.expression,
            );
            sqlx_core::query::query(&ddl).execute(&self.pool).await?;
            debug!(index = %spec.name, table = %table, "Search index ensured");
        }
        Ok(())
    }
}

/// Validates a table, schema, or index identifier.
///
/// Only allows lowercase alphanumeric characters and underscores.
fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PostgresError::schema("empty identifier"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(PostgresError::schema(format!(
            "invalid identifier: {name}"
        )));
    }
    Ok(())
}
