//! PostgreSQL plumbing for the OxiFHIR search backend.
//!
//! This crate owns everything Postgres-specific that the search engine relies
//! on but that is not search logic itself:
//!
//! - [`config`]: connection configuration
//! - [`error`]: error types and SQLSTATE classification, including detection
//!   of the aborted-transaction connection state (`25P02`)
//! - [`pool`]: connection pool management
//! - [`guard`]: per-search connection acquisition with aborted-transaction
//!   recovery
//! - [`schema`]: table-per-resource schema and search index management

mod config;
mod error;
mod guard;
mod pool;
mod schema;

pub use config::PostgresConfig;
pub use error::{
    PG_ABORTED_TRANSACTION, PG_UNDEFINED_TABLE, PostgresError, Result, has_pg_error_code,
    is_aborted_transaction, is_undefined_table,
};
pub use guard::GuardedConnection;
pub use pool::{create_pool, probe_connection};
pub use schema::{SchemaManager, SearchIndexSpec};
