//! Per-search connection acquisition with aborted-transaction recovery.
//!
//! A pooled connection can come back in an aborted transaction state if a
//! previous user of the same physical connection failed mid-transaction.
//! In that state every statement fails with SQLSTATE 25P02 until the
//! transaction is rolled back or the connection is replaced, which would
//! make an otherwise valid search fail or, worse, appear to match nothing.
//!
//! [`GuardedConnection::acquire`] probes the pooled connection once and, on
//! a 25P02 probe failure, closes the poisoned connection and opens a single
//! fresh connection scoped to the current search. The fresh connection must
//! be closed via [`GuardedConnection::release`] on every exit path; dropping
//! the guard also closes it (sqlx closes dropped connections in the
//! background), so an early `?` return cannot leak it.

use sqlx_core::connection::Connection;
use sqlx_core::pool::PoolConnection;
use sqlx_postgres::{PgConnection, PgPool, Postgres};
use tracing::{debug, warn};

use crate::error::{PostgresError, Result};
use crate::pool::probe_connection;

/// A database connection checked out for the duration of one search.
#[derive(Debug)]
pub enum GuardedConnection {
    /// A healthy pooled connection; returns to the pool on drop.
    Pooled(PoolConnection<Postgres>),
    /// A fresh connection opened because the pooled one was poisoned;
    /// closed explicitly by [`GuardedConnection::release`].
    Fresh(PgConnection),
}

impl GuardedConnection {
    /// Acquires a connection from the pool and verifies it is usable.
    ///
    /// If the probe fails with the aborted-transaction state, the poisoned
    /// connection is closed and exactly one fresh connection is opened in
    /// its place. Any other probe or acquisition failure is returned as-is.
    pub async fn acquire(pool: &PgPool) -> Result<Self> {
        let mut conn = pool.acquire().await?;

        match probe_connection(&mut conn).await {
            Ok(()) => Ok(Self::Pooled(conn)),
            Err(err) if err.is_aborted_transaction() => {
                warn!(
                    "pooled connection is in an aborted transaction state; \
                     replacing it with a search-scoped connection"
                );
                let poisoned = conn.detach();
                if let Err(close_err) = poisoned.close().await {
                    debug!(error = %close_err, "closing poisoned connection failed");
                }
                let options = pool.connect_options();
                let fresh = PgConnection::connect_with(&options).await?;
                Ok(Self::Fresh(fresh))
            }
            Err(err) => Err(err),
        }
    }

    /// Returns the underlying connection for query execution.
    pub fn connection(&mut self) -> &mut PgConnection {
        match self {
            Self::Pooled(conn) => &mut **conn,
            Self::Fresh(conn) => conn,
        }
    }

    /// Returns `true` if this guard replaced a poisoned pooled connection.
    #[must_use]
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    /// Releases the connection.
    ///
    /// A pooled connection goes back to the pool; a fresh connection is
    /// closed. Call this on both the success and the failure path.
    pub async fn release(self) -> Result<()> {
        match self {
            Self::Pooled(conn) => {
                drop(conn);
                Ok(())
            }
            Self::Fresh(conn) => {
                conn.close().await.map_err(PostgresError::from)?;
                debug!("search-scoped connection closed");
                Ok(())
            }
        }
    }

}

// Tests for the acquire/replace path need a live PostgreSQL with a
// deliberately poisoned connection and live as integration tests; the
// SQLSTATE classification itself is covered in `error.rs`.
