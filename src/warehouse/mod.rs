//! Warehouse backend abstraction
//!
//! This module provides the connection seam the merge runs against:
//! - Redshift: the production warehouse, reached over the PostgreSQL protocol
//! - DuckDB: embedded warehouse for local runs and tests
//!
//! One `Warehouse` value is one session. Temporary tables and the open
//! transaction belong to it and disappear when it is closed or dropped.

use async_trait::async_trait;

use crate::models::{LoadErrorDetail, LoadErrorScope, Record};
use crate::partition::ArtifactLocator;

// Re-export implementations based on features
#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "redshift-backend")]
pub mod redshift;

pub mod schema;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::{DuckDBConnector, DuckDBWarehouse};

#[cfg(feature = "redshift-backend")]
pub use self::redshift::{RedshiftConnector, RedshiftWarehouse};

pub use schema::{ColumnSpec, ColumnType, Dialect, TableSchema};

/// Error type for warehouse operations
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    /// Failed to connect to the warehouse
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Statement execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Bulk load rejected the artifact
    #[error("Load of {artifact} rejected: {message}")]
    LoadRejected { artifact: String, message: String },

    /// BEGIN/COMMIT/ROLLBACK failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

/// One open warehouse session
///
/// Statements run in the order issued. `begin`/`commit`/`rollback` default
/// to the plain SQL statements, which both supported engines accept.
#[async_trait(?Send)]
pub trait Warehouse {
    /// SQL dialect for DDL rendering
    fn dialect(&self) -> Dialect;

    /// Execute one statement and return the number of rows it affected
    async fn execute(&self, sql: &str) -> WarehouseResult<u64>;

    async fn begin(&self) -> WarehouseResult<()> {
        self.execute("BEGIN")
            .await
            .map(|_| ())
            .map_err(|e| WarehouseError::TransactionFailed(format!("BEGIN: {}", e)))
    }

    async fn commit(&self) -> WarehouseResult<()> {
        self.execute("COMMIT")
            .await
            .map(|_| ())
            .map_err(|e| WarehouseError::TransactionFailed(format!("COMMIT: {}", e)))
    }

    async fn rollback(&self) -> WarehouseResult<()> {
        self.execute("ROLLBACK")
            .await
            .map(|_| ())
            .map_err(|e| WarehouseError::TransactionFailed(format!("ROLLBACK: {}", e)))
    }

    /// Bulk-copy an artifact from object storage into `staging`
    ///
    /// Comma-delimited, one header row skipped, fields mapped positionally.
    /// Any bad row fails the whole statement; rejected rows are recorded in
    /// the load-error catalog regardless. A partition carrying one key more
    /// than once is rejected too.
    ///
    /// # Arguments
    /// * `staging` - Staging table name
    /// * `artifact` - Object-storage location of the partition file
    /// * `access_role` - Delegated role the warehouse assumes to read it
    ///
    /// # Returns
    /// Number of rows loaded
    async fn load_from_storage(
        &self,
        staging: &str,
        artifact: &ArtifactLocator,
        access_role: &str,
    ) -> WarehouseResult<u64>;

    /// Read the load-error catalog
    async fn load_errors(
        &self,
        scope: LoadErrorScope,
        limit: usize,
    ) -> WarehouseResult<Vec<LoadErrorDetail>>;

    /// Read rows of a record table ordered by key
    async fn fetch_records(
        &self,
        table: &TableSchema,
        limit: Option<usize>,
    ) -> WarehouseResult<Vec<Record>>;

    /// Close the session, discarding its temporary tables
    async fn close(self) -> WarehouseResult<()>;
}

/// Opens warehouse sessions
#[async_trait(?Send)]
pub trait WarehouseConnector {
    type Warehouse: Warehouse;

    /// Open a new session
    async fn connect(&self) -> WarehouseResult<Self::Warehouse>;

    /// Human-readable target, with secrets masked
    fn describe(&self) -> String;
}
