//! DuckDB warehouse backend implementation
//!
//! Provides an embedded warehouse for local runs and tests. Object storage
//! is mirrored by a local directory: the artifact `s3://{bucket}/{key}` is
//! read from `{artifact_root}/{key}`, bulk-loaded with DuckDB's own CSV
//! reader.
//!
//! DuckDB has no load-error system table, so the connector keeps one. Rows
//! the CSV reader rejects are copied into it from the reader's reject
//! tables. It is shared by every session the connector opens and is written
//! outside any transaction, so entries survive a rollback the same way
//! Redshift's `stl_load_errors` rows do.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use super::schema::{
    ColumnType, Dialect, RECORD_TABLE_COLUMNS, TableSchema, duplicate_keys_sql, quote_ident,
    quote_literal, validate_identifier,
};
use super::{Warehouse, WarehouseConnector, WarehouseError, WarehouseResult};
use crate::models::record::{
    ERR_DUPLICATE_KEY, ERR_EXTRA_COLUMNS, ERR_INVALID_BOOLEAN, ERR_INVALID_DIGIT,
    ERR_INVALID_TIMESTAMP, ERR_MALFORMED_ROW, ERR_MISSING_COLUMNS,
};
use crate::models::{LoadErrorDetail, LoadErrorScope, RECORD_COLUMNS, Record, TIMESTAMP_FORMAT};
use crate::partition::ArtifactLocator;

/// Longest raw value kept in the load-error catalog
const RAW_VALUE_LIMIT: usize = 1024;

/// Session temp tables the CSV reader writes rejected lines to
const REJECTS_TABLE: &str = "load_rejects";
const REJECT_SCANS_TABLE: &str = "load_reject_scans";

/// Most duplicate keys reported for one load
const DUPLICATE_REPORT_LIMIT: usize = 100;

/// Offending value inside a DuckDB cast error message
static CAST_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"convert string "(.*)" to '"#).expect("valid cast message regex"));

type LoadErrorCatalog = Arc<Mutex<Vec<LoadErrorDetail>>>;

/// A line or key the loader refused
#[derive(Debug, Clone, PartialEq, Eq)]
struct Rejection {
    line: i64,
    column: String,
    column_type: String,
    value: String,
    code: i32,
    reason: String,
}

impl Rejection {
    /// Translate one row of the CSV reader's reject table
    fn from_reject_row(
        line: i64,
        column: String,
        error_type: &str,
        csv_line: &str,
        message: String,
    ) -> Self {
        let column_type = RECORD_TABLE_COLUMNS
            .iter()
            .find(|c| c.name == column)
            .map(|c| c.column_type);

        let code = match error_type {
            "CAST" => match column_type {
                Some(ColumnType::Integer | ColumnType::Double) => ERR_INVALID_DIGIT,
                Some(ColumnType::Boolean) => ERR_INVALID_BOOLEAN,
                Some(ColumnType::Timestamp) => ERR_INVALID_TIMESTAMP,
                _ => ERR_MALFORMED_ROW,
            },
            "MISSING COLUMNS" => ERR_MISSING_COLUMNS,
            "TOO MANY COLUMNS" => ERR_EXTRA_COLUMNS,
            _ => ERR_MALFORMED_ROW,
        };

        let value = CAST_VALUE
            .captures(&message)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| csv_line.to_string());

        Self {
            line,
            column,
            column_type: column_type
                .map(|t| t.catalog_name().to_string())
                .unwrap_or_default(),
            value,
            code,
            reason: message,
        }
    }

    fn duplicate_key(key: String, count: i64) -> Self {
        Self {
            line: 0,
            column: RECORD_COLUMNS[0].to_string(),
            column_type: ColumnType::Key.catalog_name().to_string(),
            value: key,
            code: ERR_DUPLICATE_KEY,
            reason: format!("Duplicate key, {} rows in partition", count),
        }
    }
}

/// Bulk insert of a local artifact into `staging`
///
/// Bad lines are skipped by the reader and listed in `REJECTS_TABLE`;
/// the caller must fail the load if that table is not empty.
pub fn copy_sql(staging: &str, path: &Path) -> String {
    let columns: Vec<String> = RECORD_TABLE_COLUMNS
        .iter()
        .map(|c| {
            format!(
                "{}: {}",
                quote_literal(c.name),
                quote_literal(c.column_type.sql(Dialect::DuckDB))
            )
        })
        .collect();

    format!(
        "INSERT INTO {} SELECT * FROM read_csv({}, header = true, delim = ',', \
         quote = '\"', escape = '\"', columns = {{{}}}, timestampformat = {}, \
         store_rejects = true, rejects_table = {}, rejects_scan = {})",
        quote_ident(staging),
        quote_literal(&path.display().to_string()),
        columns.join(", "),
        quote_literal(TIMESTAMP_FORMAT),
        quote_literal(REJECTS_TABLE),
        quote_literal(REJECT_SCANS_TABLE)
    )
}

/// Opens sessions against one DuckDB database
pub struct DuckDBConnector {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// Connection every session is cloned from
    base: Mutex<duckdb::Connection>,
    /// Local directory standing in for the bucket
    artifact_root: PathBuf,
    catalog: LoadErrorCatalog,
    next_session: AtomicI64,
}

impl DuckDBConnector {
    /// Open (or create) a file-based database
    ///
    /// # Arguments
    /// * `db_path` - Path to the DuckDB database file
    /// * `artifact_root` - Directory holding partition artifacts
    pub fn open(db_path: impl AsRef<Path>, artifact_root: impl Into<PathBuf>) -> WarehouseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self::from_connection(Some(path), connection, artifact_root.into()))
    }

    /// Create an in-memory database
    ///
    /// Every session opened by this connector sees the same database.
    pub fn in_memory(artifact_root: impl Into<PathBuf>) -> WarehouseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self::from_connection(None, connection, artifact_root.into()))
    }

    fn from_connection(
        db_path: Option<PathBuf>,
        connection: duckdb::Connection,
        artifact_root: PathBuf,
    ) -> Self {
        Self {
            db_path,
            base: Mutex::new(connection),
            artifact_root,
            catalog: Arc::new(Mutex::new(Vec::new())),
            next_session: AtomicI64::new(1),
        }
    }
}

#[async_trait(?Send)]
impl WarehouseConnector for DuckDBConnector {
    type Warehouse = DuckDBWarehouse;

    async fn connect(&self) -> WarehouseResult<DuckDBWarehouse> {
        let base = self
            .base
            .lock()
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Lock error: {}", e)))?;

        let connection = base.try_clone().map_err(|e| {
            WarehouseError::ConnectionFailed(format!("Failed to open DuckDB session: {}", e))
        })?;

        Ok(DuckDBWarehouse {
            connection: Mutex::new(connection),
            session: self.next_session.fetch_add(1, Ordering::SeqCst),
            artifact_root: self.artifact_root.clone(),
            catalog: Arc::clone(&self.catalog),
            next_query: AtomicI64::new(1),
        })
    }

    fn describe(&self) -> String {
        match &self.db_path {
            Some(path) => format!("duckdb://{}", path.display()),
            None => "duckdb://:memory:".to_string(),
        }
    }
}

/// One DuckDB session
pub struct DuckDBWarehouse {
    /// DuckDB connection (wrapped in Mutex for interior access)
    connection: Mutex<duckdb::Connection>,
    session: i64,
    artifact_root: PathBuf,
    catalog: LoadErrorCatalog,
    next_query: AtomicI64,
}

impl DuckDBWarehouse {
    /// Session id stamped on load-error catalog rows
    pub fn session_id(&self) -> i64 {
        self.session
    }

    fn lock(&self) -> WarehouseResult<std::sync::MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    fn execute_batch(&self, sql: &str) -> WarehouseResult<()> {
        self.lock()?
            .execute_batch(sql)
            .map_err(|e| WarehouseError::TransactionFailed(format!("{}: {}", sql, e)))
    }

    /// Append rejected rows to the shared catalog
    fn record_rejections(
        &self,
        staging: &str,
        query: i64,
        artifact: &ArtifactLocator,
        rejections: &[Rejection],
    ) {
        let now = chrono::Utc::now().naive_utc();
        let entries = rejections.iter().map(|r| LoadErrorDetail {
            start_time: Some(now),
            session: self.session,
            table: staging.to_string(),
            query,
            filename: artifact.uri(),
            line_number: r.line,
            column_name: r.column.clone(),
            column_type: r.column_type.clone(),
            raw_value: r.value.chars().take(RAW_VALUE_LIMIT).collect(),
            error_code: r.code,
            reason: r.reason.clone(),
        });

        match self.catalog.lock() {
            Ok(mut catalog) => catalog.extend(entries),
            Err(e) => tracing::warn!("Load-error catalog unavailable: {}", e),
        }
    }
}

/// Lines the last `copy_sql` scan skipped, in file order
fn rejected_lines(conn: &duckdb::Connection) -> WarehouseResult<Vec<Rejection>> {
    let sql = format!(
        "SELECT COALESCE(CAST(line AS BIGINT), 0), COALESCE(column_name, ''), \
         CAST(error_type AS VARCHAR), COALESCE(csv_line, ''), COALESCE(error_message, '') \
         FROM {} ORDER BY line",
        quote_ident(REJECTS_TABLE)
    );
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| WarehouseError::QueryFailed(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| {
            let error_type: String = row.get(2)?;
            let csv_line: String = row.get(3)?;
            Ok(Rejection::from_reject_row(
                row.get(0)?,
                row.get(1)?,
                &error_type,
                &csv_line,
                row.get(4)?,
            ))
        })
        .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;

    rows.collect::<duckdb::Result<Vec<_>>>()
        .map_err(|e| WarehouseError::QueryFailed(format!("Row fetch error: {}", e)))
}

/// Keys loaded into `staging` more than once
fn duplicate_keys(conn: &duckdb::Connection, staging: &str) -> WarehouseResult<Vec<Rejection>> {
    let sql = duplicate_keys_sql(staging, RECORD_COLUMNS[0], DUPLICATE_REPORT_LIMIT);
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| WarehouseError::QueryFailed(format!("Prepare failed: {}", e)))?;

    let rows = stmt
        .query_map([], |row| Ok(Rejection::duplicate_key(row.get(0)?, row.get(1)?)))
        .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;

    rows.collect::<duckdb::Result<Vec<_>>>()
        .map_err(|e| WarehouseError::QueryFailed(format!("Row fetch error: {}", e)))
}

#[async_trait(?Send)]
impl Warehouse for DuckDBWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::DuckDB
    }

    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        let conn = self.lock()?;
        conn.execute(sql, [])
            .map(|n| n as u64)
            .map_err(|e| WarehouseError::QueryFailed(format!("Execute failed: {}", e)))
    }

    async fn begin(&self) -> WarehouseResult<()> {
        self.execute_batch("BEGIN TRANSACTION")
    }

    async fn commit(&self) -> WarehouseResult<()> {
        self.execute_batch("COMMIT")
    }

    async fn rollback(&self) -> WarehouseResult<()> {
        self.execute_batch("ROLLBACK")
    }

    async fn load_from_storage(
        &self,
        staging: &str,
        artifact: &ArtifactLocator,
        _access_role: &str,
    ) -> WarehouseResult<u64> {
        validate_identifier(staging)?;
        let query = self.next_query.fetch_add(1, Ordering::SeqCst);
        let path = self.artifact_root.join(artifact.key());
        let rejected = |message: String| WarehouseError::LoadRejected {
            artifact: artifact.uri(),
            message,
        };

        if !path.is_file() {
            return Err(rejected(format!("cannot read {}: no such file", path.display())));
        }

        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {}; DROP TABLE IF EXISTS {};",
            quote_ident(REJECTS_TABLE),
            quote_ident(REJECT_SCANS_TABLE)
        ))
        .map_err(|e| WarehouseError::QueryFailed(format!("Failed to reset reject tables: {}", e)))?;

        let sql = copy_sql(staging, &path);
        tracing::debug!("{}", sql);
        let loaded = conn
            .execute(&sql, [])
            .map_err(|e| rejected(e.to_string()))? as u64;

        let lines = rejected_lines(&conn)?;
        if !lines.is_empty() {
            self.record_rejections(staging, query, artifact, &lines);
            return Err(rejected(format!(
                "{} row(s) rejected. Check the load-error catalog for details",
                lines.len()
            )));
        }

        let duplicates = duplicate_keys(&conn, staging)?;
        if !duplicates.is_empty() {
            self.record_rejections(staging, query, artifact, &duplicates);
            let keys: Vec<&str> = duplicates.iter().map(|d| d.value.as_str()).collect();
            return Err(rejected(format!(
                "duplicate key(s) in partition: {}",
                keys.join(", ")
            )));
        }

        Ok(loaded)
    }

    async fn load_errors(
        &self,
        scope: LoadErrorScope,
        limit: usize,
    ) -> WarehouseResult<Vec<LoadErrorDetail>> {
        let catalog = self
            .catalog
            .lock()
            .map_err(|e| WarehouseError::QueryFailed(format!("Lock error: {}", e)))?;

        let matching: Vec<&LoadErrorDetail> = catalog
            .iter()
            .filter(|e| scope == LoadErrorScope::Recent || e.session == self.session)
            .collect();
        let skip = matching.len().saturating_sub(limit);

        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    async fn fetch_records(
        &self,
        table: &TableSchema,
        limit: Option<usize>,
    ) -> WarehouseResult<Vec<Record>> {
        let conn = self.lock()?;
        let sql = table.select_text_sql(Dialect::DuckDB, limit);
        let width = table.columns().len();

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| WarehouseError::QueryFailed(format!("Prepare failed: {}", e)))?;

        let rows = stmt
            .query_map([], |row| {
                (0..width)
                    .map(|i| row.get::<_, Option<String>>(i).map(Option::unwrap_or_default))
                    .collect::<duckdb::Result<Vec<String>>>()
            })
            .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;

        let mut records = Vec::new();
        for row in rows {
            let fields =
                row.map_err(|e| WarehouseError::QueryFailed(format!("Row fetch error: {}", e)))?;
            let record = Record::from_text_fields(&fields)
                .map_err(|e| WarehouseError::QueryFailed(format!("Malformed row: {}", e)))?;
            records.push(record);
        }

        Ok(records)
    }

    async fn close(self) -> WarehouseResult<()> {
        let connection = self
            .connection
            .into_inner()
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Lock error: {}", e)))?;

        connection
            .close()
            .map_err(|(_, e)| WarehouseError::ConnectionFailed(format!("Close failed: {}", e)))
    }
}
