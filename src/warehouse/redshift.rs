//! Redshift warehouse backend implementation
//!
//! Talks to Redshift over the PostgreSQL wire protocol. Every statement goes
//! through the simple query protocol: Redshift rejects several extended
//! protocol features and all rows come back as text, which is what the
//! record parser expects.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{SimpleQueryMessage, SimpleQueryRow};

use super::schema::{
    Dialect, TableSchema, duplicate_keys_sql, quote_ident, quote_literal, validate_identifier,
};
use super::{Warehouse, WarehouseConnector, WarehouseError, WarehouseResult};
use crate::models::{LoadErrorDetail, LoadErrorScope, RECORD_COLUMNS, Record, TIMESTAMP_FORMAT};
use crate::partition::ArtifactLocator;

/// Most duplicate keys named in a rejected load
const DUPLICATE_REPORT_LIMIT: usize = 20;

/// Connection parameters for one Redshift cluster
#[derive(Clone)]
pub struct RedshiftConnector {
    hostname: String,
    port: u16,
    database: String,
    username: String,
    password: String,
}

impl RedshiftConnector {
    /// Create a connector
    ///
    /// # Arguments
    /// * `hostname` - Cluster endpoint
    /// * `port` - Cluster port, usually 5439
    /// * `database` - Database name
    /// * `username` - Database user
    /// * `password` - Database password
    pub fn new(
        hostname: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&self.hostname)
            .port(self.port)
            .dbname(&self.database)
            .user(&self.username)
            .password(&self.password)
            .application_name("post-loader");
        config
    }
}

impl std::fmt::Debug for RedshiftConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

#[async_trait(?Send)]
impl WarehouseConnector for RedshiftConnector {
    type Warehouse = RedshiftWarehouse;

    async fn connect(&self) -> WarehouseResult<RedshiftWarehouse> {
        let (client, connection) = self
            .pg_config()
            .connect(tokio_postgres::NoTls)
            .await
            .map_err(|e| {
                WarehouseError::ConnectionFailed(format!(
                    "Failed to connect to {}: {}",
                    self.describe(),
                    e
                ))
            })?;

        // Spawn connection handler
        let driver = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!("Redshift connection error: {}", e);
            }
        });

        Ok(RedshiftWarehouse { client, driver })
    }

    fn describe(&self) -> String {
        format!(
            "redshift://{}:****@{}:{}/{}",
            self.username, self.hostname, self.port, self.database
        )
    }
}

/// One Redshift session
pub struct RedshiftWarehouse {
    client: tokio_postgres::Client,
    /// Task driving the socket; finishes once the client is dropped
    driver: JoinHandle<()>,
}

fn affected_rows(messages: &[SimpleQueryMessage]) -> u64 {
    messages
        .iter()
        .map(|m| match m {
            SimpleQueryMessage::CommandComplete(n) => *n,
            _ => 0,
        })
        .sum()
}

impl RedshiftWarehouse {
    async fn query_rows(&self, sql: &str) -> WarehouseResult<Vec<SimpleQueryRow>> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| WarehouseError::QueryFailed(format!("Query failed: {}", e)))?;

        Ok(messages
            .into_iter()
            .filter_map(|m| match m {
                SimpleQueryMessage::Row(row) => Some(row),
                _ => None,
            })
            .collect())
    }
}

fn text(row: &SimpleQueryRow, idx: usize) -> String {
    row.get(idx).map(|s| s.trim().to_string()).unwrap_or_default()
}

fn number<T: std::str::FromStr + Default>(row: &SimpleQueryRow, idx: usize) -> T {
    row.get(idx)
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or_default()
}

/// COPY statement loading one artifact into `staging`
pub fn copy_sql(staging: &str, artifact: &ArtifactLocator, access_role: &str) -> String {
    format!(
        "COPY {} FROM {} iam_role {} IGNOREHEADER 1 DELIMITER ',' CSV",
        quote_ident(staging),
        quote_literal(&artifact.uri()),
        quote_literal(access_role)
    )
}

/// Query over `stl_load_errors`, newest first
pub fn load_errors_sql(scope: LoadErrorScope, limit: usize) -> String {
    let filter = match scope {
        LoadErrorScope::CurrentSession => "WHERE session = pg_backend_pid() ",
        LoadErrorScope::Recent => "",
    };
    format!(
        "SELECT to_char(starttime, 'YYYY-MM-DD HH24:MI:SS'), session, tbl, query, \
         TRIM(filename), line_number, TRIM(colname), TRIM(type), TRIM(raw_field_value), \
         err_code, TRIM(err_reason) \
         FROM stl_load_errors {}ORDER BY starttime DESC LIMIT {}",
        filter, limit
    )
}

#[async_trait(?Send)]
impl Warehouse for RedshiftWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::Redshift
    }

    async fn execute(&self, sql: &str) -> WarehouseResult<u64> {
        let messages = self
            .client
            .simple_query(sql)
            .await
            .map_err(|e| WarehouseError::QueryFailed(format!("Execute failed: {}", e)))?;

        Ok(affected_rows(&messages))
    }

    async fn load_from_storage(
        &self,
        staging: &str,
        artifact: &ArtifactLocator,
        access_role: &str,
    ) -> WarehouseResult<u64> {
        validate_identifier(staging)?;
        let sql = copy_sql(staging, artifact, access_role);
        tracing::debug!(
            "COPY {} FROM {} iam_role '****'",
            quote_ident(staging),
            artifact.uri()
        );

        let messages = self
            .client
            .simple_query(&sql)
            .await
            .map_err(|e| WarehouseError::LoadRejected {
                artifact: artifact.uri(),
                message: e.to_string(),
            })?;

        let duplicates = self
            .query_rows(&duplicate_keys_sql(
                staging,
                RECORD_COLUMNS[0],
                DUPLICATE_REPORT_LIMIT,
            ))
            .await?;
        if !duplicates.is_empty() {
            let keys: Vec<String> = duplicates.iter().map(|row| text(row, 0)).collect();
            return Err(WarehouseError::LoadRejected {
                artifact: artifact.uri(),
                message: format!("duplicate key(s) in partition: {}", keys.join(", ")),
            });
        }

        Ok(affected_rows(&messages))
    }

    async fn load_errors(
        &self,
        scope: LoadErrorScope,
        limit: usize,
    ) -> WarehouseResult<Vec<LoadErrorDetail>> {
        let rows = self.query_rows(&load_errors_sql(scope, limit)).await?;

        Ok(rows
            .iter()
            .map(|row| LoadErrorDetail {
                start_time: row
                    .get(0)
                    .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT).ok()),
                session: number(row, 1),
                table: text(row, 2),
                query: number(row, 3),
                filename: text(row, 4),
                line_number: number(row, 5),
                column_name: text(row, 6),
                column_type: text(row, 7),
                raw_value: text(row, 8),
                error_code: number(row, 9),
                reason: text(row, 10),
            })
            .collect())
    }

    async fn fetch_records(
        &self,
        table: &TableSchema,
        limit: Option<usize>,
    ) -> WarehouseResult<Vec<Record>> {
        let rows = self
            .query_rows(&table.select_text_sql(Dialect::Redshift, limit))
            .await?;
        let width = table.columns().len();

        rows.iter()
            .map(|row| {
                let fields: Vec<String> = (0..width)
                    .map(|i| row.get(i).unwrap_or_default().to_string())
                    .collect();
                Record::from_text_fields(&fields)
                    .map_err(|e| WarehouseError::QueryFailed(format!("Malformed row: {}", e)))
            })
            .collect()
    }

    async fn close(self) -> WarehouseResult<()> {
        let Self { client, driver } = self;
        drop(client);
        driver
            .await
            .map_err(|e| WarehouseError::ConnectionFailed(format!("Close failed: {}", e)))
    }
}
