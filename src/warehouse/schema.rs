//! Target table definition
//!
//! The column set is a fixed contract. DDL is rendered per dialect because
//! the production warehouse and the embedded one spell types differently;
//! the delete/insert statements are shared.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{WarehouseError, WarehouseResult};
use crate::models::RECORD_COLUMNS;

/// Default target table name
pub const DEFAULT_TABLE_NAME: &str = "reddit";

/// Suffix appended to the target name for the session-scoped staging table
pub const STAGING_SUFFIX: &str = "_staging";

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid identifier regex"));

/// SQL dialect spoken by a warehouse backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Amazon Redshift (PostgreSQL wire protocol)
    Redshift,
    /// Embedded DuckDB
    DuckDB,
}

/// Logical column type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Short text used as key
    Key,
    Text,
    Integer,
    Boolean,
    Timestamp,
    Double,
}

impl ColumnType {
    pub(crate) fn sql(&self, dialect: Dialect) -> &'static str {
        match (dialect, self) {
            (Dialect::Redshift, ColumnType::Key) => "varchar",
            (Dialect::Redshift, ColumnType::Text) => "varchar(max)",
            (Dialect::Redshift, ColumnType::Integer) => "int",
            (Dialect::Redshift, ColumnType::Boolean) => "bool",
            (Dialect::Redshift, ColumnType::Timestamp) => "timestamp",
            (Dialect::Redshift, ColumnType::Double) => "float",
            (Dialect::DuckDB, ColumnType::Key | ColumnType::Text) => "VARCHAR",
            (Dialect::DuckDB, ColumnType::Integer) => "INTEGER",
            (Dialect::DuckDB, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::DuckDB, ColumnType::Timestamp) => "TIMESTAMP",
            (Dialect::DuckDB, ColumnType::Double) => "DOUBLE",
        }
    }

    /// Type name as `stl_load_errors.type` reports it
    pub fn catalog_name(&self) -> &'static str {
        match self {
            ColumnType::Key | ColumnType::Text => "varchar",
            ColumnType::Integer => "int4",
            ColumnType::Boolean => "bool",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Double => "float8",
        }
    }
}

/// One column of the target table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub column_type: ColumnType,
}

const fn col(name: &'static str, column_type: ColumnType) -> ColumnSpec {
    ColumnSpec { name, column_type }
}

/// Record columns, in artifact order
pub const RECORD_TABLE_COLUMNS: [ColumnSpec; 11] = [
    col("id", ColumnType::Key),
    col("title", ColumnType::Text),
    col("score", ColumnType::Integer),
    col("edited", ColumnType::Boolean),
    col("num_comments", ColumnType::Integer),
    col("author", ColumnType::Text),
    col("created_utc", ColumnType::Timestamp),
    col("url", ColumnType::Text),
    col("upvote_ratio", ColumnType::Double),
    col("over_18", ColumnType::Boolean),
    col("stickied", ColumnType::Boolean),
];

/// Validate a bare SQL identifier
pub fn validate_identifier(name: &str) -> WarehouseResult<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(WarehouseError::InvalidInput(format!(
            "'{}' is not a valid table identifier",
            name
        )))
    }
}

/// Double-quote an identifier that has already been validated
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A table holding `Record` rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: &'static [ColumnSpec],
    key: &'static str,
}

impl TableSchema {
    /// The record table called `name`
    pub fn records(name: impl Into<String>) -> WarehouseResult<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        Ok(Self {
            name,
            columns: &RECORD_TABLE_COLUMNS,
            key: RECORD_COLUMNS[0],
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &'static [ColumnSpec] {
        self.columns
    }

    /// Natural key column
    pub fn key(&self) -> &'static str {
        self.key
    }

    /// Name of this table's staging mirror
    pub fn staging_name(&self) -> String {
        format!("{}{}", self.name, STAGING_SUFFIX)
    }

    /// Quoted, comma-separated column list
    pub fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c.name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `CREATE TABLE IF NOT EXISTS` for the target table
    ///
    /// The key is declared `PRIMARY KEY` only on Redshift, where the
    /// constraint is informational. On both engines one-row-per-key is held
    /// by the merge's delete-by-key step.
    pub fn create_table_sql(&self, dialect: Dialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let mut def = format!("    {} {}", quote_ident(c.name), c.column_type.sql(dialect));
                if c.name == self.key && dialect == Dialect::Redshift {
                    def.push_str(" PRIMARY KEY");
                }
                def
            })
            .collect();

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_ident(&self.name),
            columns.join(",\n")
        )
    }

    /// Session-scoped table with this table's column definitions
    pub fn create_staging_sql(&self, staging: &str, dialect: Dialect) -> String {
        match dialect {
            Dialect::Redshift => format!(
                "CREATE TEMP TABLE {} (LIKE {})",
                quote_ident(staging),
                quote_ident(&self.name)
            ),
            Dialect::DuckDB => format!(
                "CREATE TEMP TABLE {} AS SELECT * FROM {} LIMIT 0",
                quote_ident(staging),
                quote_ident(&self.name)
            ),
        }
    }

    /// Select every column rendered as text, ordered by key
    ///
    /// Timestamps come back as `YYYY-MM-DD HH:MM:SS` so rows can be parsed
    /// with `Record::from_text_fields`.
    pub fn select_text_sql(&self, dialect: Dialect, limit: Option<usize>) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let ident = quote_ident(c.name);
                match (dialect, c.column_type) {
                    (Dialect::Redshift, ColumnType::Timestamp) => {
                        format!("to_char({}, 'YYYY-MM-DD HH24:MI:SS')", ident)
                    }
                    (Dialect::Redshift, _) => ident,
                    (Dialect::DuckDB, ColumnType::Timestamp) => {
                        format!("strftime({}, '%Y-%m-%d %H:%M:%S')", ident)
                    }
                    (Dialect::DuckDB, _) => format!("CAST({} AS VARCHAR)", ident),
                }
            })
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            quote_ident(&self.name),
            quote_ident(self.key)
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql
    }
}

/// Keys occurring more than once in `staging`, with their row counts
///
/// Shared by both loaders: a partition must not carry two rows for one key,
/// or the insert step would leave duplicates in the target.
pub fn duplicate_keys_sql(staging: &str, key: &str, limit: usize) -> String {
    let key = quote_ident(key);
    format!(
        "SELECT {key}, COUNT(*) FROM {staging} GROUP BY {key} HAVING COUNT(*) > 1 \
         ORDER BY {key} LIMIT {limit}",
        key = key,
        staging = quote_ident(staging),
        limit = limit
    )
}
