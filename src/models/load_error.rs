//! Per-row bulk load failure detail
//!
//! Mirrors the columns of the warehouse's load-error catalog
//! (`stl_load_errors` on Redshift).

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// One row of the load-error catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadErrorDetail {
    /// When the failing load started
    pub start_time: Option<NaiveDateTime>,
    /// Warehouse session that ran the load
    pub session: i64,
    /// Table the load targeted (name or engine table id)
    pub table: String,
    /// Engine query id of the load statement
    pub query: i64,
    /// Source object the row came from
    pub filename: String,
    /// 1-based line number within the source object
    pub line_number: i64,
    /// Column that failed coercion
    pub column_name: String,
    /// Declared type of that column
    pub column_type: String,
    /// Raw offending value
    pub raw_value: String,
    /// Engine error code
    pub error_code: i32,
    /// Human-readable reason
    pub reason: String,
}

impl std::fmt::Display for LoadErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{} column '{}' ({}) value '{}': [{}] {}",
            self.filename,
            self.line_number,
            self.column_name,
            self.column_type,
            self.raw_value,
            self.error_code,
            self.reason
        )
    }
}

/// Which rows of the catalog to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorScope {
    /// Only rows written by the current session
    CurrentSession,
    /// The most recent rows from any session
    Recent,
}
