//! Post Loader - daily batch loader for harvested posts
//!
//! Provides:
//! - Normalisation of harvested posts into `YYYYMMDD` partition artifacts
//! - Upload of artifacts to object storage (`s3` feature)
//! - An atomic staging-table merge of an artifact into the warehouse table
//! - Load-error diagnostics when a merge is rolled back
//!
//! The merge runs against the `Warehouse` trait; Redshift is the production
//! backend and DuckDB the embedded one.

pub mod config;
pub mod merge;
pub mod models;
pub mod partition;
pub mod report;
#[cfg(feature = "s3")]
pub mod storage;
pub mod warehouse;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use config::{BackendType, ConfigError, PipelineConfig};
pub use merge::{
    DiagnosticsReporter, MergeController, MergeCounts, MergeError, MergeOutcome, MergeReport,
    MergeSettings, MergeState,
};
pub use models::{LoadErrorDetail, LoadErrorScope, Record};
pub use partition::{ArtifactLocator, PartitionDate, PartitionError};
pub use report::OutputFormat;
pub use warehouse::{
    Dialect, TableSchema, Warehouse, WarehouseConnector, WarehouseError, WarehouseResult,
};

#[cfg(feature = "duckdb-backend")]
pub use warehouse::{DuckDBConnector, DuckDBWarehouse};
#[cfg(feature = "redshift-backend")]
pub use warehouse::{RedshiftConnector, RedshiftWarehouse};

#[cfg(feature = "s3")]
pub use storage::{ArtifactStore, StorageError};
