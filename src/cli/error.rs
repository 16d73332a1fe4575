//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::partition::{ArtifactError, PartitionError};
use crate::warehouse::WarehouseError;

/// CLI-specific error type
///
/// Every variant exits with status 1. A rolled-back merge is not an error
/// at this level; it is reported and mapped to its own exit status.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Partition(#[from] PartitionError),

    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[cfg(feature = "s3")]
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),
}
