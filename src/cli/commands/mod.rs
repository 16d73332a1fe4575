//! CLI command implementations

/// Bind `$connector` to the configured backend's connector and evaluate
/// `$body`, which must yield `Result<_, CliError>`
macro_rules! with_connector {
    ($config:expr, |$connector:ident| $body:expr) => {{
        let config: &$crate::config::PipelineConfig = $config;
        let result: Result<_, $crate::cli::error::CliError>;
        match config.warehouse.backend {
            $crate::config::BackendType::Redshift => {
                #[cfg(feature = "redshift-backend")]
                {
                    let $connector = config.redshift_connector();
                    result = $body;
                }
                #[cfg(not(feature = "redshift-backend"))]
                {
                    result = Err($crate::cli::commands::backend_disabled("redshift-backend"));
                }
            }
            $crate::config::BackendType::DuckDB => {
                #[cfg(feature = "duckdb-backend")]
                {
                    let $connector = config.duckdb_connector()?;
                    result = $body;
                }
                #[cfg(not(feature = "duckdb-backend"))]
                {
                    result = Err($crate::cli::commands::backend_disabled("duckdb-backend"));
                }
            }
        }
        result
    }};
}

pub mod errors;
pub mod merge;
pub mod show;
pub mod transform;
#[cfg(feature = "s3")]
pub mod upload;

use std::path::Path;

use crate::cli::error::CliError;
use crate::config::PipelineConfig;

/// Load, override and validate the configuration
pub fn load_config(path: &Path) -> Result<PipelineConfig, CliError> {
    let config = PipelineConfig::load(path)?;
    config.validate()?;
    tracing::debug!("Loaded configuration: {:?}", config);
    Ok(config)
}

pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

#[allow(dead_code)]
pub(crate) fn backend_disabled(feature: &str) -> CliError {
    CliError::InvalidArgument(format!(
        "Backend not enabled. Build with --features {}",
        feature
    ))
}
