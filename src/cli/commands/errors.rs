//! Load-error catalog CLI command

use std::path::PathBuf;

use super::{load_config, runtime};
use crate::cli::error::CliError;
use crate::models::{LoadErrorDetail, LoadErrorScope};
use crate::report::{OutputFormat, format_load_errors};
use crate::warehouse::{Warehouse, WarehouseConnector};

/// Errors command arguments
#[derive(Debug, Clone)]
pub struct ErrorsArgs {
    pub config: PathBuf,
    /// Number of most recent rows to show
    pub limit: usize,
    pub format: OutputFormat,
}

/// Print the most recent rows of the warehouse's load-error catalog
pub fn handle_errors(args: &ErrorsArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let rt = runtime()?;

    let errors = rt.block_on(async {
        with_connector!(&config, |connector| recent_errors(connector, args.limit).await)
    })?;

    println!("{}", format_load_errors(&errors, args.format));
    Ok(())
}

async fn recent_errors<C: WarehouseConnector>(
    connector: C,
    limit: usize,
) -> Result<Vec<LoadErrorDetail>, CliError> {
    let warehouse = connector.connect().await?;
    let result = warehouse.load_errors(LoadErrorScope::Recent, limit).await;
    if let Err(e) = warehouse.close().await {
        tracing::warn!("Failed to close warehouse session: {}", e);
    }
    Ok(result?)
}
