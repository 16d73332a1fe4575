//! Show target table CLI command

use std::path::PathBuf;

use super::{load_config, runtime};
use crate::cli::error::CliError;
use crate::models::Record;
use crate::report::{OutputFormat, format_records};
use crate::warehouse::{TableSchema, Warehouse, WarehouseConnector};

/// Show command arguments
#[derive(Debug, Clone)]
pub struct ShowArgs {
    pub config: PathBuf,
    /// Maximum rows to print; all rows when `None`
    pub limit: Option<usize>,
    pub format: OutputFormat,
}

/// Print the target table's rows ordered by key
pub fn handle_show(args: &ShowArgs) -> Result<(), CliError> {
    let config = load_config(&args.config)?;
    let table = TableSchema::records(&config.warehouse.table)?;
    let rt = runtime()?;

    let records = rt.block_on(async {
        with_connector!(&config, |connector| fetch(connector, &table, args.limit).await)
    })?;

    println!("{}", format_records(&records, args.format));
    Ok(())
}

async fn fetch<C: WarehouseConnector>(
    connector: C,
    table: &TableSchema,
    limit: Option<usize>,
) -> Result<Vec<Record>, CliError> {
    let warehouse = connector.connect().await?;
    let result = warehouse.fetch_records(table, limit).await;
    if let Err(e) = warehouse.close().await {
        tracing::warn!("Failed to close warehouse session: {}", e);
    }
    Ok(result?)
}
