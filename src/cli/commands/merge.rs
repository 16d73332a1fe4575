//! Merge CLI command

use std::path::PathBuf;

use super::{load_config, runtime};
use crate::cli::error::CliError;
use crate::merge::{MergeController, MergeReport, MergeSettings};
use crate::partition::{ArtifactLocator, PartitionDate};
use crate::report::{OutputFormat, format_merge_report, merge_summary};
use crate::warehouse::WarehouseConnector;

/// Merge command arguments
#[derive(Debug, Clone)]
pub struct MergeArgs {
    /// Configuration file
    pub config: PathBuf,
    /// Partition to load, `YYYYMMDD`
    pub partition: String,
    pub format: OutputFormat,
    /// Maximum load-error rows reported on failure
    pub diagnostics_limit: usize,
}

/// Merge one partition and print the report
///
/// # Returns
/// The process exit status: 0 when committed, 1 when the warehouse could
/// not be reached, 2 when the merge was rolled back
pub fn handle_merge(args: &MergeArgs) -> Result<i32, CliError> {
    let partition = PartitionDate::parse(&args.partition)?;
    let config = load_config(&args.config)?;
    let artifact = config.artifact(partition)?;
    let settings = config
        .merge_settings()?
        .with_diagnostics_limit(args.diagnostics_limit);

    let rt = runtime()?;
    let report = rt.block_on(async {
        with_connector!(&config, |connector| Ok(run(connector, settings, &artifact).await))
    })?;

    // CSV on stdout stays machine-readable
    if args.format == OutputFormat::Csv {
        eprintln!("{}", merge_summary(&report));
    }
    println!("{}", format_merge_report(&report, args.format));
    Ok(report.exit_code)
}

async fn run<C: WarehouseConnector>(
    connector: C,
    settings: MergeSettings,
    artifact: &ArtifactLocator,
) -> MergeReport {
    let controller = MergeController::new(connector, settings);
    let result = controller.run_merge(artifact).await;
    MergeReport::from_result(artifact, &result)
}
