//! Upload CLI command

use std::path::PathBuf;

use super::{load_config, runtime};
use crate::cli::error::CliError;
use crate::partition::PartitionDate;
use crate::storage::ArtifactStore;

/// Upload command arguments
#[derive(Debug, Clone)]
pub struct UploadArgs {
    pub config: PathBuf,
    /// Partition to upload, `YYYYMMDD`
    pub partition: String,
    /// Directory holding `{YYYYMMDD}.csv`
    pub source_dir: PathBuf,
}

/// Ensure the bucket exists and upload the partition artifact
pub fn handle_upload(args: &UploadArgs) -> Result<(), CliError> {
    let partition = PartitionDate::parse(&args.partition)?;
    let config = load_config(&args.config)?;
    let artifact = config.artifact(partition)?;

    let local_path = args.source_dir.join(partition.object_key());
    if !local_path.exists() {
        return Err(CliError::FileNotFound(local_path));
    }

    let rt = runtime()?;
    rt.block_on(async {
        let store = ArtifactStore::connect(&config.aws.region).await;
        store.ensure_bucket(artifact.bucket()).await?;
        store.upload_partition(&local_path, &artifact).await?;
        Ok::<_, CliError>(())
    })?;

    println!("Uploaded {}", artifact);
    Ok(())
}
