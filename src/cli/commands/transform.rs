//! Transform CLI command
//!
//! Turns a JSON array of harvested posts into the partition artifact.

use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::cli::error::CliError;
use crate::partition::artifact::write_artifact;
use crate::partition::{PartitionDate, RawPost, transform_posts};

/// Transform command arguments
#[derive(Debug, Clone)]
pub struct TransformArgs {
    /// JSON file holding an array of posts
    pub input: PathBuf,
    /// Partition the posts belong to, `YYYYMMDD`
    pub partition: String,
    /// Directory the artifact is written to
    pub output_dir: PathBuf,
}

fn read_posts(path: &Path) -> anyhow::Result<Vec<RawPost>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let posts = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a JSON array of posts", path.display()))?;
    Ok(posts)
}

/// Write `{output_dir}/{YYYYMMDD}.csv`
///
/// # Returns
/// Path of the written artifact
pub fn handle_transform(args: &TransformArgs) -> Result<PathBuf, CliError> {
    let partition = PartitionDate::parse(&args.partition)?;
    if !args.input.exists() {
        return Err(CliError::FileNotFound(args.input.clone()));
    }

    let posts = read_posts(&args.input)?;
    let harvested = posts.len();
    let records = transform_posts(posts).context("Failed to normalise posts")?;

    std::fs::create_dir_all(&args.output_dir).map_err(|e| {
        CliError::IoError(format!(
            "Failed to create {}: {}",
            args.output_dir.display(),
            e
        ))
    })?;
    let path = args.output_dir.join(partition.object_key());
    write_artifact(&path, &records)?;

    tracing::info!(
        harvested,
        written = records.len(),
        "Wrote {}",
        path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_transform_writes_artifact() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("posts.json");
        std::fs::write(
            &input,
            r#"[{"id": "a1", "title": "Hello, world", "score": 5, "edited": 1706700000.0,
                 "num_comments": 2, "author": null, "created_utc": 1706693400,
                 "url": "https://example.com", "upvote_ratio": 0.9,
                 "over_18": false, "stickied": false}]"#,
        )
        .unwrap();

        let args = TransformArgs {
            input,
            partition: "20240131".into(),
            output_dir: dir.path().join("out"),
        };
        let path = handle_transform(&args).unwrap();
        assert!(path.ends_with("20240131.csv"));

        let content = std::fs::read_to_string(path).unwrap();
        let mut lines = content.lines();
        assert!(lines.next().unwrap().starts_with("id,title,score"));
        assert_eq!(
            lines.next().unwrap(),
            "a1,\"Hello, world\",5,true,2,,2024-01-31 09:30:00,https://example.com,0.9,false,false"
        );
    }

    #[test]
    fn test_transform_rejects_bad_partition() {
        let args = TransformArgs {
            input: PathBuf::from("posts.json"),
            partition: "2024-01-31".into(),
            output_dir: PathBuf::from("out"),
        };
        assert!(matches!(
            handle_transform(&args),
            Err(CliError::Partition(_))
        ));
    }
}
