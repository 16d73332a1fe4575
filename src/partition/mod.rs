//! Partition identity and the CSV artifact boundary
//!
//! A partition is one logical day, named `YYYYMMDD`. Its artifact lives at
//! `s3://{bucket}/{YYYYMMDD}.csv`. The partition date is resolved once per
//! run and handed to every stage; nothing below this module reads the clock.

pub mod artifact;
pub mod transform;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use artifact::{ArtifactError, encode_records, write_artifact};
pub use transform::{RawPost, TransformError, transform_posts};

/// `chrono` layout of a partition name
pub const PARTITION_FORMAT: &str = "%Y%m%d";

/// Errors raised while naming a partition
#[derive(Debug, thiserror::Error)]
pub enum PartitionError {
    /// Partition name is not `YYYYMMDD`
    #[error("Invalid partition '{0}': expected YYYYMMDD")]
    InvalidDate(String),

    /// Bucket name is empty or contains a path separator
    #[error("Invalid bucket name '{0}'")]
    InvalidBucket(String),
}

/// The logical day a run loads
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionDate(NaiveDate);

impl PartitionDate {
    /// Parse a `YYYYMMDD` partition name
    pub fn parse(s: &str) -> Result<Self, PartitionError> {
        if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PartitionError::InvalidDate(s.to_string()));
        }
        NaiveDate::parse_from_str(s, PARTITION_FORMAT)
            .map(Self)
            .map_err(|_| PartitionError::InvalidDate(s.to_string()))
    }

    /// Artifact object key, `{YYYYMMDD}.csv`
    pub fn object_key(&self) -> String {
        format!("{}.csv", self)
    }
}

impl std::fmt::Display for PartitionDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format(PARTITION_FORMAT))
    }
}

impl std::str::FromStr for PartitionDate {
    type Err = PartitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Fully qualified location of one partition artifact in object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactLocator {
    bucket: String,
    partition: PartitionDate,
}

impl ArtifactLocator {
    /// Locate `partition` inside `bucket`
    pub fn new(bucket: impl Into<String>, partition: PartitionDate) -> Result<Self, PartitionError> {
        let bucket = bucket.into();
        if bucket.is_empty() || bucket.contains('/') || bucket.contains('\'') {
            return Err(PartitionError::InvalidBucket(bucket));
        }
        Ok(Self { bucket, partition })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn partition(&self) -> PartitionDate {
        self.partition
    }

    /// Object key within the bucket
    pub fn key(&self) -> String {
        self.partition.object_key()
    }

    /// `s3://{bucket}/{YYYYMMDD}.csv`
    pub fn uri(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key())
    }
}

impl std::fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.uri())
    }
}
