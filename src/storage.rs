//! Object-storage upload of partition artifacts
//!
//! Ensures the bucket exists (creating it in the configured region when a
//! head request reports 404) and uploads a local artifact under the
//! partition's object key.

use std::path::Path;

use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};

use crate::partition::ArtifactLocator;

/// Region whose buckets must be created without a location constraint
const DEFAULT_AWS_REGION: &str = "us-east-1";

/// Errors raised while talking to object storage
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to check bucket {bucket}: {message}")]
    HeadBucket { bucket: String, message: String },

    #[error("Failed to create bucket {bucket}: {message}")]
    CreateBucket { bucket: String, message: String },

    #[error("Failed to read {path}: {message}")]
    ReadArtifact { path: String, message: String },

    #[error("Failed to upload {uri}: {message}")]
    Upload { uri: String, message: String },
}

/// S3 client bound to one region
pub struct ArtifactStore {
    client: Client,
    region: String,
}

impl ArtifactStore {
    /// Build a client from the default credential chain
    ///
    /// An empty `region` defers to the environment's region setting.
    pub async fn connect(region: &str) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if !region.is_empty() {
            loader = loader.region(Region::new(region.to_string()));
        }
        let sdk_config = loader.load().await;
        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string());

        Self {
            client: Client::new(&sdk_config),
            region,
        }
    }

    /// Create `bucket` unless it already exists
    ///
    /// # Returns
    /// `true` if the bucket was created
    pub async fn ensure_bucket(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => return Ok(false),
            Err(e) => {
                let not_found = e
                    .as_service_error()
                    .map(|service| service.is_not_found())
                    .unwrap_or(false);
                if !not_found {
                    return Err(StorageError::HeadBucket {
                        bucket: bucket.to_string(),
                        message: DisplayErrorContext(&e).to_string(),
                    });
                }
            }
        }

        let mut request = self.client.create_bucket().bucket(bucket);
        if self.region != DEFAULT_AWS_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        request.send().await.map_err(|e| StorageError::CreateBucket {
            bucket: bucket.to_string(),
            message: DisplayErrorContext(&e).to_string(),
        })?;

        tracing::info!(bucket, region = %self.region, "Created bucket");
        Ok(true)
    }

    /// Upload a local artifact to its partition's object key
    pub async fn upload_partition(
        &self,
        local_path: &Path,
        artifact: &ArtifactLocator,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::ReadArtifact {
                path: local_path.display().to_string(),
                message: e.to_string(),
            })?;

        self.client
            .put_object()
            .bucket(artifact.bucket())
            .key(artifact.key())
            .content_type("text/csv")
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                uri: artifact.uri(),
                message: DisplayErrorContext(&e).to_string(),
            })?;

        tracing::info!("Uploaded {} to {}", local_path.display(), artifact);
        Ok(())
    }
}
