//! S3 blob store.
//!
//! Objects are written with `put_object`; the returned URL is a presigned
//! `GET` valid for the configured expiry.

use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;

use crate::blob::{check_relative, BlobStore, StorageError};

pub struct S3BlobStore {
    client: S3Client,
    bucket: String,
    url_expiry: Duration,
}

impl S3BlobStore {
    pub fn new(client: S3Client, bucket: impl Into<String>, url_expiry: Duration) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            url_expiry,
        }
    }

    /// Build a client from the ambient AWS configuration (environment,
    /// profile, instance metadata).
    pub async fn from_env(bucket: impl Into<String>, url_expiry: Duration) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(S3Client::new(&config), bucket, url_expiry)
    }

    async fn presign(&self, key: &str) -> Result<String, StorageError> {
        let presigning = PresigningConfig::expires_in(self.url_expiry)
            .map_err(|e| StorageError::Presign(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;
        Ok(request.uri().to_string())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        check_relative(path)?;
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                StorageError::S3(format!(
                    "Failed to write s3://{}/{}: {e}",
                    self.bucket, path
                ))
            })?;
        tracing::debug!(bucket = %self.bucket, key = path, size, "Stored artifact in S3");
        self.presign(path).await
    }

    async fn url_for(&self, path: &str) -> Result<String, StorageError> {
        check_relative(path)?;
        self.presign(path).await
    }
}
