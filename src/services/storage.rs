use s3::creds::Credentials;
use s3::{Bucket, Region};

/// Client for S3-compatible object storage (Cloudflare R2). The pipeline
/// stores and fetches uploads as opaque bytes; it never inspects them.
pub struct StorageClient {
    bucket: Box<Bucket>,
}

impl StorageClient {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self { bucket })
    }

    /// Store uploaded file bytes under a key.
    pub async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StorageError> {
        self.bucket
            .put_object_with_content_type(key, data, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    /// Download file bytes for processing.
    pub async fn download(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let response = self.bucket.get_object(key).await.map_err(StorageError::S3)?;
        Ok(response.to_vec())
    }

    /// Presigned GET URL for client-side viewing.
    pub async fn presigned_url(&self, key: &str, expiry_secs: u32) -> Result<String, StorageError> {
        self.bucket
            .presign_get(key, expiry_secs, None)
            .await
            .map_err(StorageError::S3)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("Storage configuration error: {0}")]
    Config(String),
}
