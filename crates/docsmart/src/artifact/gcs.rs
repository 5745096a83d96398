//! Google Cloud Storage artifact store

use async_trait::async_trait;
use std::time::Duration;

use google_cloud_storage::client::Client as GcsClient;
use google_cloud_storage::http::objects::delete::DeleteObjectRequest;
use google_cloud_storage::http::objects::download::Range;
use google_cloud_storage::http::objects::get::GetObjectRequest;
use google_cloud_storage::http::objects::list::ListObjectsRequest;
use google_cloud_storage::http::objects::upload::{Media, UploadObjectRequest, UploadType};

use crate::error::{Error, Result};

use super::ArtifactStore;

/// Google Cloud Storage artifact store
///
/// Logical buckets (`raw-inputs`, `processed-pdfs`) are mapped to real GCS
/// buckets by prefixing with the configured deployment prefix.
pub struct GcsArtifactStore {
    client: GcsClient,
    http: reqwest::Client,
    bucket_prefix: String,
}

impl GcsArtifactStore {
    /// Create a new GCS artifact store; credentials come from the ambient
    /// service account (`GOOGLE_APPLICATION_CREDENTIALS`).
    pub async fn new(bucket_prefix: String) -> Result<Self> {
        let config = google_cloud_storage::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| Error::Config(format!("Failed to create GCS client: {}", e)))?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: GcsClient::new(config),
            http,
            bucket_prefix,
        })
    }

    fn real_bucket(&self, bucket: &str) -> String {
        if self.bucket_prefix.is_empty() {
            bucket.to_string()
        } else {
            format!("{}-{}", self.bucket_prefix, bucket)
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "https://storage.googleapis.com/{}/{}",
            self.real_bucket(bucket),
            path
        )
    }
}

#[async_trait]
impl ArtifactStore for GcsArtifactStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let mut media = Media::new(path.to_string());
        media.content_type = content_type.to_string().into();
        let upload_type = UploadType::Simple(media);

        self.client
            .upload_object(
                &UploadObjectRequest {
                    bucket: self.real_bucket(bucket),
                    ..Default::default()
                },
                data,
                &upload_type,
            )
            .await
            .map_err(|e| Error::storage(format!("Failed to upload to GCS: {}", e)))?;

        Ok(self.public_url(bucket, path))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        self.client
            .download_object(
                &GetObjectRequest {
                    bucket: self.real_bucket(bucket),
                    object: path.to_string(),
                    ..Default::default()
                },
                &Range::default(),
            )
            .await
            .map_err(|e| Error::storage(format!("Failed to download from GCS: {}", e)))
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        if !response.status().is_success() {
            return Err(Error::storage(format!(
                "Artifact fetch returned {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        // Idempotent: a missing object is not an error
        let _ = self
            .client
            .delete_object(&DeleteObjectRequest {
                bucket: self.real_bucket(bucket),
                object: path.to_string(),
                ..Default::default()
            })
            .await;

        Ok(())
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let real_bucket = self.real_bucket(bucket);

        let objects = self
            .client
            .list_objects(&ListObjectsRequest {
                bucket: real_bucket.clone(),
                prefix: Some(prefix.to_string()),
                ..Default::default()
            })
            .await
            .map_err(|e| Error::storage(format!("Failed to list GCS objects: {}", e)))?;

        let mut deleted = 0;
        for item in objects.items.unwrap_or_default() {
            let _ = self
                .client
                .delete_object(&DeleteObjectRequest {
                    bucket: real_bucket.clone(),
                    object: item.name.clone(),
                    ..Default::default()
                })
                .await;
            deleted += 1;
        }

        Ok(deleted)
    }

    async fn health_check(&self) -> Result<bool> {
        self.client
            .list_objects(&ListObjectsRequest {
                bucket: self.real_bucket(super::PROCESSED_BUCKET),
                max_results: Some(1),
                ..Default::default()
            })
            .await
            .map(|_| true)
            .map_err(|e| Error::storage(format!("GCS health check failed: {}", e)))
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
