//! Object storage for raw inputs and processed outputs
//!
//! Artifacts are opaque blobs addressed by `(bucket, path)`. Blobs are
//! immutable once written at a deterministic path; deletes are idempotent.

mod gcs;
mod local;

pub use gcs::GcsArtifactStore;
pub use local::LocalArtifactStore;

use async_trait::async_trait;

use crate::error::Result;

/// Bucket holding raw submitted inputs (`public/{job_id}/raw/{original_name}`)
pub const RAW_INPUTS_BUCKET: &str = "raw-inputs";

/// Bucket holding processed outputs (`public/{job_id}/{final_name}`)
pub const PROCESSED_BUCKET: &str = "processed-pdfs";

/// Trait for artifact storage
///
/// Implementations:
/// - `LocalArtifactStore`: local filesystem (single node, tests)
/// - `GcsArtifactStore`: Google Cloud Storage
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload a blob, returning its public URL
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String>;

    /// Download a blob by address
    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>>;

    /// Fetch a blob by the public URL previously returned from `upload`
    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>>;

    /// Delete a blob; idempotent
    async fn delete(&self, bucket: &str, path: &str) -> Result<()>;

    /// Delete every blob under a prefix; idempotent, returns deleted count
    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

/// Raw-input path for one submitted file
pub fn raw_input_path(job_id: uuid::Uuid, original_name: &str) -> String {
    format!("public/{}/raw/{}", job_id, original_name)
}

/// Prefix holding every blob belonging to one job
pub fn job_prefix(job_id: uuid::Uuid) -> String {
    format!("public/{}/", job_id)
}

/// Output path for the processed artifact
pub fn output_path(job_id: uuid::Uuid, final_name: &str) -> String {
    format!("public/{}/{}", job_id, final_name)
}
