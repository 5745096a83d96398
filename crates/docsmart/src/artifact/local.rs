//! Local filesystem artifact store

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::ArtifactStore;

/// Filesystem-backed artifact store; buckets map to subdirectories of the
/// root and public URLs use the `file://` scheme.
pub struct LocalArtifactStore {
    root: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, bucket: &str, path: &str) -> PathBuf {
        let mut full = self.root.join(bucket);
        // Artifact paths are service-generated, but never let a crafted
        // segment escape the root.
        for part in Path::new(path).components() {
            if let std::path::Component::Normal(seg) = part {
                full.push(seg);
            }
        }
        full
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Vec<u8>,
        _content_type: &str,
    ) -> Result<String> {
        let full = self.blob_path(bucket, path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data).await?;

        Ok(format!("file://{}", full.display()))
    }

    async fn download(&self, bucket: &str, path: &str) -> Result<Vec<u8>> {
        let full = self.blob_path(bucket, path);
        tokio::fs::read(&full)
            .await
            .map_err(|e| Error::storage(format!("Failed to read {}/{}: {}", bucket, path, e)))
    }

    async fn fetch_url(&self, url: &str) -> Result<Vec<u8>> {
        let path = url
            .strip_prefix("file://")
            .ok_or_else(|| Error::storage(format!("not a local artifact URL: {}", url)))?;
        tokio::fs::read(path)
            .await
            .map_err(|e| Error::storage(format!("Failed to read {}: {}", path, e)))
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<()> {
        let full = self.blob_path(bucket, path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage(format!(
                "Failed to delete {}/{}: {}",
                bucket, path, e
            ))),
        }
    }

    async fn delete_prefix(&self, bucket: &str, prefix: &str) -> Result<usize> {
        let dir = self.blob_path(bucket, prefix.trim_end_matches('/'));
        if !dir.exists() {
            return Ok(0);
        }

        let mut deleted = 0;
        let mut stack = vec![dir.clone()];
        while let Some(current) = stack.pop() {
            let mut entries = tokio::fs::read_dir(&current).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    tokio::fs::remove_file(&path).await?;
                    deleted += 1;
                }
            }
        }
        let _ = tokio::fs::remove_dir_all(&dir).await;

        Ok(deleted)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(self.root.exists())
    }

    fn name(&self) -> &str {
        "local-fs"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> LocalArtifactStore {
        let root = std::env::temp_dir().join(format!("docsmart-store-test-{}", Uuid::new_v4()));
        LocalArtifactStore::new(root).unwrap()
    }

    #[tokio::test]
    async fn test_upload_download_roundtrip() {
        let store = temp_store();
        let url = store
            .upload("processed-pdfs", "public/j1/out.pdf", b"%PDF-".to_vec(), "application/pdf")
            .await
            .unwrap();

        assert!(url.starts_with("file://"));
        assert_eq!(
            store.download("processed-pdfs", "public/j1/out.pdf").await.unwrap(),
            b"%PDF-"
        );
        assert_eq!(store.fetch_url(&url).await.unwrap(), b"%PDF-");
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = temp_store();
        store
            .upload("raw-inputs", "public/j1/raw/a.pdf", vec![1, 2, 3], "application/pdf")
            .await
            .unwrap();

        store.delete("raw-inputs", "public/j1/raw/a.pdf").await.unwrap();
        store.delete("raw-inputs", "public/j1/raw/a.pdf").await.unwrap();
        assert!(store.download("raw-inputs", "public/j1/raw/a.pdf").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_prefix() {
        let store = temp_store();
        for name in ["a.pdf", "b.pdf"] {
            store
                .upload(
                    "raw-inputs",
                    &format!("public/j2/raw/{}", name),
                    vec![0u8; 4],
                    "application/pdf",
                )
                .await
                .unwrap();
        }

        assert_eq!(store.delete_prefix("raw-inputs", "public/j2/").await.unwrap(), 2);
        assert_eq!(store.delete_prefix("raw-inputs", "public/j2/").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_path_segments_cannot_escape_root() {
        let store = temp_store();
        let url = store
            .upload("raw-inputs", "public/../../etc/passwd", b"x".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(url.contains("raw-inputs"));
    }
}
