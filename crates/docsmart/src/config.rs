//! Configuration for the job service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsmartConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Storage configuration (job table + artifact backend)
    pub storage: StorageConfig,
    /// Worker fleet configuration
    pub worker: WorkerConfig,
    /// Retention / access-cap configuration
    pub retention: RetentionConfig,
}

impl Default for DocsmartConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            storage: StorageConfig::default(),
            worker: WorkerConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Maximum upload size in bytes (default: 100MB)
    pub max_upload_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            enable_cors: true,
            max_upload_size: 100 * 1024 * 1024,
        }
    }
}

/// Artifact store backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ArtifactBackend {
    /// Local filesystem store rooted at `root` (single-node deployments, tests)
    Local { root: PathBuf },
    /// Google Cloud Storage; bucket names carry the `raw-inputs` /
    /// `processed-pdfs` layout as prefixes of `bucket_prefix`
    Gcs { bucket_prefix: String },
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite job table
    pub db_path: PathBuf,
    /// Artifact store backend
    pub backend: ArtifactBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = std::env::temp_dir().join("docsmart-data");
        Self {
            db_path: data_dir.join("jobs.db"),
            backend: ArtifactBackend::Local {
                root: data_dir.join("artifacts"),
            },
        }
    }
}

/// Worker fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of worker tasks (default: CPU count, capped at 4)
    pub worker_count: Option<usize>,
    /// Sleep between polls when the queue is empty, in seconds (default: 5)
    pub poll_interval_secs: u64,
    /// Soft timeout for conversion/compression handlers, in seconds (default: 300)
    pub tool_timeout_secs: u64,
    /// Soft timeout for Office conversions, in seconds (default: 600)
    pub office_timeout_secs: u64,
    /// ETA multiplier: assumed seconds per queued job (default: 30)
    pub average_job_time_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            poll_interval_secs: 5,
            tool_timeout_secs: 300,
            office_timeout_secs: 600,
            average_job_time_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// Resolved worker count
    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or_else(|| num_cpus::get().min(4))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Retention and access-cap configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age at which terminal jobs are swept, in seconds (default: 600)
    pub retention_secs: u64,
    /// Sweeper tick, in seconds (default: 600)
    pub cleanup_interval_secs: u64,
    /// Maximum successful downloads per artifact (default: 3)
    pub access_threshold: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention_secs: 600,
            cleanup_interval_secs: 600,
            access_threshold: 3,
        }
    }
}

impl RetentionConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}
