//! Application state for the job service

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

use crate::artifact::{
    job_prefix, ArtifactStore, GcsArtifactStore, LocalArtifactStore, PROCESSED_BUCKET,
    RAW_INPUTS_BUCKET,
};
use crate::config::{ArtifactBackend, DocsmartConfig};
use crate::error::{Error, Result};
use crate::processing::{RetentionSweeper, Worker};
use crate::storage::{AccessOutcome, JobStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: DocsmartConfig,
    store: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    shutdown: watch::Sender<bool>,
    background_started: AtomicBool,
}

impl AppState {
    /// Create the state and start the worker fleet and retention sweeper
    pub async fn new(config: DocsmartConfig) -> Result<Self> {
        tracing::info!("Initializing job service state...");

        let store = Arc::new(JobStore::open(&config.storage.db_path)?);
        tracing::info!("Job table ready at {}", config.storage.db_path.display());

        let artifacts: Arc<dyn ArtifactStore> = match &config.storage.backend {
            ArtifactBackend::Local { root } => Arc::new(LocalArtifactStore::new(root.clone())?),
            ArtifactBackend::Gcs { bucket_prefix } => {
                Arc::new(GcsArtifactStore::new(bucket_prefix.clone()).await?)
            }
        };
        tracing::info!("Artifact store initialized ({})", artifacts.name());

        let (shutdown, _) = watch::channel(false);

        let state = Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                artifacts,
                shutdown,
                background_started: AtomicBool::new(false),
            }),
        };

        state.start_background();
        Ok(state)
    }

    /// Spawn the worker fleet and the sweeper; idempotent, a second call is
    /// a no-op.
    pub fn start_background(&self) {
        if self.inner.background_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let worker_count = self.inner.config.worker.workers();
        for i in 0..worker_count {
            let worker = Worker::new(
                i,
                self.inner.store.clone(),
                self.inner.artifacts.clone(),
                self.inner.config.worker.clone(),
            );
            tokio::spawn(worker.run(self.inner.shutdown.subscribe()));
        }
        tracing::info!("Started {} worker(s)", worker_count);

        let sweeper = RetentionSweeper::new(
            self.inner.store.clone(),
            self.inner.artifacts.clone(),
            self.inner.config.retention.clone(),
        );
        tokio::spawn(sweeper.run(self.inner.shutdown.subscribe()));
    }

    /// Signal workers and the sweeper to stop
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    pub fn config(&self) -> &DocsmartConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    pub fn artifacts(&self) -> &Arc<dyn ArtifactStore> {
        &self.inner.artifacts
    }

    /// Gate one proxied download: atomically bump the access count; once the
    /// cap is reached, delete the artifact first and the row second, then
    /// report the job gone. Concurrent callers past the cap all land in the
    /// exceeded branch and the deletes are idempotent.
    pub async fn record_download_access(&self, job_id: Uuid) -> Result<u32> {
        let threshold = self.inner.config.retention.access_threshold;

        match self.inner.store.increment_access(job_id, threshold)? {
            AccessOutcome::Granted(count) => Ok(count),
            AccessOutcome::Exceeded => {
                tracing::info!(job = %job_id, "access cap reached, removing artifact");
                self.delete_job_artifacts(job_id).await?;
                self.inner.store.delete(job_id)?;
                Err(Error::Gone(format!(
                    "job {} reached its download limit",
                    job_id
                )))
            }
        }
    }

    /// Remove every artifact belonging to a job; idempotent
    pub async fn delete_job_artifacts(&self, job_id: Uuid) -> Result<()> {
        let prefix = job_prefix(job_id);
        self.inner
            .artifacts
            .delete_prefix(PROCESSED_BUCKET, &prefix)
            .await?;
        self.inner
            .artifacts
            .delete_prefix(RAW_INPUTS_BUCKET, &prefix)
            .await?;
        Ok(())
    }

    pub async fn is_ready(&self) -> bool {
        self.inner.artifacts.health_check().await.unwrap_or(false)
    }
}
