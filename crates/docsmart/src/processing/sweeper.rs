//! Retention sweeper: reclaims aged terminal jobs and their artifacts

use std::sync::Arc;
use tokio::sync::watch;

use crate::artifact::{job_prefix, ArtifactStore, PROCESSED_BUCKET, RAW_INPUTS_BUCKET};
use crate::config::RetentionConfig;
use crate::error::Result;
use crate::storage::JobStore;

pub struct RetentionSweeper {
    store: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    config: RetentionConfig,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: RetentionConfig,
    ) -> Self {
        Self {
            store,
            artifacts,
            config,
        }
    }

    /// Tick every `cleanup_interval` until shutdown
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            "Retention sweeper started (retention {}s, tick {}s)",
            self.config.retention_secs,
            self.config.cleanup_interval_secs
        );

        let mut ticker = tokio::time::interval(self.config.cleanup_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }

            match self.sweep_once().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Swept {} expired job(s)", n),
                Err(e) => tracing::error!("Sweep failed: {}", e),
            }
        }

        tracing::info!("Retention sweeper stopped");
    }

    /// One sweep pass: for each terminal job past retention, delete its
    /// artifacts first and the row second, so a crash in between leaves
    /// only a row the next pass resolves. Non-terminal jobs are never
    /// touched regardless of age.
    pub async fn sweep_once(&self) -> Result<usize> {
        let expired = self
            .store
            .sweep_terminal_older_than(self.config.retention())?;

        let mut swept = 0;
        for job in expired {
            let prefix = job_prefix(job.id);

            if let Err(e) = self.artifacts.delete_prefix(PROCESSED_BUCKET, &prefix).await {
                tracing::warn!(job = %job.id, "output cleanup failed: {}", e);
                continue;
            }
            // Raw inputs are normally deleted by the worker; this covers
            // orphans from crashes mid-job.
            if let Err(e) = self.artifacts.delete_prefix(RAW_INPUTS_BUCKET, &prefix).await {
                tracing::warn!(job = %job.id, "raw input cleanup failed: {}", e);
                continue;
            }

            self.store.delete(job.id)?;
            tracing::debug!(job = %job.id, status = job.status.as_str(), "job swept");
            swept += 1;
        }

        Ok(swept)
    }
}
