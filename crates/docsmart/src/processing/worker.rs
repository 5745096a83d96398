//! Background worker: claim, download, dispatch, upload, update, cleanup
//!
//! One worker owns one job from claim to terminal state; handler subprocess
//! calls block that worker. Parallelism comes from running several workers,
//! each with its own poll loop against the shared job table.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use crate::artifact::{self, ArtifactStore, PROCESSED_BUCKET, RAW_INPUTS_BUCKET};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::storage::{JobRecord, JobStore, StatusUpdate};
use crate::tools::{self, ToolContext};

/// Grace on top of the tool's own deadline before the whole handler future
/// is abandoned
const HANDLER_TIMEOUT_GRACE: Duration = Duration::from_secs(15);

const SUCCESS_UPDATE_RETRIES: u32 = 3;

pub struct Worker {
    worker_id: String,
    store: Arc<JobStore>,
    artifacts: Arc<dyn ArtifactStore>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        index: usize,
        store: Arc<JobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            worker_id: format!("worker-{}-{}", std::process::id(), index),
            store,
            artifacts,
            config,
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Poll loop: claim the oldest pending job or sleep `poll_interval`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("Worker {} started", self.worker_id);

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.process_one().await {
                Ok(true) => {}
                Ok(false) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.poll_interval()) => {}
                        _ = shutdown.changed() => {}
                    }
                }
                Err(e) => {
                    tracing::error!("Worker {} claim failed: {}", self.worker_id, e);
                    tokio::time::sleep(self.config.poll_interval()).await;
                }
            }
        }

        tracing::info!("Worker {} stopped", self.worker_id);
    }

    /// Claim and fully process at most one job; returns whether one was claimed
    pub async fn process_one(&self) -> Result<bool> {
        let Some(job) = self.store.claim_next(&self.worker_id)? else {
            return Ok(false);
        };
        self.process(job).await;
        Ok(true)
    }

    /// Drive one claimed job to a terminal state. Every error is caught here
    /// and recorded on the job; raw inputs are deleted on both paths.
    async fn process(&self, job: JobRecord) {
        let job_id = job.id;
        tracing::info!(job = %job_id, tool = %job.tool_id, worker = %self.worker_id, "processing job");

        match self.process_inner(&job).await {
            Ok(()) => {
                tracing::info!(job = %job_id, "job succeeded");
            }
            Err(e) => {
                let message = tools::truncate(&e.to_string(), 1000);
                tracing::error!(job = %job_id, "job failed: {}", message);
                if let Err(update_err) = self
                    .store
                    .update_progress(job_id, StatusUpdate::failed(message))
                {
                    tracing::error!(job = %job_id, "failed to record failure: {}", update_err);
                }
            }
        }

        for path in &job.input_file_paths {
            if let Err(e) = self.artifacts.delete(RAW_INPUTS_BUCKET, path).await {
                tracing::warn!(job = %job_id, "raw input cleanup failed for {}: {}", path, e);
            }
        }
    }

    async fn process_inner(&self, job: &JobRecord) -> Result<()> {
        let scratch = ScratchDir::create(job.id)?;
        self.store.update_progress(job.id, StatusUpdate::progress(10))?;

        let inputs = self.download_inputs(job, scratch.path()).await?;
        self.store.update_progress(job.id, StatusUpdate::progress(20))?;

        let output = self.dispatch_handler(job, scratch.path(), inputs).await?;
        self.store.update_progress(job.id, StatusUpdate::progress(80))?;

        let final_name =
            tools::final_output_name(job.id, &output.file_name_base, output.extension);
        let output_path = artifact::output_path(job.id, &final_name);
        let file_size = output.data.len() as u64;

        // The path is deterministic from the job id, so a retried upload
        // after a crash lands on the same object.
        let public_url = self
            .artifacts
            .upload(PROCESSED_BUCKET, &output_path, output.data, output.mime_type)
            .await?;

        tracing::info!(job = %job.id, name = %final_name, bytes = file_size, "output uploaded");

        self.record_success(job.id, final_name, public_url, file_size)
            .await
    }

    async fn download_inputs(&self, job: &JobRecord, scratch: &Path) -> Result<Vec<PathBuf>> {
        let total = job.input_file_paths.len();
        let mut inputs = Vec::with_capacity(total);

        for (i, path) in job.input_file_paths.iter().enumerate() {
            let data = self.artifacts.download(RAW_INPUTS_BUCKET, path).await?;

            let name = Path::new(path)
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("input.bin");
            let local = scratch.join(format!("{:02}_{}", i, name));
            tokio::fs::write(&local, data).await?;
            inputs.push(local);

            // Downloads ramp progress from 10 to 20
            let pct = 10 + ((i + 1) * 10 / total) as u8;
            self.store.update_progress(job.id, StatusUpdate::progress(pct))?;
        }

        Ok(inputs)
    }

    async fn dispatch_handler(
        &self,
        job: &JobRecord,
        scratch: &Path,
        inputs: Vec<PathBuf>,
    ) -> Result<tools::ToolOutput> {
        let tool = job.tool_id;
        let timeout = if tool.is_office_conversion() {
            Duration::from_secs(self.config.office_timeout_secs)
        } else {
            Duration::from_secs(self.config.tool_timeout_secs)
        };

        // Handler progress ticks write through to the repository, clamped to
        // the 20-80 band and kept monotone so a late tick can never move the
        // job backwards.
        let job_id = job.id;
        let sink_store = self.store.clone();
        let last_progress = Arc::new(AtomicU8::new(20));
        let progress_sink = Box::new(move |pct: u8| {
            let pct = pct.clamp(20, 80);
            let prev = last_progress.fetch_max(pct, Ordering::SeqCst);
            if pct > prev {
                if let Err(e) = sink_store.update_progress(job_id, StatusUpdate::progress(pct)) {
                    tracing::warn!(job = %job_id, "progress tick dropped: {}", e);
                }
            }
        });

        let ctx = ToolContext::new(scratch.to_path_buf(), timeout, progress_sink);
        let options = job.options.clone();
        let handler =
            tokio::task::spawn_blocking(move || tools::dispatch(tool, &ctx, &inputs, &options));

        match tokio::time::timeout(timeout + HANDLER_TIMEOUT_GRACE, handler).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::Internal(format!(
                "handler for {} panicked: {}",
                tool, join_err
            ))),
            Err(_) => Err(Error::Timeout {
                tool: tool.to_string(),
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Success update with retry: if the upload landed but this update keeps
    /// failing, the job stays in_progress and the sweeper reclaims the
    /// orphan artifact later.
    async fn record_success(
        &self,
        job_id: Uuid,
        file_name: String,
        public_url: String,
        file_size: u64,
    ) -> Result<()> {
        let update = StatusUpdate::succeeded(file_name, public_url, file_size);

        let mut attempt = 0;
        loop {
            match self.store.update_progress(job_id, update.clone()) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < SUCCESS_UPDATE_RETRIES => {
                    attempt += 1;
                    tracing::warn!(
                        job = %job_id,
                        "success update failed (attempt {}): {}",
                        attempt,
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Per-job scratch directory, removed on every exit path by `Drop`
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(job_id: Uuid) -> Result<Self> {
        let path = std::env::temp_dir().join(format!("docsmart-{}", job_id));
        std::fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
