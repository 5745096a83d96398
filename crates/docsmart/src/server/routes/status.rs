//! Job status projection

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::storage::JobStatus;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub job_id: Uuid,
}

/// Read-only projection of the job record
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /process-pdf?jobId=... - poll a job
pub async fn job_status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>> {
    let job = state
        .store()
        .get(query.job_id)?
        .ok_or_else(|| Error::JobNotFound(query.job_id.to_string()))?;

    let download_link = (job.status == JobStatus::Succeeded)
        .then(|| format!("/download-proxied-file?jobId={}", job.id));

    Ok(Json(StatusResponse {
        status: job.status,
        progress: job.progress,
        output_file_name: job.file_name,
        download_link,
        error: job.error_message,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatsResponse {
    pub pending: usize,
    pub in_progress: usize,
    pub worker_count: usize,
}

/// GET /queue-stats - queue depth snapshot
pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStatsResponse>> {
    let counts = state.store().queue_counts()?;

    Ok(Json(QueueStatsResponse {
        pending: counts.pending,
        in_progress: counts.in_progress,
        worker_count: state.config().worker.workers(),
    }))
}
