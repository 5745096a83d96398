//! Proxied download, size reporting and explicit deletion

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::server::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobQuery {
    pub job_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSizeQuery {
    pub file_id: Uuid,
}

/// GET /download-proxied-file?jobId=... - stream the artifact and record one
/// access; 404 when the job or its output is missing, 410 once the access
/// cap has been reached.
pub async fn download_proxied_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<(HeaderMap, Vec<u8>)> {
    let job = state
        .store()
        .get(query.job_id)?
        .ok_or_else(|| Error::JobNotFound(query.job_id.to_string()))?;

    let (Some(public_url), Some(file_name)) = (job.public_url.clone(), job.file_name.clone())
    else {
        return Err(Error::JobNotFound(query.job_id.to_string()));
    };

    // Atomic gate: bumps the counter or, past the cap, removes artifact and
    // row and reports the job gone.
    let access_count = state.record_download_access(job.id).await?;
    tracing::info!(job = %job.id, access = access_count, "proxied download");

    let data = state.artifacts().fetch_url(&public_url).await?;

    let content_type = mime_guess::from_path(&file_name)
        .first_or_octet_stream()
        .to_string();

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name))
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    Ok((headers, data))
}

#[derive(Debug, Serialize)]
pub struct FileSizeResponse {
    pub file_size_mb: f64,
}

/// GET /file-size?fileId=... - output size in MB, rounded to two decimals
pub async fn file_size(
    State(state): State<AppState>,
    Query(query): Query<FileSizeQuery>,
) -> Result<Json<FileSizeResponse>> {
    let job = state
        .store()
        .get(query.file_id)?
        .ok_or_else(|| Error::JobNotFound(query.file_id.to_string()))?;

    let file_size_mb = job
        .file_size_mb()
        .ok_or_else(|| Error::JobNotFound(query.file_id.to_string()))?;

    Ok(Json(FileSizeResponse { file_size_mb }))
}

/// DELETE /delete-processed-file?jobId=... - delete artifact and row;
/// idempotent success.
pub async fn delete_processed_file(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<serde_json::Value>> {
    state.delete_job_artifacts(query.job_id).await?;
    let existed = state.store().delete(query.job_id)?;

    tracing::info!(job = %query.job_id, existed, "processed file deleted");

    Ok(Json(json!({ "success": true })))
}
