//! Job submission endpoint

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

use crate::artifact::{raw_input_path, RAW_INPUTS_BUCKET};
use crate::error::{Error, Result};
use crate::server::state::AppState;
use crate::storage::NewJob;
use crate::tools::{self, ToolId};

/// Response from job submission
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    pub job_id: Uuid,
    pub status_check_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_wait_time_seconds: Option<u64>,
}

/// POST /process-pdf - validate, store raw inputs, enqueue the job
pub async fn submit_job(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let mut tool_id: Option<String> = None;
    let mut options = serde_json::Value::Object(Default::default());
    let mut files: Vec<(String, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::invalid(format!("failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "toolId" => {
                tool_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| Error::invalid(format!("failed to read toolId: {}", e)))?,
                );
            }
            "options" => {
                let raw = field
                    .text()
                    .await
                    .map_err(|e| Error::invalid(format!("failed to read options: {}", e)))?;
                options = serde_json::from_str(&raw)
                    .map_err(|e| Error::invalid(format!("options is not valid JSON: {}", e)))?;
            }
            _ => {
                // Every remaining field carrying a filename is an input file
                let Some(filename) = field.file_name().map(sanitize_filename) else {
                    continue;
                };
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::invalid(format!("failed to read file {}: {}", filename, e)))?;
                if data.is_empty() {
                    return Err(Error::invalid(format!("file {} is empty", filename)));
                }
                files.push((filename, data.to_vec()));
            }
        }
    }

    let tool: ToolId = tool_id
        .ok_or_else(|| Error::invalid("missing toolId"))?
        .parse()?;
    if files.is_empty() {
        return Err(Error::invalid("no input files provided"));
    }

    // Validation never reaches the worker: arity and options are checked
    // before anything is stored.
    tools::validate_submission(tool, files.len(), &options)?;

    let job_id = Uuid::new_v4();

    let mut input_paths = Vec::with_capacity(files.len());
    let mut seen_names = HashSet::new();
    for (i, (filename, data)) in files.into_iter().enumerate() {
        let stored_name = if seen_names.insert(filename.clone()) {
            filename.clone()
        } else {
            format!("{}_{}", i, filename)
        };
        let path = raw_input_path(job_id, &stored_name);
        let content_type = mime_guess::from_path(&filename)
            .first_or_octet_stream()
            .to_string();

        tracing::debug!(job = %job_id, "storing raw input {} ({} bytes)", stored_name, data.len());
        state
            .artifacts()
            .upload(RAW_INPUTS_BUCKET, &path, data, &content_type)
            .await?;
        input_paths.push(path);
    }

    state.store().insert_pending(&NewJob {
        id: job_id,
        tool_id: tool,
        input_file_paths: input_paths,
        options,
    })?;

    let counts = state.store().queue_counts()?;
    let queue_position = counts.pending;
    let eta = queue_position as u64 * state.config().worker.average_job_time_secs;

    tracing::info!(job = %job_id, tool = %tool, position = queue_position, "job queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitResponse {
            success: true,
            job_id,
            status_check_link: format!("/process-pdf?jobId={}", job_id),
            queue_position: Some(queue_position),
            estimated_wait_time_seconds: Some(eta),
        }),
    ))
}

/// Keep only the final path component of a client-supplied filename
fn sanitize_filename(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    if base.is_empty() {
        format!("file_{}.bin", Uuid::new_v4())
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("dir/nested.pdf"), "nested.pdf");
        assert!(sanitize_filename("").starts_with("file_"));
    }
}
