//! API routes for the job service

pub mod download;
pub mod status;
pub mod submit;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Submission (multipart, larger body limit) and status polling
        .route(
            "/process-pdf",
            post(submit::submit_job)
                .get(status::job_status)
                .layer(DefaultBodyLimit::max(max_upload_size)),
        )
        // Download lifecycle
        .route("/download-proxied-file", get(download::download_proxied_file))
        .route("/file-size", get(download::file_size))
        .route("/delete-processed-file", delete(download::delete_processed_file))
        // Queue depth
        .route("/queue-stats", get(status::queue_stats))
}
