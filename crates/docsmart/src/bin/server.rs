//! Job service binary
//!
//! Run with: cargo run -p docsmart --bin docsmart-server

use docsmart::config::{ArtifactBackend, DocsmartConfig};
use docsmart::server::DocsmartServer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docsmart=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config_from_env();

    tracing::info!("Configuration loaded");
    tracing::info!("  - Workers: {}", config.worker.workers());
    tracing::info!("  - Poll interval: {}s", config.worker.poll_interval_secs);
    tracing::info!("  - Retention: {}s", config.retention.retention_secs);
    tracing::info!("  - Access threshold: {}", config.retention.access_threshold);
    tracing::info!("  - Job table: {}", config.storage.db_path.display());

    let server = DocsmartServer::new(config).await?;

    println!("\nServer starting...");
    println!("  API:    http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("\nEndpoints:");
    println!("  POST   /process-pdf           - Submit a job");
    println!("  GET    /process-pdf?jobId=    - Poll job status");
    println!("  GET    /download-proxied-file - Download the output");
    println!("  GET    /file-size?fileId=     - Output size in MB");
    println!("  DELETE /delete-processed-file - Delete output and job");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}

/// Defaults plus a few environment overrides for deployment
fn config_from_env() -> DocsmartConfig {
    let mut config = DocsmartConfig::default();

    if let Ok(host) = std::env::var("DOCSMART_HOST") {
        config.server.host = host;
    }
    if let Ok(port) = std::env::var("DOCSMART_PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
    if let Ok(dir) = std::env::var("DOCSMART_DATA_DIR") {
        let dir = std::path::PathBuf::from(dir);
        config.storage.db_path = dir.join("jobs.db");
        config.storage.backend = ArtifactBackend::Local {
            root: dir.join("artifacts"),
        };
    }
    if let Ok(prefix) = std::env::var("DOCSMART_GCS_BUCKET_PREFIX") {
        config.storage.backend = ArtifactBackend::Gcs {
            bucket_prefix: prefix,
        };
    }
    if let Ok(workers) = std::env::var("DOCSMART_WORKERS") {
        if let Ok(workers) = workers.parse() {
            config.worker.worker_count = Some(workers);
        }
    }

    config
}
