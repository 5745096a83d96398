//! docsmart: multi-tenant document-processing job service
//!
//! Clients submit a tool request with one or more input files; the service
//! durably enqueues a job, a fleet of workers picks up pending jobs, runs the
//! requested transformation (PDF manipulation, conversion, compression,
//! security), stores the result in object storage, and exposes a
//! status/download lifecycle with bounded retention.

pub mod artifact;
pub mod config;
pub mod error;
pub mod processing;
pub mod server;
pub mod storage;
pub mod tools;

pub use config::DocsmartConfig;
pub use error::{Error, Result};
pub use storage::{JobRecord, JobStatus, JobStore};
pub use tools::ToolId;
