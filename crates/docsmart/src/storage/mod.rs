//! Durable job storage

mod job_store;

pub use job_store::{
    AccessOutcome, JobRecord, JobStatus, JobStore, NewJob, QueueCounts, StatusUpdate,
};
