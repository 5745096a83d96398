//! SQLite-backed job repository
//!
//! The job table is the single source of truth for the whole fleet: workers,
//! the download gate and the sweeper all mutate jobs exclusively through the
//! primitives here. `claim_next` and `increment_access` are the only
//! read-modify-write operations and run as single transactions serialized by
//! the connection mutex.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::tools::ToolId;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(Error::database(format!("unknown job status '{}'", other))),
        }
    }
}

impl Default for JobStatus {
    fn default() -> Self {
        JobStatus::Pending
    }
}

/// A job row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub tool_id: ToolId,
    pub status: JobStatus,
    pub progress: u8,
    /// Artifact-store paths of the raw inputs, in submission order
    pub input_file_paths: Vec<String>,
    /// Tool-specific options envelope, read-only after submit
    pub options: serde_json::Value,
    pub file_name: Option<String>,
    pub public_url: Option<String>,
    pub file_size: Option<u64>,
    pub access_count: u32,
    pub worker_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Output size in MB, rounded to two decimals
    pub fn file_size_mb(&self) -> Option<f64> {
        self.file_size
            .map(|b| (b as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0)
    }
}

/// Fields of a freshly submitted job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub id: Uuid,
    pub tool_id: ToolId,
    pub input_file_paths: Vec<String>,
    pub options: serde_json::Value,
}

/// Partial update applied by workers
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub file_name: Option<String>,
    pub public_url: Option<String>,
    pub file_size: Option<u64>,
    pub error_message: Option<String>,
}

impl StatusUpdate {
    pub fn progress(progress: u8) -> Self {
        Self {
            status: JobStatus::InProgress,
            progress,
            ..Default::default()
        }
    }

    pub fn succeeded(file_name: String, public_url: String, file_size: u64) -> Self {
        Self {
            status: JobStatus::Succeeded,
            progress: 100,
            file_name: Some(file_name),
            public_url: Some(public_url),
            file_size: Some(file_size),
            error_message: None,
        }
    }

    pub fn failed(error_message: String) -> Self {
        Self {
            status: JobStatus::Failed,
            progress: 0,
            error_message: Some(error_message),
            ..Default::default()
        }
    }
}

/// Outcome of the atomic access-count bump
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    /// Download permitted; carries the post-increment count
    Granted(u32),
    /// Access cap reached; caller must delete the artifact, then the row
    Exceeded,
}

/// Queue depth snapshot for ETA estimates
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub in_progress: usize,
}

/// SQLite-backed job repository
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    /// Create or open the job table at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::database(format!("Failed to create db dir: {}", e)))?;
        }
        let conn = Connection::open(path)
            .map_err(|e| Error::database(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    /// Create an in-memory job table (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::database(format!("Failed to open in-memory database: {}", e)))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                tool_id TEXT NOT NULL,
                status TEXT NOT NULL,
                progress INTEGER NOT NULL DEFAULT 0,
                input_file_paths TEXT NOT NULL,
                options TEXT NOT NULL,
                file_name TEXT,
                public_url TEXT,
                file_size INTEGER,
                access_count INTEGER NOT NULL DEFAULT 0,
                worker_id TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status_created ON jobs(status, created_at);
        "#,
        )
        .map_err(|e| Error::database(format!("Failed to run migrations: {}", e)))?;

        tracing::debug!("Job table migrations complete");
        Ok(())
    }

    /// Insert a freshly submitted job with `status=pending, progress=0,
    /// access_count=0`
    pub fn insert_pending(&self, job: &NewJob) -> Result<JobRecord> {
        let conn = self.conn.lock();
        let now = Utc::now();

        conn.execute(
            r#"
            INSERT INTO jobs (
                id, tool_id, status, progress, input_file_paths, options,
                access_count, created_at, updated_at
            ) VALUES (?1, ?2, 'pending', 0, ?3, ?4, 0, ?5, ?5)
            "#,
            params![
                job.id.to_string(),
                job.tool_id.as_str(),
                serde_json::to_string(&job.input_file_paths)?,
                serde_json::to_string(&job.options)?,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::database(format!("Failed to insert job: {}", e)))?;

        Ok(JobRecord {
            id: job.id,
            tool_id: job.tool_id,
            status: JobStatus::Pending,
            progress: 0,
            input_file_paths: job.input_file_paths.clone(),
            options: job.options.clone(),
            file_name: None,
            public_url: None,
            file_size: None,
            access_count: 0,
            worker_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Atomically claim the oldest pending job for `worker_id`.
    ///
    /// Safe under concurrent callers: the select-and-mark runs as one
    /// transaction and the update is guarded on `status = 'pending'`, so no
    /// two workers can observe the same job as claimed.
    pub fn claim_next(&self, worker_id: &str) -> Result<Option<JobRecord>> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::database(format!("Failed to begin claim: {}", e)))?;

        let candidate: Option<String> = tx
            .query_row(
                "SELECT id FROM jobs WHERE status = 'pending' ORDER BY created_at ASC, id ASC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to select pending job: {}", e)))?;

        let Some(id) = candidate else {
            return Ok(None);
        };

        let updated = tx
            .execute(
                "UPDATE jobs SET status = 'in_progress', worker_id = ?1, progress = 0, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
                params![worker_id, Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| Error::database(format!("Failed to claim job: {}", e)))?;

        if updated != 1 {
            // CAS miss: another transaction took it between select and update
            return Ok(None);
        }

        let record = tx
            .query_row("SELECT * FROM jobs WHERE id = ?1", params![id], row_to_job)
            .map_err(|e| Error::database(format!("Failed to read claimed job: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::database(format!("Failed to commit claim: {}", e)))?;

        row_result(record).map(Some)
    }

    /// Apply a partial status/progress update, rejecting transitions that
    /// violate the state-machine invariants.
    pub fn update_progress(&self, job_id: Uuid, update: StatusUpdate) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::database(format!("Failed to begin update: {}", e)))?;

        let current = tx
            .query_row(
                "SELECT status, progress FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                |row| {
                    let status: String = row.get(0)?;
                    let progress: i64 = row.get(1)?;
                    Ok((status, progress))
                },
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to read job: {}", e)))?;

        let Some((status_str, progress)) = current else {
            return Err(Error::JobNotFound(job_id.to_string()));
        };
        let current_status = JobStatus::parse(&status_str)?;

        validate_transition(current_status, progress as u8, &update)?;

        let (progress, file_name, public_url, file_size, error_message) = match update.status {
            JobStatus::Succeeded => (
                100u8,
                update.file_name,
                update.public_url,
                update.file_size,
                None,
            ),
            JobStatus::Failed => (0u8, None, None, None, update.error_message),
            _ => (update.progress, None, None, None, None),
        };

        // Terminal transitions release the claim: worker_id is only ever set
        // while a job is in_progress.
        tx.execute(
            r#"
            UPDATE jobs SET
                status = ?1,
                progress = ?2,
                file_name = COALESCE(?3, file_name),
                public_url = COALESCE(?4, public_url),
                file_size = COALESCE(?5, file_size),
                error_message = COALESCE(?6, error_message),
                worker_id = CASE WHEN ?1 IN ('succeeded', 'failed') THEN NULL ELSE worker_id END,
                updated_at = ?7
            WHERE id = ?8
            "#,
            params![
                update.status.as_str(),
                progress as i64,
                file_name,
                public_url,
                file_size.map(|s| s as i64),
                error_message,
                Utc::now().to_rfc3339(),
                job_id.to_string(),
            ],
        )
        .map_err(|e| Error::database(format!("Failed to update job: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::database(format!("Failed to commit update: {}", e)))?;

        Ok(())
    }

    /// Atomic read-modify-write on the access counter.
    ///
    /// Grants while the pre-increment count is below `threshold` (so the
    /// granted post-increment counts are `1..=threshold`); once the cap is
    /// reached every later call reports `Exceeded` without mutating, and the
    /// caller deletes the artifact first, then the row.
    pub fn increment_access(&self, job_id: Uuid, threshold: u32) -> Result<AccessOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| Error::database(format!("Failed to begin access bump: {}", e)))?;

        let count: Option<i64> = tx
            .query_row(
                "SELECT access_count FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to read access count: {}", e)))?;

        let Some(count) = count else {
            return Err(Error::JobNotFound(job_id.to_string()));
        };

        if count as u32 >= threshold {
            return Ok(AccessOutcome::Exceeded);
        }

        tx.execute(
            "UPDATE jobs SET access_count = access_count + 1, updated_at = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), job_id.to_string()],
        )
        .map_err(|e| Error::database(format!("Failed to bump access count: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::database(format!("Failed to commit access bump: {}", e)))?;

        Ok(AccessOutcome::Granted(count as u32 + 1))
    }

    /// Read-only projection of a job
    pub fn get(&self, job_id: Uuid) -> Result<Option<JobRecord>> {
        let conn = self.conn.lock();

        let record = conn
            .query_row(
                "SELECT * FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                row_to_job,
            )
            .optional()
            .map_err(|e| Error::database(format!("Failed to get job: {}", e)))?;

        record.map(row_result).transpose()
    }

    /// Queue depth for ETA estimates
    pub fn queue_counts(&self) -> Result<QueueCounts> {
        let conn = self.conn.lock();

        let mut count_for = |status: &str| -> Result<usize> {
            conn.query_row(
                "SELECT COUNT(*) FROM jobs WHERE status = ?1",
                params![status],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as usize)
            .map_err(|e| Error::database(format!("Failed to count jobs: {}", e)))
        };

        Ok(QueueCounts {
            pending: count_for("pending")?,
            in_progress: count_for("in_progress")?,
        })
    }

    /// Terminal jobs older than `age`, oldest first. The caller deletes the
    /// artifacts and then calls [`JobStore::delete`] per job.
    pub fn sweep_terminal_older_than(&self, age: Duration) -> Result<Vec<JobRecord>> {
        let conn = self.conn.lock();
        let cutoff = Utc::now()
            - ChronoDuration::from_std(age)
                .map_err(|e| Error::database(format!("Invalid sweep age: {}", e)))?;

        let mut stmt = conn
            .prepare(
                "SELECT * FROM jobs
                 WHERE status IN ('succeeded', 'failed') AND created_at < ?1
                 ORDER BY created_at ASC",
            )
            .map_err(|e| Error::database(format!("Failed to prepare sweep: {}", e)))?;

        let rows = stmt
            .query_map(params![cutoff.to_rfc3339()], row_to_job)
            .map_err(|e| Error::database(format!("Failed to sweep jobs: {}", e)))?
            .filter_map(|r| r.ok())
            .map(row_result)
            .collect::<Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// Delete a job row; idempotent, returns whether a row existed
    pub fn delete(&self, job_id: Uuid) -> Result<bool> {
        let conn = self.conn.lock();

        let count = conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id.to_string()])
            .map_err(|e| Error::database(format!("Failed to delete job: {}", e)))?;

        Ok(count > 0)
    }
}

fn validate_transition(current: JobStatus, current_progress: u8, update: &StatusUpdate) -> Result<()> {
    if current.is_terminal() {
        return Err(Error::database(format!(
            "job is already {} and cannot transition to {}",
            current.as_str(),
            update.status.as_str()
        )));
    }

    match (current, update.status) {
        (JobStatus::Pending, JobStatus::InProgress) => Ok(()),
        (JobStatus::InProgress, JobStatus::InProgress) => {
            // Progress is monotone within a status
            if update.progress < current_progress {
                Err(Error::database(format!(
                    "progress may not decrease ({} -> {})",
                    current_progress, update.progress
                )))
            } else {
                Ok(())
            }
        }
        (JobStatus::InProgress, JobStatus::Succeeded) => {
            if update.file_name.is_none() || update.public_url.is_none() {
                Err(Error::database(
                    "succeeded requires file_name and public_url".to_string(),
                ))
            } else {
                Ok(())
            }
        }
        (JobStatus::InProgress, JobStatus::Failed) => Ok(()),
        (from, to) => Err(Error::database(format!(
            "illegal transition {} -> {}",
            from.as_str(),
            to.as_str()
        ))),
    }
}

// Row mapping: rusqlite's error type inside query closures, converted to the
// crate error at the boundary via `row_result`.

struct RawJob {
    id: String,
    tool_id: String,
    status: String,
    progress: i64,
    input_file_paths: String,
    options: String,
    file_name: Option<String>,
    public_url: Option<String>,
    file_size: Option<i64>,
    access_count: i64,
    worker_id: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<RawJob> {
    Ok(RawJob {
        id: row.get(0)?,
        tool_id: row.get(1)?,
        status: row.get(2)?,
        progress: row.get(3)?,
        input_file_paths: row.get(4)?,
        options: row.get(5)?,
        file_name: row.get(6)?,
        public_url: row.get(7)?,
        file_size: row.get(8)?,
        access_count: row.get(9)?,
        worker_id: row.get(10)?,
        error_message: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn row_result(raw: RawJob) -> Result<JobRecord> {
    Ok(JobRecord {
        id: Uuid::parse_str(&raw.id)
            .map_err(|e| Error::database(format!("corrupt job id '{}': {}", raw.id, e)))?,
        tool_id: raw
            .tool_id
            .parse()
            .map_err(|_| Error::database(format!("unknown tool_id '{}'", raw.tool_id)))?,
        status: JobStatus::parse(&raw.status)?,
        progress: raw.progress as u8,
        input_file_paths: serde_json::from_str(&raw.input_file_paths)?,
        options: serde_json::from_str(&raw.options)?,
        file_name: raw.file_name,
        public_url: raw.public_url,
        file_size: raw.file_size.map(|s| s as u64),
        access_count: raw.access_count as u32,
        worker_id: raw.worker_id,
        error_message: raw.error_message,
        created_at: parse_timestamp(&raw.created_at)?,
        updated_at: parse_timestamp(&raw.updated_at)?,
    })
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::database(format!("corrupt timestamp '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn new_job(tool: ToolId) -> NewJob {
        NewJob {
            id: Uuid::new_v4(),
            tool_id: tool,
            input_file_paths: vec!["public/x/raw/a.pdf".to_string()],
            options: json!({}),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let store = JobStore::in_memory().unwrap();
        let job = new_job(ToolId::Merge);

        store.insert_pending(&job).unwrap();

        let got = store.get(job.id).unwrap().unwrap();
        assert_eq!(got.id, job.id);
        assert_eq!(got.status, JobStatus::Pending);
        assert_eq!(got.progress, 0);
        assert_eq!(got.access_count, 0);
        assert_eq!(got.input_file_paths, job.input_file_paths);
    }

    #[test]
    fn test_claim_is_fifo() {
        let store = JobStore::in_memory().unwrap();
        let first = new_job(ToolId::Merge);
        let second = new_job(ToolId::Compress);
        store.insert_pending(&first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.insert_pending(&second).unwrap();

        let claimed = store.claim_next("w1").unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.status, JobStatus::InProgress);
        assert_eq!(claimed.worker_id.as_deref(), Some("w1"));

        let claimed = store.claim_next("w2").unwrap().unwrap();
        assert_eq!(claimed.id, second.id);

        assert!(store.claim_next("w3").unwrap().is_none());
    }

    #[test]
    fn test_concurrent_claims_are_injective() {
        let store = Arc::new(JobStore::in_memory().unwrap());
        let mut ids = HashSet::new();
        for _ in 0..50 {
            let job = new_job(ToolId::Merge);
            ids.insert(job.id);
            store.insert_pending(&job).unwrap();
        }

        let claimed = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for w in 0..10 {
            let store = store.clone();
            let claimed = claimed.clone();
            handles.push(std::thread::spawn(move || {
                let worker = format!("w{}", w);
                while let Some(job) = store.claim_next(&worker).unwrap() {
                    claimed.lock().push(job.id);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let claimed = claimed.lock();
        assert_eq!(claimed.len(), 50);
        let unique: HashSet<_> = claimed.iter().copied().collect();
        assert_eq!(unique, ids);
    }

    #[test]
    fn test_progress_is_monotone() {
        let store = JobStore::in_memory().unwrap();
        let job = new_job(ToolId::Rotate);
        store.insert_pending(&job).unwrap();
        store.claim_next("w1").unwrap().unwrap();

        store.update_progress(job.id, StatusUpdate::progress(40)).unwrap();
        store.update_progress(job.id, StatusUpdate::progress(40)).unwrap();
        assert!(store.update_progress(job.id, StatusUpdate::progress(20)).is_err());

        let got = store.get(job.id).unwrap().unwrap();
        assert_eq!(got.progress, 40);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let store = JobStore::in_memory().unwrap();
        let job = new_job(ToolId::Split);
        store.insert_pending(&job).unwrap();
        store.claim_next("w1").unwrap().unwrap();
        store
            .update_progress(job.id, StatusUpdate::failed("bad range".to_string()))
            .unwrap();

        let got = store.get(job.id).unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Failed);
        assert_eq!(got.progress, 0);
        assert_eq!(got.error_message.as_deref(), Some("bad range"));
        assert!(got.worker_id.is_none());

        assert!(store.update_progress(job.id, StatusUpdate::progress(50)).is_err());
    }

    #[test]
    fn test_succeeded_requires_output_fields() {
        let store = JobStore::in_memory().unwrap();
        let job = new_job(ToolId::Merge);
        store.insert_pending(&job).unwrap();
        store.claim_next("w1").unwrap().unwrap();

        let bare = StatusUpdate {
            status: JobStatus::Succeeded,
            progress: 100,
            ..Default::default()
        };
        assert!(store.update_progress(job.id, bare).is_err());

        store
            .update_progress(
                job.id,
                StatusUpdate::succeeded(
                    "DocSmart_merged_documents_abcd1234.pdf".to_string(),
                    "file:///tmp/out.pdf".to_string(),
                    2048,
                ),
            )
            .unwrap();

        let got = store.get(job.id).unwrap().unwrap();
        assert_eq!(got.status, JobStatus::Succeeded);
        assert_eq!(got.progress, 100);
        assert_eq!(got.file_size, Some(2048));
        assert_eq!(got.file_size_mb(), Some(0.0));
    }

    #[test]
    fn test_access_counter_boundary() {
        let store = JobStore::in_memory().unwrap();
        let job = new_job(ToolId::Compress);
        store.insert_pending(&job).unwrap();
        store.claim_next("w1").unwrap().unwrap();
        store
            .update_progress(
                job.id,
                StatusUpdate::succeeded("out.pdf".to_string(), "file:///x".to_string(), 10),
            )
            .unwrap();

        assert_eq!(store.increment_access(job.id, 3).unwrap(), AccessOutcome::Granted(1));
        assert_eq!(store.increment_access(job.id, 3).unwrap(), AccessOutcome::Granted(2));
        assert_eq!(store.increment_access(job.id, 3).unwrap(), AccessOutcome::Granted(3));
        assert_eq!(store.increment_access(job.id, 3).unwrap(), AccessOutcome::Exceeded);
        assert_eq!(store.increment_access(job.id, 3).unwrap(), AccessOutcome::Exceeded);

        let got = store.get(job.id).unwrap().unwrap();
        assert_eq!(got.access_count, 3);
    }

    #[test]
    fn test_sweep_selects_only_old_terminal_jobs() {
        let store = JobStore::in_memory().unwrap();

        let done = new_job(ToolId::Merge);
        store.insert_pending(&done).unwrap();
        store.claim_next("w1").unwrap().unwrap();
        store
            .update_progress(
                done.id,
                StatusUpdate::succeeded("out.pdf".to_string(), "file:///x".to_string(), 10),
            )
            .unwrap();

        let running = new_job(ToolId::Merge);
        store.insert_pending(&running).unwrap();
        store.claim_next("w2").unwrap().unwrap();

        // Nothing is old enough yet
        assert!(store
            .sweep_terminal_older_than(Duration::from_secs(60))
            .unwrap()
            .is_empty());

        // With a zero window the terminal job is swept, the running one never is
        let swept = store.sweep_terminal_older_than(Duration::ZERO).unwrap();
        assert_eq!(swept.len(), 1);
        assert_eq!(swept[0].id, done.id);

        assert!(store.delete(done.id).unwrap());
        assert!(!store.delete(done.id).unwrap());
        assert!(store.get(running.id).unwrap().is_some());
    }

    #[test]
    fn test_queue_counts() {
        let store = JobStore::in_memory().unwrap();
        for _ in 0..3 {
            store.insert_pending(&new_job(ToolId::Merge)).unwrap();
        }
        store.claim_next("w1").unwrap().unwrap();

        let counts = store.queue_counts().unwrap();
        assert_eq!(counts.pending, 2);
        assert_eq!(counts.in_progress, 1);
    }
}
