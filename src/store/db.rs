use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};

use super::{Committed, JobCommit};
use crate::errors::{PipelineError, Result};
use crate::job::*;
use crate::pass::PassKey;

/// Attach a human-readable context to database failures.
trait DbContext<T> {
    fn db(self, context: &'static str) -> Result<T>;
}

impl<T> DbContext<T> for std::result::Result<T, rusqlite::Error> {
    fn db(self, context: &'static str) -> Result<T> {
        self.map_err(|e| PipelineError::Database(anyhow::Error::new(e).context(context)))
    }
}

const JOB_COLUMNS: &str = "id, topic_id, brief_id, total_passes, current_pass, status, passes_status, \
     draft_content, last_error, final_audit_score, control_request, version_tag, created_at, updated_at";

/// SQLite-backed persistence for jobs, draft versions and change-log entries.
pub struct JobStore {
    conn: Connection,
}

impl JobStore {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).db("Failed to open SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().db("Failed to open in-memory SQLite database")?;
        let store = Self { conn };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .db("Failed to enable foreign keys")?;
        self.run_migrations()
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS jobs (
                    id TEXT PRIMARY KEY,
                    topic_id TEXT NOT NULL,
                    brief_id TEXT NOT NULL,
                    brief TEXT NOT NULL DEFAULT '',
                    business_info TEXT NOT NULL DEFAULT '{}',
                    total_passes INTEGER NOT NULL,
                    current_pass INTEGER NOT NULL DEFAULT 1,
                    status TEXT NOT NULL DEFAULT 'pending',
                    passes_status TEXT NOT NULL,
                    draft_content TEXT NOT NULL DEFAULT '',
                    last_error TEXT,
                    final_audit_score REAL,
                    control_request TEXT,
                    version_tag INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS draft_versions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                    version INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    char_count INTEGER NOT NULL,
                    saved_at TEXT NOT NULL,
                    UNIQUE(job_id, version)
                );

                CREATE TABLE IF NOT EXISTS change_log_entries (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    id TEXT NOT NULL UNIQUE,
                    job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                    section_key TEXT NOT NULL,
                    pass INTEGER NOT NULL,
                    change_type TEXT NOT NULL,
                    criteria_met TEXT NOT NULL DEFAULT '[]',
                    reason TEXT NOT NULL DEFAULT '',
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
                CREATE INDEX IF NOT EXISTS idx_draft_versions_job ON draft_versions(job_id);
                CREATE INDEX IF NOT EXISTS idx_change_log_job ON change_log_entries(job_id);
                ",
            )
            .db("Failed to create tables")
    }

    // ── Jobs ──────────────────────────────────────────────────────────

    pub fn create_job(&self, new_job: &NewJob) -> Result<Job> {
        let passes_status =
            PassesStatus::new(new_job.total_passes).map_err(PipelineError::Validation)?;
        let passes_json = serde_json::to_string(&passes_status)
            .map_err(|e| PipelineError::Other(anyhow::Error::new(e)))?;
        let business_info = serde_json::to_string(&new_job.context.business_info)
            .map_err(|e| PipelineError::Other(anyhow::Error::new(e)))?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO jobs (id, topic_id, brief_id, brief, business_info, total_passes,
                                   passes_status, draft_content, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
                params![
                    id,
                    new_job.topic_id,
                    new_job.brief_id,
                    new_job.context.brief,
                    business_info,
                    new_job.total_passes,
                    passes_json,
                    new_job.initial_draft,
                    now,
                ],
            )
            .db("Failed to insert job")?;
        self.get_job(&id)
    }

    pub fn find_job(&self, id: &str) -> Result<Option<Job>> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {} FROM jobs WHERE id = ?1", JOB_COLUMNS),
                params![id],
                JobRow::from_row,
            )
            .optional()
            .db("Failed to query job")?;
        row.map(JobRow::into_job).transpose()
    }

    pub fn get_job(&self, id: &str) -> Result<Job> {
        self.find_job(id)?
            .ok_or_else(|| PipelineError::JobNotFound { id: id.to_string() })
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM jobs ORDER BY created_at DESC, rowid DESC",
                JOB_COLUMNS
            ))
            .db("Failed to prepare list_jobs")?;
        let rows = stmt
            .query_map([], JobRow::from_row)
            .db("Failed to query jobs")?;
        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.db("Failed to read job row")?.into_job()?);
        }
        Ok(jobs)
    }

    pub fn get_context(&self, id: &str) -> Result<JobContext> {
        let row: Option<(String, String)> = self
            .conn
            .query_row(
                "SELECT brief, business_info FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .db("Failed to query job context")?;
        let (brief, business_info) =
            row.ok_or_else(|| PipelineError::JobNotFound { id: id.to_string() })?;
        let business_info = serde_json::from_str(&business_info).map_err(|e| {
            PipelineError::Other(anyhow::Error::new(e).context("Failed to parse business_info JSON"))
        })?;
        Ok(JobContext {
            brief,
            business_info,
        })
    }

    /// Write `job` if its row still carries `expected_tag`, together with the
    /// snapshots and change-log entries in `commit`, in one transaction.
    ///
    /// The pause request column is left alone unless `commit.clear_control` is set,
    /// so a request recorded after the caller's read survives the write.
    pub fn save_atomic(&self, job: &Job, expected_tag: i64, commit: JobCommit) -> Result<Committed> {
        let passes_json = serde_json::to_string(&job.passes_status)
            .map_err(|e| PipelineError::Other(anyhow::Error::new(e)))?;
        let now = Utc::now().to_rfc3339();

        let tx = self
            .conn
            .unchecked_transaction()
            .db("Failed to begin transaction")?;

        let updated = tx
            .execute(
                "UPDATE jobs SET status = ?1, current_pass = ?2, passes_status = ?3,
                        draft_content = ?4, last_error = ?5, final_audit_score = ?6,
                        control_request = CASE WHEN ?7 THEN NULL ELSE control_request END,
                        version_tag = version_tag + 1, updated_at = ?8
                 WHERE id = ?9 AND version_tag = ?10",
                params![
                    job.status.as_str(),
                    job.current_pass,
                    passes_json,
                    job.draft,
                    job.last_error,
                    job.final_audit_score,
                    commit.clear_control,
                    now,
                    job.id,
                    expected_tag,
                ],
            )
            .db("Failed to update job")?;

        if updated == 0 {
            // Dropping the transaction rolls it back.
            drop(tx);
            return Err(match self.find_job(&job.id)? {
                Some(_) => PipelineError::Conflict {
                    id: job.id.clone(),
                    expected_tag,
                },
                None => PipelineError::JobNotFound { id: job.id.clone() },
            });
        }

        let mut versions = Vec::with_capacity(commit.snapshots.len());
        for content in &commit.snapshots {
            versions.push(insert_version(&tx, &job.id, content)?);
        }
        for entry in &commit.change_log {
            insert_change_log_entry(&tx, &job.id, entry)?;
        }

        tx.commit().db("Failed to commit job update")?;

        Ok(Committed {
            job: self.get_job(&job.id)?,
            versions,
        })
    }

    /// Record a pause request on a running job without touching its version tag.
    /// Returns false when the job is not in progress.
    pub fn request_pause(&self, id: &str) -> Result<bool> {
        let updated = self
            .conn
            .execute(
                "UPDATE jobs SET control_request = ?1 WHERE id = ?2 AND status = 'in_progress'",
                params![ControlRequest::Pause.as_str(), id],
            )
            .db("Failed to record pause request")?;
        if updated == 0 && self.find_job(id)?.is_none() {
            return Err(PipelineError::JobNotFound { id: id.to_string() });
        }
        Ok(updated > 0)
    }

    /// Unconditionally mark a job cancelled. Bumps the version tag so an
    /// in-flight commit for the same job fails its check.
    pub fn force_cancel(&self, id: &str) -> Result<Job> {
        let updated = self
            .conn
            .execute(
                "UPDATE jobs SET status = 'cancelled', control_request = NULL,
                        version_tag = version_tag + 1, updated_at = ?1
                 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), id],
            )
            .db("Failed to cancel job")?;
        if updated == 0 {
            return Err(PipelineError::JobNotFound { id: id.to_string() });
        }
        self.get_job(id)
    }

    // ── Draft versions ────────────────────────────────────────────────

    pub fn append_version(&self, job_id: &str, content: &str) -> Result<DraftVersion> {
        self.get_job(job_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .db("Failed to begin transaction")?;
        let version = insert_version(&tx, job_id, content)?;
        tx.commit().db("Failed to commit draft version")?;
        Ok(version)
    }

    pub fn list_versions(&self, job_id: &str) -> Result<Vec<DraftVersion>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT version, content, char_count, saved_at
                 FROM draft_versions WHERE job_id = ?1 ORDER BY version ASC",
            )
            .db("Failed to prepare list_versions")?;
        let rows = stmt
            .query_map(params![job_id], version_from_row)
            .db("Failed to query draft versions")?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .db("Failed to read draft_versions row")
    }

    pub fn get_version(&self, job_id: &str, version: u32) -> Result<Option<DraftVersion>> {
        self.conn
            .query_row(
                "SELECT version, content, char_count, saved_at
                 FROM draft_versions WHERE job_id = ?1 AND version = ?2",
                params![job_id, version],
                version_from_row,
            )
            .optional()
            .db("Failed to query draft version")
    }

    pub fn latest_version(&self, job_id: &str) -> Result<Option<DraftVersion>> {
        self.conn
            .query_row(
                "SELECT version, content, char_count, saved_at
                 FROM draft_versions WHERE job_id = ?1 ORDER BY version DESC LIMIT 1",
                params![job_id],
                version_from_row,
            )
            .optional()
            .db("Failed to query latest draft version")
    }

    // ── Change log ────────────────────────────────────────────────────

    pub fn append_change_log(&self, job_id: &str, entries: &[ChangeLogEntry]) -> Result<()> {
        self.get_job(job_id)?;
        let tx = self
            .conn
            .unchecked_transaction()
            .db("Failed to begin transaction")?;
        for entry in entries {
            insert_change_log_entry(&tx, job_id, entry)?;
        }
        tx.commit().db("Failed to commit change log entries")
    }

    pub fn list_change_log(&self, job_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, section_key, pass, change_type, criteria_met, reason, created_at
                 FROM change_log_entries WHERE job_id = ?1 ORDER BY seq ASC",
            )
            .db("Failed to prepare list_change_log")?;
        let rows = stmt
            .query_map(params![job_id], |row| {
                Ok(ChangeLogRow {
                    id: row.get(0)?,
                    section_key: row.get(1)?,
                    pass: row.get(2)?,
                    change_type: row.get(3)?,
                    criteria_met: row.get(4)?,
                    reason: row.get(5)?,
                    created_at: row.get(6)?,
                })
            })
            .db("Failed to query change log")?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.db("Failed to read change_log row")?.into_entry()?);
        }
        Ok(entries)
    }
}

fn insert_version(conn: &Connection, job_id: &str, content: &str) -> Result<DraftVersion> {
    let next: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) + 1 FROM draft_versions WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )
        .db("Failed to compute next version number")?;
    let version = DraftVersion {
        version: next,
        content: content.to_string(),
        char_count: char_count(content),
        saved_at: Utc::now().to_rfc3339(),
    };
    conn.execute(
        "INSERT INTO draft_versions (job_id, version, content, char_count, saved_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            job_id,
            version.version,
            version.content,
            version.char_count,
            version.saved_at
        ],
    )
    .db("Failed to insert draft version")?;
    Ok(version)
}

fn insert_change_log_entry(conn: &Connection, job_id: &str, entry: &ChangeLogEntry) -> Result<()> {
    let criteria = serde_json::to_string(&entry.criteria_met)
        .map_err(|e| PipelineError::Other(anyhow::Error::new(e)))?;
    conn.execute(
        "INSERT INTO change_log_entries
             (id, job_id, section_key, pass, change_type, criteria_met, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            entry.id,
            job_id,
            entry.section_key,
            entry.pass,
            entry.change_type.as_str(),
            criteria,
            entry.reason,
            entry.created_at,
        ],
    )
    .db("Failed to insert change log entry")?;
    Ok(())
}

fn version_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DraftVersion> {
    Ok(DraftVersion {
        version: row.get(0)?,
        content: row.get(1)?,
        char_count: row.get(2)?,
        saved_at: row.get(3)?,
    })
}

fn parse_err(context: &'static str, message: String) -> PipelineError {
    PipelineError::Database(anyhow::anyhow!(message).context(context))
}

// ── Row conversion helpers ────────────────────────────────────────────

/// Intermediate row struct for jobs.
struct JobRow {
    id: String,
    topic_id: String,
    brief_id: String,
    total_passes: u32,
    current_pass: u32,
    status: String,
    passes_status: String,
    draft_content: String,
    last_error: Option<String>,
    final_audit_score: Option<f64>,
    control_request: Option<String>,
    version_tag: i64,
    created_at: String,
    updated_at: String,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            topic_id: row.get(1)?,
            brief_id: row.get(2)?,
            total_passes: row.get(3)?,
            current_pass: row.get(4)?,
            status: row.get(5)?,
            passes_status: row.get(6)?,
            draft_content: row.get(7)?,
            last_error: row.get(8)?,
            final_audit_score: row.get(9)?,
            control_request: row.get(10)?,
            version_tag: row.get(11)?,
            created_at: row.get(12)?,
            updated_at: row.get(13)?,
        })
    }

    fn into_job(self) -> Result<Job> {
        let status = JobStatus::from_str(&self.status)
            .map_err(|e| parse_err("Failed to parse job status", e))?;
        let map: BTreeMap<PassKey, PassStatus> = serde_json::from_str(&self.passes_status)
            .map_err(|e| parse_err("Failed to parse passes_status JSON", e.to_string()))?;
        let passes_status = PassesStatus::from_map(map, self.total_passes)
            .map_err(|e| parse_err("Invalid passes_status", e))?;
        let control = self
            .control_request
            .as_deref()
            .map(ControlRequest::from_str)
            .transpose()
            .map_err(|e| parse_err("Failed to parse control request", e))?;

        Ok(Job {
            id: self.id,
            topic_id: self.topic_id,
            brief_id: self.brief_id,
            total_passes: self.total_passes,
            current_pass: self.current_pass,
            status,
            passes_status,
            draft: self.draft_content,
            last_error: self.last_error,
            final_audit_score: self.final_audit_score,
            control,
            version_tag: self.version_tag,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Intermediate row struct for change_log_entries.
struct ChangeLogRow {
    id: String,
    section_key: String,
    pass: u32,
    change_type: String,
    criteria_met: String,
    reason: String,
    created_at: String,
}

impl ChangeLogRow {
    fn into_entry(self) -> Result<ChangeLogEntry> {
        let change_type = ChangeType::from_str(&self.change_type)
            .map_err(|e| parse_err("Failed to parse change type", e))?;
        let criteria_met: Vec<String> = serde_json::from_str(&self.criteria_met)
            .map_err(|e| parse_err("Failed to parse criteria_met JSON", e.to_string()))?;
        Ok(ChangeLogEntry {
            id: self.id,
            section_key: self.section_key,
            pass: self.pass,
            change_type,
            criteria_met,
            reason: self.reason,
            created_at: self.created_at,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────
