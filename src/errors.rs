//! Typed error hierarchy for the quill pipeline.
//!
//! Two enums cover the two seams:
//! - `PipelineError`: anything a pipeline command or query can fail with
//! - `ExecutorError`: failures of the external pass-execution capability

use std::time::Duration;

use thiserror::Error;

use crate::job::JobStatus;

/// Errors surfaced by pipeline commands, queries and the job store.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Pass {pass} failed: {message}")]
    Executor { pass: u32, message: String },

    #[error("Job {id} was modified concurrently (expected version tag {expected_tag}); refetch and retry")]
    Conflict { id: String, expected_tag: i64 },

    #[error("Cannot {command} job {id} while it is {status}")]
    InvalidTransition {
        id: String,
        command: &'static str,
        status: JobStatus,
    },

    #[error("Job {id} not found")]
    JobNotFound { id: String },

    #[error("Version {version} not found for job {job_id}")]
    VersionNotFound { job_id: String, version: u32 },

    #[error("Database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// True when the caller should refetch the job and reissue the command.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.into())
    }
}

/// Errors from a single `PassExecutor::run` invocation.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("invalid executor output: {0}")]
    InvalidOutput(String),

    #[error("failed to spawn executor: {0}")]
    Spawn(#[source] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
