//! Persistent job storage.
//!
//! `JobStore` owns the SQLite connection; `DbHandle` shares it across async
//! tasks and runs each call on tokio's blocking pool.

mod db;

pub use db::JobStore;

use std::sync::Arc;

use crate::errors::{PipelineError, Result};
use crate::job::{ChangeLogEntry, DraftVersion, Job};

/// Everything written alongside a job row in `JobStore::save_atomic`.
#[derive(Debug, Clone, Default)]
pub struct JobCommit {
    /// Draft contents to append as new versions, in order.
    pub snapshots: Vec<String>,
    /// Fully stamped change-log entries to append.
    pub change_log: Vec<ChangeLogEntry>,
    /// Clear any pending pause request.
    pub clear_control: bool,
}

impl JobCommit {
    pub fn snapshot(mut self, content: String) -> Self {
        self.snapshots.push(content);
        self
    }

    pub fn entries(mut self, entries: Vec<ChangeLogEntry>) -> Self {
        self.change_log.extend(entries);
        self
    }

    pub fn clear_control(mut self) -> Self {
        self.clear_control = true;
        self
    }
}

/// Result of a successful `save_atomic`.
#[derive(Debug, Clone)]
pub struct Committed {
    /// The job as stored, with its new version tag.
    pub job: Job,
    /// Versions created by this commit.
    pub versions: Vec<DraftVersion>,
}

/// Thread-safe async handle around `JobStore`.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<std::sync::Mutex<JobStore>>,
}

impl DbHandle {
    pub fn new(store: JobStore) -> Self {
        Self {
            inner: Arc::new(std::sync::Mutex::new(store)),
        }
    }

    /// Run a closure with access to the store on a blocking thread.
    /// All data passed into `f` must be owned (`'static`).
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&JobStore) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let guard = store.lock().map_err(|_| PipelineError::LockPoisoned)?;
            f(&guard)
        })
        .await
        .map_err(|e| PipelineError::Other(anyhow::anyhow!("DB task panicked: {}", e)))?
    }
}
