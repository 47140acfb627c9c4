//! Append-only draft version history.

use crate::errors::{PipelineError, Result};
use crate::job::DraftVersion;
use crate::store::DbHandle;

/// Per-job snapshot log. There is no way to rewrite or delete a version.
#[derive(Clone)]
pub struct VersionHistory {
    db: DbHandle,
}

impl VersionHistory {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Snapshot `content` as the next version of the job.
    pub async fn append(&self, job_id: &str, content: &str) -> Result<DraftVersion> {
        let job_id = job_id.to_string();
        let content = content.to_string();
        self.db
            .call(move |store| store.append_version(&job_id, &content))
            .await
    }

    /// All versions, oldest first.
    pub async fn list(&self, job_id: &str) -> Result<Vec<DraftVersion>> {
        let job_id = job_id.to_string();
        self.db
            .call(move |store| {
                store.get_job(&job_id)?;
                store.list_versions(&job_id)
            })
            .await
    }

    pub async fn get(&self, job_id: &str, version: u32) -> Result<DraftVersion> {
        let job_id = job_id.to_string();
        self.db
            .call(move |store| {
                store
                    .get_version(&job_id, version)?
                    .ok_or(PipelineError::VersionNotFound { job_id, version })
            })
            .await
    }

    pub async fn latest(&self, job_id: &str) -> Result<Option<DraftVersion>> {
        let job_id = job_id.to_string();
        self.db
            .call(move |store| store.latest_version(&job_id))
            .await
    }
}
