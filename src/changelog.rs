//! Append-only log of semantic edits made by each pass, and the summary
//! derived from it.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::job::{ChangeLogEntry, ChangeType, NewChangeLogEntry};
use crate::store::DbHandle;

/// Counts derived from a job's change log. Never stored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenerationSummary {
    pub total_changes: usize,
    pub images_added: usize,
    pub images_modified: usize,
    /// Pass number to number of entries that pass produced.
    pub changes_by_pass: BTreeMap<u32, usize>,
}

/// Reduce a set of entries to a summary. The result does not depend on the
/// order of `entries`.
pub fn summarize(entries: &[ChangeLogEntry]) -> GenerationSummary {
    entries
        .iter()
        .fold(GenerationSummary::default(), |mut summary, entry| {
            summary.total_changes += 1;
            match entry.change_type {
                ChangeType::ImageAdded => summary.images_added += 1,
                ChangeType::ImageModified => summary.images_modified += 1,
                ChangeType::Other => {}
            }
            *summary.changes_by_pass.entry(entry.pass).or_default() += 1;
            summary
        })
}

/// Assign ids, pass number and timestamp to entries reported by a pass.
/// `criteria_met` is stored sorted and deduplicated.
pub fn stamp(pass: u32, entries: Vec<NewChangeLogEntry>) -> Vec<ChangeLogEntry> {
    let now = Utc::now().to_rfc3339();
    entries
        .into_iter()
        .map(|entry| {
            let mut criteria_met = entry.criteria_met;
            criteria_met.sort();
            criteria_met.dedup();
            ChangeLogEntry {
                id: uuid::Uuid::new_v4().to_string(),
                section_key: entry.section_key,
                pass,
                change_type: entry.change_type,
                criteria_met,
                reason: entry.reason,
                created_at: now.clone(),
            }
        })
        .collect()
}

/// Entries plus their summary, as returned by the change-log query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeLogReport {
    pub entries: Vec<ChangeLogEntry>,
    pub summary: GenerationSummary,
}

#[derive(Clone)]
pub struct ChangeLogger {
    db: DbHandle,
}

impl ChangeLogger {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Stamp and append entries produced by `pass`.
    pub async fn append(
        &self,
        job_id: &str,
        pass: u32,
        entries: Vec<NewChangeLogEntry>,
    ) -> Result<Vec<ChangeLogEntry>> {
        let job_id = job_id.to_string();
        let stamped = stamp(pass, entries);
        let to_store = stamped.clone();
        self.db
            .call(move |store| store.append_change_log(&job_id, &to_store))
            .await?;
        Ok(stamped)
    }

    /// Entries in append order.
    pub async fn list(&self, job_id: &str) -> Result<Vec<ChangeLogEntry>> {
        let job_id = job_id.to_string();
        self.db
            .call(move |store| {
                store.get_job(&job_id)?;
                store.list_change_log(&job_id)
            })
            .await
    }

    pub async fn summarize(&self, job_id: &str) -> Result<GenerationSummary> {
        Ok(summarize(&self.list(job_id).await?))
    }

    pub async fn report(&self, job_id: &str) -> Result<ChangeLogReport> {
        let entries = self.list(job_id).await?;
        let summary = summarize(&entries);
        Ok(ChangeLogReport { entries, summary })
    }
}
