use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::{DraftVersion, Job};

/// Capacity of the pipeline event channel. Slow receivers lag rather than
/// stall the pipeline.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// ── Event types ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PipelineEvent {
    JobStarted {
        job: Job,
    },
    PassStarted {
        job_id: String,
        pass: u32,
        label: String,
    },
    PassCompleted {
        job_id: String,
        pass: u32,
        changes: usize,
        audit_score: Option<f64>,
    },
    PassFailed {
        job_id: String,
        pass: u32,
        error: String,
    },
    JobPaused {
        job: Job,
    },
    JobCompleted {
        job: Job,
    },
    JobCancelled {
        job: Job,
    },
    VersionRestored {
        job_id: String,
        restored_from: u32,
        version: DraftVersion,
    },
}

impl PipelineEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::JobStarted { job }
            | Self::JobPaused { job }
            | Self::JobCompleted { job }
            | Self::JobCancelled { job } => &job.id,
            Self::PassStarted { job_id, .. }
            | Self::PassCompleted { job_id, .. }
            | Self::PassFailed { job_id, .. }
            | Self::VersionRestored { job_id, .. } => job_id,
        }
    }
}

/// Send an event to every subscriber. Having no subscribers is fine.
pub fn broadcast_event(tx: &broadcast::Sender<PipelineEvent>, event: PipelineEvent) {
    // Ignore error if no receivers
    let _ = tx.send(event);
}

// ── Tests ────────────────────────────────────────────────────────────
