//! The pass pipeline state machine.
//!
//! | Command   | Allowed from                     | Result                        |
//! |-----------|----------------------------------|-------------------------------|
//! | `start`   | pending                          | runs passes from `current_pass` |
//! | `pause`   | in_progress (paused is a no-op)  | paused at the next boundary   |
//! | `resume`  | paused, error                    | runs passes from `current_pass` |
//! | `cancel`  | anything but cancelled           | cancelled (terminal)          |
//! | `rerun`   | completed, error, paused         | runs passes from the lowest selected |
//! | `restore` | anything but in_progress, cancelled | new version with old content |
//! | `recover` | in_progress                      | paused, in-flight pass pending |
//!
//! Any command other than `pause` and `cancel` that finds the job in_progress
//! returns `PipelineError::Conflict`.

pub mod events;

pub use events::{EVENT_CHANNEL_CAPACITY, PipelineEvent, broadcast_event};

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::changelog::{self, ChangeLogReport, ChangeLogger};
use crate::errors::{ExecutorError, PipelineError, Result};
use crate::executor::PassExecutor;
use crate::history::VersionHistory;
use crate::job::{
    ControlRequest, DraftVersion, Job, JobContext, JobStatus, NewJob, PassStatus,
};
use crate::pass::PassCatalog;
use crate::progress::{self, Progress};
use crate::store::{Committed, DbHandle, JobCommit};

/// Default per-pass executor timeout.
pub const DEFAULT_PASS_TIMEOUT: Duration = Duration::from_secs(600);

/// Check that `command` may run against `job`. A job that another caller is
/// driving yields `Conflict`; any other disallowed state yields
/// `InvalidTransition`.
fn guard(job: &Job, command: &'static str, allowed: &[JobStatus]) -> Result<()> {
    if allowed.contains(&job.status) {
        return Ok(());
    }
    if job.status == JobStatus::InProgress {
        return Err(PipelineError::Conflict {
            id: job.id.clone(),
            expected_tag: job.version_tag,
        });
    }
    Err(PipelineError::InvalidTransition {
        id: job.id.clone(),
        command,
        status: job.status,
    })
}

/// Validate a rerun selection and return the pass the rerun starts from.
fn rerun_start(job: &Job, passes: &[u32]) -> Result<u32> {
    let Some(&min) = passes.iter().min() else {
        return Err(PipelineError::Validation(
            "select at least one pass to rerun".to_string(),
        ));
    };
    if let Some(bad) = passes
        .iter()
        .find(|n| **n < 1 || **n > job.total_passes)
    {
        return Err(PipelineError::Validation(format!(
            "pass {} is outside 1..={}",
            bad, job.total_passes
        )));
    }
    if !job.passes_status.all_completed_below(min) {
        return Err(PipelineError::Validation(format!(
            "cannot rerun from pass {} until passes 1..{} are completed",
            min, min
        )));
    }
    Ok(min)
}

#[derive(Clone)]
pub struct PassPipeline {
    db: DbHandle,
    executor: Arc<dyn PassExecutor>,
    catalog: Arc<PassCatalog>,
    history: VersionHistory,
    change_log: ChangeLogger,
    pass_timeout: Duration,
    events: broadcast::Sender<PipelineEvent>,
}

impl PassPipeline {
    pub fn new(db: DbHandle, executor: Arc<dyn PassExecutor>, catalog: PassCatalog) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            history: VersionHistory::new(db.clone()),
            change_log: ChangeLogger::new(db.clone()),
            db,
            executor,
            catalog: Arc::new(catalog),
            pass_timeout: DEFAULT_PASS_TIMEOUT,
            events,
        }
    }

    pub fn with_pass_timeout(mut self, timeout: Duration) -> Self {
        self.pass_timeout = timeout;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    pub fn history(&self) -> &VersionHistory {
        &self.history
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Create a pending job sized to the current pass catalog. A job whose
    /// brief or business info is unusable is never stored, since no command
    /// can edit them afterwards.
    pub async fn create_job(
        &self,
        topic_id: &str,
        brief_id: &str,
        context: JobContext,
        initial_draft: String,
    ) -> Result<Job> {
        context.validate().map_err(PipelineError::Validation)?;
        let new_job = NewJob {
            topic_id: topic_id.to_string(),
            brief_id: brief_id.to_string(),
            total_passes: self.catalog.total_passes(),
            context,
            initial_draft,
        };
        let job = self.db.call(move |store| store.create_job(&new_job)).await?;
        info!(job_id = %job.id, total_passes = job.total_passes, "job created");
        Ok(job)
    }

    pub async fn start(&self, job_id: &str) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        guard(&job, "start", &[JobStatus::Pending])?;
        let context = self.prerequisites(&job).await?;

        let mut next = job.clone();
        next.status = JobStatus::InProgress;
        let started = self
            .commit(next, job.version_tag, JobCommit::default().clear_control())
            .await?
            .job;

        info!(job_id = %job_id, "job started");
        broadcast_event(&self.events, PipelineEvent::JobStarted { job: started });
        self.run_passes(job_id, &context).await
    }

    /// Ask a running job to stop at the next pass boundary.
    pub async fn pause(&self, job_id: &str) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        match job.status {
            JobStatus::Paused => return Ok(job),
            JobStatus::InProgress => {}
            status => {
                return Err(PipelineError::InvalidTransition {
                    id: job.id,
                    command: "pause",
                    status,
                });
            }
        }

        let id = job_id.to_string();
        let recorded = self.db.call(move |store| store.request_pause(&id)).await?;
        let current = self.get_job(job_id).await?;
        if recorded {
            info!(job_id = %job_id, pass = current.current_pass, "pause requested");
            return Ok(current);
        }
        // The job left in_progress between our read and the request.
        match current.status {
            JobStatus::Paused => Ok(current),
            status => Err(PipelineError::InvalidTransition {
                id: current.id,
                command: "pause",
                status,
            }),
        }
    }

    /// Continue a paused or failed job. A failed pass is retried.
    pub async fn resume(&self, job_id: &str) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        guard(&job, "resume", &[JobStatus::Paused, JobStatus::Error])?;
        let context = self.prerequisites(&job).await?;

        let mut next = job.clone();
        if job.status == JobStatus::Error {
            next.passes_status.set(job.current_pass, PassStatus::Pending);
            next.last_error = None;
        }
        next.status = JobStatus::InProgress;
        let resumed = self
            .commit(next, job.version_tag, JobCommit::default().clear_control())
            .await?
            .job;

        info!(job_id = %job_id, pass = resumed.current_pass, from = %job.status, "job resumed");
        broadcast_event(&self.events, PipelineEvent::JobStarted { job: resumed });
        self.run_passes(job_id, &context).await
    }

    /// Cancel a job. Idempotent on an already cancelled job.
    pub async fn cancel(&self, job_id: &str) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        let id = job_id.to_string();
        let cancelled = self.db.call(move |store| store.force_cancel(&id)).await?;
        info!(job_id = %job_id, was = %job.status, "job cancelled");
        broadcast_event(
            &self.events,
            PipelineEvent::JobCancelled {
                job: cancelled.clone(),
            },
        );
        Ok(cancelled)
    }

    /// Re-execute every pass from the lowest selected one to the end, starting
    /// from the current draft. History is kept and appended to.
    ///
    /// Any rerun clears `final_audit_score`, whichever passes it covers. The
    /// score is set again only if a pass in the rerun range reports one.
    pub async fn rerun(&self, job_id: &str, passes: &[u32]) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        guard(
            &job,
            "rerun",
            &[JobStatus::Completed, JobStatus::Error, JobStatus::Paused],
        )?;
        let from = rerun_start(&job, passes)?;
        let context = self.prerequisites(&job).await?;

        let mut next = job.clone();
        next.passes_status.reset_from(from);
        next.current_pass = from;
        next.last_error = None;
        next.final_audit_score = None;
        next.status = JobStatus::InProgress;
        let reopened = self
            .commit(next, job.version_tag, JobCommit::default().clear_control())
            .await?
            .job;

        info!(job_id = %job_id, from_pass = from, total = job.total_passes, "rerun started");
        broadcast_event(&self.events, PipelineEvent::JobStarted { job: reopened });
        self.run_passes(job_id, &context).await
    }

    /// Make an earlier version the working draft by appending a copy of it.
    /// An unsaved working draft is snapshotted first.
    pub async fn restore_version(&self, job_id: &str, version: u32) -> Result<DraftVersion> {
        let job = self.get_job(job_id).await?;
        guard(
            &job,
            "restore",
            &[
                JobStatus::Pending,
                JobStatus::Paused,
                JobStatus::Error,
                JobStatus::Completed,
            ],
        )?;

        let committed = self
            .db
            .call(move |store| {
                let target = store.get_version(&job.id, version)?.ok_or_else(|| {
                    PipelineError::VersionNotFound {
                        job_id: job.id.clone(),
                        version,
                    }
                })?;
                let latest = store.latest_version(&job.id)?;

                let mut commit = JobCommit::default();
                if latest.is_none_or(|l| l.content != job.draft) {
                    commit = commit.snapshot(job.draft.clone());
                }
                commit = commit.snapshot(target.content.clone());

                let mut next = job.clone();
                next.draft = target.content;
                store.save_atomic(&next, job.version_tag, commit)
            })
            .await?;

        let Committed { mut versions, .. } = committed;
        let restored = versions.pop().ok_or_else(|| {
            PipelineError::Other(anyhow::anyhow!("restore wrote no version for job {}", job_id))
        })?;

        info!(job_id = %job_id, restored_from = version, version = restored.version, "version restored");
        broadcast_event(
            &self.events,
            PipelineEvent::VersionRestored {
                job_id: job_id.to_string(),
                restored_from: version,
                version: restored.clone(),
            },
        );
        Ok(restored)
    }

    /// Move a job stranded in in_progress by a dead process to paused, so it
    /// can be resumed. The interrupted pass is reset to pending.
    pub async fn recover(&self, job_id: &str) -> Result<Job> {
        let job = self.get_job(job_id).await?;
        if job.status != JobStatus::InProgress {
            return Err(PipelineError::InvalidTransition {
                id: job.id,
                command: "recover",
                status: job.status,
            });
        }

        let mut next = job.clone();
        next.status = JobStatus::Paused;
        if next.passes_status.get(job.current_pass) == Some(PassStatus::InProgress) {
            next.passes_status.set(job.current_pass, PassStatus::Pending);
        }
        let recovered = self
            .commit(next, job.version_tag, JobCommit::default().clear_control())
            .await?
            .job;

        warn!(job_id = %job_id, pass = recovered.current_pass, "recovered stranded job as paused");
        broadcast_event(
            &self.events,
            PipelineEvent::JobPaused {
                job: recovered.clone(),
            },
        );
        Ok(recovered)
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let id = job_id.to_string();
        self.db.call(move |store| store.get_job(&id)).await
    }

    pub async fn list_jobs(&self) -> Result<Vec<Job>> {
        self.db.call(|store| store.list_jobs()).await
    }

    pub async fn get_progress(&self, job_id: &str) -> Result<Progress> {
        let job = self.get_job(job_id).await?;
        Ok(progress::progress(&job, &self.catalog))
    }

    pub async fn get_version_history(&self, job_id: &str) -> Result<Vec<DraftVersion>> {
        self.history.list(job_id).await
    }

    pub async fn get_change_log(&self, job_id: &str) -> Result<ChangeLogReport> {
        self.change_log.report(job_id).await
    }

    // ── Pass loop ────────────────────────────────────────────────────

    async fn prerequisites(&self, job: &Job) -> Result<JobContext> {
        let id = job.id.clone();
        let context = self.db.call(move |store| store.get_context(&id)).await?;
        context.validate().map_err(PipelineError::Validation)?;
        if !self.catalog.covers(job.total_passes) {
            return Err(PipelineError::Validation(format!(
                "pass catalog defines {} passes but job {} needs {}",
                self.catalog.total_passes(),
                job.id,
                job.total_passes
            )));
        }
        Ok(context)
    }

    async fn commit(&self, job: Job, expected_tag: i64, commit: JobCommit) -> Result<Committed> {
        self.db
            .call(move |store| store.save_atomic(&job, expected_tag, commit))
            .await
    }

    /// Drive passes until the job completes, pauses, fails or leaves
    /// in_progress. Each cycle reads the job fresh, claims the pass with a
    /// tag-checked write, runs the executor and commits its output against
    /// the claimed tag.
    async fn run_passes(&self, job_id: &str, context: &JobContext) -> Result<Job> {
        loop {
            let job = self.get_job(job_id).await?;

            if job.status != JobStatus::InProgress {
                debug!(job_id = %job_id, status = %job.status, "job left in_progress, stopping");
                return Ok(job);
            }

            if job.all_passes_done() {
                let mut next = job.clone();
                next.status = JobStatus::Completed;
                let done = match self
                    .commit(next, job.version_tag, JobCommit::default().clear_control())
                    .await
                {
                    Ok(c) => c.job,
                    Err(e) if e.is_conflict() => return self.lost_commit(job_id, None, e).await,
                    Err(e) => return Err(e),
                };
                info!(job_id = %job_id, audit_score = ?done.final_audit_score, "job completed");
                broadcast_event(&self.events, PipelineEvent::JobCompleted { job: done.clone() });
                return Ok(done);
            }

            if job.control == Some(ControlRequest::Pause) {
                let mut next = job.clone();
                next.status = JobStatus::Paused;
                let paused = match self
                    .commit(next, job.version_tag, JobCommit::default().clear_control())
                    .await
                {
                    Ok(c) => c.job,
                    Err(e) if e.is_conflict() => return self.lost_commit(job_id, None, e).await,
                    Err(e) => return Err(e),
                };
                info!(job_id = %job_id, pass = paused.current_pass, "job paused at pass boundary");
                broadcast_event(&self.events, PipelineEvent::JobPaused { job: paused.clone() });
                return Ok(paused);
            }

            let number = job.current_pass;
            let definition = self.catalog.get(number).cloned().ok_or_else(|| {
                PipelineError::Validation(format!("pass catalog has no pass {}", number))
            })?;

            let mut claim = job.clone();
            claim.passes_status.set(number, PassStatus::InProgress);
            let claimed = match self.commit(claim, job.version_tag, JobCommit::default()).await {
                Ok(c) => c.job,
                Err(e) if e.is_conflict() => {
                    return self.lost_commit(job_id, Some(number), e).await;
                }
                Err(e) => return Err(e),
            };

            info!(job_id = %job_id, pass = number, label = %definition.label, "pass started");
            broadcast_event(
                &self.events,
                PipelineEvent::PassStarted {
                    job_id: job_id.to_string(),
                    pass: number,
                    label: definition.label.clone(),
                },
            );

            let outcome = match tokio::time::timeout(
                self.pass_timeout,
                self.executor.run(&definition, &claimed.draft, context),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ExecutorError::TimedOut(self.pass_timeout)),
            };

            match outcome {
                Ok(output) => {
                    let entries = changelog::stamp(number, output.change_log);
                    let changes = entries.len();

                    let mut next = claimed.clone();
                    next.passes_status.set(number, PassStatus::Completed);
                    next.current_pass = number + 1;
                    next.draft = output.draft;
                    if output.audit_score.is_some() {
                        next.final_audit_score = output.audit_score;
                    }
                    let commit = JobCommit::default()
                        .snapshot(claimed.draft.clone())
                        .entries(entries);

                    match self.commit(next, claimed.version_tag, commit).await {
                        Ok(_) => {}
                        Err(e) if e.is_conflict() => {
                            return self.lost_commit(job_id, Some(number), e).await;
                        }
                        Err(e) => return Err(e),
                    }

                    info!(job_id = %job_id, pass = number, changes, "pass completed");
                    broadcast_event(
                        &self.events,
                        PipelineEvent::PassCompleted {
                            job_id: job_id.to_string(),
                            pass: number,
                            changes,
                            audit_score: output.audit_score,
                        },
                    );
                }
                Err(err) => {
                    let message = err.to_string();
                    let mut next = claimed.clone();
                    next.passes_status.set(number, PassStatus::Failed);
                    next.status = JobStatus::Error;
                    next.last_error = Some(format!(
                        "Pass {} ({}) failed: {}",
                        number, definition.label, message
                    ));

                    match self
                        .commit(next, claimed.version_tag, JobCommit::default().clear_control())
                        .await
                    {
                        Ok(_) => {}
                        Err(e) if e.is_conflict() => {
                            return self.lost_commit(job_id, Some(number), e).await;
                        }
                        Err(e) => return Err(e),
                    }

                    warn!(job_id = %job_id, pass = number, error = %message, "pass failed");
                    broadcast_event(
                        &self.events,
                        PipelineEvent::PassFailed {
                            job_id: job_id.to_string(),
                            pass: number,
                            error: message.clone(),
                        },
                    );
                    return Err(PipelineError::Executor {
                        pass: number,
                        message,
                    });
                }
            }
        }
    }

    /// A tag-checked write inside the loop lost. A cancellation is the expected
    /// cause and ends the loop quietly; anything else is surfaced.
    async fn lost_commit(
        &self,
        job_id: &str,
        pass: Option<u32>,
        err: PipelineError,
    ) -> Result<Job> {
        let current = self.get_job(job_id).await?;
        if current.status == JobStatus::Cancelled {
            info!(job_id = %job_id, pass = ?pass, "job cancelled mid-pass, discarding pass output");
            return Ok(current);
        }
        warn!(job_id = %job_id, pass = ?pass, status = %current.status, "concurrent modification, stopping");
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::PassesStatus;

    fn job(status: JobStatus, total: u32) -> Job {
        Job {
            id: "job-1".into(),
            topic_id: "t".into(),
            brief_id: "b".into(),
            total_passes: total,
            current_pass: 1,
            status,
            passes_status: PassesStatus::new(total).unwrap(),
            draft: String::new(),
            last_error: None,
            final_audit_score: None,
            control: None,
            version_tag: 4,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_guard_allows_listed_states() {
        let j = job(JobStatus::Paused, 8);
        assert!(guard(&j, "resume", &[JobStatus::Paused, JobStatus::Error]).is_ok());
    }

    #[test]
    fn test_guard_in_progress_is_conflict() {
        let j = job(JobStatus::InProgress, 8);
        let err = guard(&j, "resume", &[JobStatus::Paused]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Conflict { expected_tag: 4, .. }
        ));
    }

    #[test]
    fn test_guard_other_states_are_invalid_transitions() {
        let j = job(JobStatus::Cancelled, 8);
        let err = guard(&j, "start", &[JobStatus::Pending]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidTransition {
                command: "start",
                status: JobStatus::Cancelled,
                ..
            }
        ));
    }

    #[test]
    fn test_rerun_start_uses_minimum() {
        let mut j = job(JobStatus::Completed, 8);
        for n in 1..=8 {
            j.passes_status.set(n, PassStatus::Completed);
        }
        assert_eq!(rerun_start(&j, &[7, 5]).unwrap(), 5);
    }

    #[test]
    fn test_rerun_start_rejects_empty_and_out_of_range() {
        let j = job(JobStatus::Completed, 8);
        assert!(matches!(
            rerun_start(&j, &[]),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            rerun_start(&j, &[0]),
            Err(PipelineError::Validation(_))
        ));
        assert!(matches!(
            rerun_start(&j, &[9]),
            Err(PipelineError::Validation(_))
        ));
    }

    #[test]
    fn test_rerun_start_requires_lower_passes_completed() {
        let mut j = job(JobStatus::Error, 8);
        j.passes_status.set(1, PassStatus::Completed);
        j.passes_status.set(2, PassStatus::Completed);
        j.passes_status.set(3, PassStatus::Failed);
        assert_eq!(rerun_start(&j, &[3]).unwrap(), 3);
        assert_eq!(rerun_start(&j, &[2, 6]).unwrap(), 2);
        let err = rerun_start(&j, &[5]).unwrap_err();
        assert!(err.to_string().contains("pass 5"));
    }
}
