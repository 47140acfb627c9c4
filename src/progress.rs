//! Read-side projection of a job into progress figures.

use serde::Serialize;

use crate::job::{Job, JobStatus, PassesStatus};
use crate::pass::PassCatalog;

pub const COMPLETE_LABEL: &str = "Complete";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Progress {
    pub job_id: String,
    pub status: JobStatus,
    pub current_pass: u32,
    pub total_passes: u32,
    /// 0–100, rounded.
    pub percent: u32,
    pub current_pass_name: String,
    pub passes_status: PassesStatus,
    pub last_error: Option<String>,
    pub final_audit_score: Option<f64>,
}

impl Progress {
    /// "Pass N of M", capped at M once every pass has run.
    pub fn display_line(&self) -> String {
        format!(
            "Pass {} of {}",
            self.current_pass.min(self.total_passes),
            self.total_passes
        )
    }
}

/// Project `job` into progress figures. Pure.
pub fn progress(job: &Job, catalog: &PassCatalog) -> Progress {
    let completed = job.passes_status.completed_count();
    Progress {
        job_id: job.id.clone(),
        status: job.status,
        current_pass: job.current_pass,
        total_passes: job.total_passes,
        percent: percent(completed, job.total_passes),
        current_pass_name: current_pass_name(job, catalog),
        passes_status: job.passes_status.clone(),
        last_error: job.last_error.clone(),
        final_audit_score: job.final_audit_score,
    }
}

fn percent(completed: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 * 100.0) / total as f64).round() as u32
}

fn current_pass_name(job: &Job, catalog: &PassCatalog) -> String {
    if job.all_passes_done() {
        return COMPLETE_LABEL.to_string();
    }
    catalog
        .get(job.current_pass)
        .map(|p| p.label.clone())
        .unwrap_or_else(|| format!("Pass {}", job.current_pass))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::PassStatus;

    fn job(total: u32) -> Job {
        Job {
            id: "job-1".into(),
            topic_id: "t".into(),
            brief_id: "b".into(),
            total_passes: total,
            current_pass: 1,
            status: JobStatus::Pending,
            passes_status: PassesStatus::new(total).unwrap(),
            draft: String::new(),
            last_error: None,
            final_audit_score: None,
            control: None,
            version_tag: 0,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_percent_rounding() {
        assert_eq!(percent(0, 8), 0);
        assert_eq!(percent(3, 8), 38);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(8, 8), 100);
        assert_eq!(percent(0, 0), 0);
    }

    #[test]
    fn test_progress_mid_pipeline() {
        let catalog = PassCatalog::default();
        let mut job = job(10);
        job.status = JobStatus::InProgress;
        for n in 1..=3 {
            job.passes_status.set(n, PassStatus::Completed);
        }
        job.current_pass = 4;

        let p = progress(&job, &catalog);
        assert_eq!(p.percent, 30);
        assert_eq!(p.current_pass_name, "Visual Semantics");
        assert_eq!(p.display_line(), "Pass 4 of 10");
    }

    #[test]
    fn test_progress_complete() {
        let catalog = PassCatalog::default();
        let mut job = job(8);
        for n in 1..=8 {
            job.passes_status.set(n, PassStatus::Completed);
        }
        job.current_pass = 9;
        job.status = JobStatus::Completed;

        let p = progress(&job, &catalog);
        assert_eq!(p.percent, 100);
        assert_eq!(p.current_pass_name, COMPLETE_LABEL);
        assert_eq!(p.display_line(), "Pass 8 of 8");
    }

    #[test]
    fn test_progress_surfaces_error() {
        let catalog = PassCatalog::default();
        let mut job = job(8);
        job.status = JobStatus::Error;
        job.passes_status.set(1, PassStatus::Completed);
        job.passes_status.set(2, PassStatus::Failed);
        job.current_pass = 2;
        job.last_error = Some("Pass 2 failed: rate limited".into());

        let p = progress(&job, &catalog);
        assert_eq!(p.percent, 13);
        assert_eq!(p.passes_status.get(2), Some(PassStatus::Failed));
        assert_eq!(p.last_error.as_deref(), Some("Pass 2 failed: rate limited"));
    }
}
