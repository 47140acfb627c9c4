//! Job creation and read-only job views.

use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

use super::open_pipeline;
use quill::config::QuillConfig;
use quill::job::{ChangeType, JobContext, JobStatus, PassStatus};
use quill::progress::Progress;
use quill::ui::icons::{CHECK, CROSS, IMAGE, PENDING, RUNNING};

pub struct CreateInput {
    pub topic_id: String,
    pub brief_id: String,
    pub brief: Option<String>,
    pub brief_file: Option<PathBuf>,
    pub business_info: Option<String>,
    pub business_info_file: Option<PathBuf>,
    pub draft_file: Option<PathBuf>,
}

fn read_file(path: &PathBuf, what: &str) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {} from {}", what, path.display()))
}

impl CreateInput {
    fn context(&self) -> Result<JobContext> {
        let brief = match (&self.brief, &self.brief_file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => read_file(path, "brief")?,
            (None, None) => anyhow::bail!("A content brief is required (--brief or --brief-file)"),
        };
        let business_info = match (&self.business_info, &self.business_info_file) {
            (Some(json), _) => json.clone(),
            (None, Some(path)) => read_file(path, "business info")?,
            (None, None) => "{}".to_string(),
        };
        let business_info =
            serde_json::from_str(&business_info).context("Business info is not valid JSON")?;
        Ok(JobContext {
            brief,
            business_info,
        })
    }

    fn initial_draft(&self) -> Result<String> {
        match &self.draft_file {
            Some(path) => read_file(path, "draft"),
            None => Ok(String::new()),
        }
    }
}

pub async fn cmd_create(config: &QuillConfig, input: CreateInput, json: bool) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let job = pipeline
        .create_job(
            &input.topic_id,
            &input.brief_id,
            input.context()?,
            input.initial_draft()?,
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&job)?);
    } else {
        println!("Created job {}", style(&job.id).bold());
        println!(
            "  {} passes, start with `quill start {}`",
            job.total_passes, job.id
        );
    }
    Ok(())
}

fn status_style(status: JobStatus) -> console::StyledObject<&'static str> {
    let s = style(status.as_str());
    match status {
        JobStatus::Completed => s.green(),
        JobStatus::InProgress => s.cyan(),
        JobStatus::Paused => s.yellow(),
        JobStatus::Error => s.red(),
        JobStatus::Cancelled => s.dim(),
        JobStatus::Pending => s,
    }
}

pub async fn cmd_jobs(config: &QuillConfig, json: bool) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let jobs = pipeline.list_jobs().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
        return Ok(());
    }
    if jobs.is_empty() {
        println!("No jobs yet. Create one with `quill create`.");
        return Ok(());
    }
    for job in &jobs {
        println!(
            "{}  {:<11}  {}/{}  topic={} brief={}",
            job.id,
            status_style(job.status),
            job.passes_status.completed_count(),
            job.total_passes,
            job.topic_id,
            job.brief_id
        );
    }
    Ok(())
}

/// Human-readable progress block shared by `status` and the run commands.
pub fn print_progress(progress: &Progress) {
    println!(
        "Job {}  {}",
        style(&progress.job_id).bold(),
        status_style(progress.status)
    );
    println!(
        "  {} ({}%) {}",
        progress.display_line(),
        progress.percent,
        style(&progress.current_pass_name).cyan()
    );
    for (key, status) in progress.passes_status.iter() {
        let icon = match status {
            PassStatus::Completed => CHECK,
            PassStatus::Failed => CROSS,
            PassStatus::InProgress => RUNNING,
            PassStatus::Pending => PENDING,
        };
        println!("    {}{:<8} {}", icon, key, status);
    }
    if let Some(score) = progress.final_audit_score {
        println!("  Audit score: {}", style(score).cyan());
    }
    if let Some(err) = &progress.last_error {
        println!("  {} {}", style("Last error:").red().bold(), err);
    }
}

pub async fn cmd_status(config: &QuillConfig, job_id: &str, json: bool) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let progress = pipeline.get_progress(job_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&progress)?);
    } else {
        print_progress(&progress);
    }
    Ok(())
}

pub async fn cmd_history(
    config: &QuillConfig,
    job_id: &str,
    show: Option<u32>,
    json: bool,
) -> Result<()> {
    let pipeline = open_pipeline(config)?;

    if let Some(version) = show {
        let v = pipeline.history().get(job_id, version).await?;
        if json {
            println!("{}", serde_json::to_string_pretty(&v)?);
        } else {
            print!("{}", v.content);
        }
        return Ok(());
    }

    let versions = pipeline.get_version_history(job_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }
    if versions.is_empty() {
        println!("No versions recorded for job {}", job_id);
        return Ok(());
    }
    for v in &versions {
        println!(
            "  v{:<3} {:>7} chars  {}",
            v.version,
            v.char_count,
            style(&v.saved_at).dim()
        );
    }
    Ok(())
}

pub async fn cmd_changes(config: &QuillConfig, job_id: &str, json: bool) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let report = pipeline.get_change_log(job_id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for entry in &report.entries {
        let marker = match entry.change_type {
            ChangeType::ImageAdded | ChangeType::ImageModified => IMAGE.to_string(),
            ChangeType::Other => String::new(),
        };
        println!(
            "  pass {:>2}  {}{} [{}] {}",
            entry.pass,
            marker,
            style(&entry.section_key).bold(),
            entry.change_type,
            style(&entry.reason).dim()
        );
        if !entry.criteria_met.is_empty() {
            println!("           criteria: {}", entry.criteria_met.join(", "));
        }
    }

    let summary = &report.summary;
    println!();
    println!(
        "{} changes, {} images added, {} images modified",
        summary.total_changes, summary.images_added, summary.images_modified
    );
    for (pass, count) in &summary.changes_by_pass {
        println!("  pass {:>2}: {}", pass, count);
    }
    Ok(())
}
