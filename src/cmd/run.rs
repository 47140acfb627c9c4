//! Commands that change a job's state: `start`, `resume`, `rerun`, `pause`,
//! `cancel`, `restore` and `recover`.

use anyhow::Result;
use console::style;
use std::sync::Arc;

use super::job::print_progress;
use super::open_pipeline;
use quill::config::QuillConfig;
use quill::ui::PipelineUI;
use quill::ui::icons::{PAUSE, RESTORE, STOP};

pub enum RunAction {
    Start,
    Resume,
    Rerun(Vec<u32>),
}

/// Drive a job's pass loop in this process, rendering progress until it
/// completes, pauses, fails or is cancelled.
pub async fn cmd_run(config: &QuillConfig, job_id: &str, action: RunAction) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let job = pipeline.get_job(job_id).await?;

    let ui = Arc::new(PipelineUI::new(&job, config.verbose));
    let listener = ui.clone().spawn_listener(pipeline.subscribe());

    let result = match action {
        RunAction::Start => pipeline.start(job_id).await,
        RunAction::Resume => pipeline.resume(job_id).await,
        RunAction::Rerun(passes) => pipeline.rerun(job_id, &passes).await,
    };

    // Closing the channel lets the listener drain what is left and exit.
    let progress = pipeline.get_progress(job_id).await;
    drop(pipeline);
    if let Err(e) = listener.await {
        tracing::debug!(error = %e, "progress listener ended abnormally");
    }
    ui.finish();

    if let Ok(progress) = &progress {
        println!();
        print_progress(progress);
    }
    result?;
    Ok(())
}

pub async fn cmd_pause(config: &QuillConfig, job_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let job = pipeline.pause(job_id).await?;
    if job.control.is_some() {
        println!(
            "{}Pause requested; job {} stops after pass {} finishes",
            PAUSE, job.id, job.current_pass
        );
    } else {
        println!("{}Job {} is paused", PAUSE, job.id);
    }
    Ok(())
}

pub async fn cmd_cancel(config: &QuillConfig, job_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let job = pipeline.cancel(job_id).await?;
    println!("{}Job {} cancelled", STOP, job.id);
    Ok(())
}

pub async fn cmd_restore(config: &QuillConfig, job_id: &str, version: u32) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let restored = pipeline.restore_version(job_id, version).await?;
    println!(
        "{}Restored version {} of job {} as version {} ({} chars)",
        RESTORE,
        version,
        job_id,
        style(restored.version).bold(),
        restored.char_count
    );
    Ok(())
}

pub async fn cmd_recover(config: &QuillConfig, job_id: &str) -> Result<()> {
    let pipeline = open_pipeline(config)?;
    let job = pipeline.recover(job_id).await?;
    println!(
        "Job {} recovered as paused at pass {}; run `quill resume {}` to continue",
        job.id, job.current_pass, job.id
    );
    Ok(())
}
