use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::job::Job;
use crate::pipeline::PipelineEvent;
use crate::ui::icons::{CHECK, CROSS, PAUSE, RESTORE, RUNNING, SPARKLE, STOP};

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Pass bar: how many passes of the job have completed
/// - Activity spinner: the pass currently being executed
pub struct PipelineUI {
    multi: MultiProgress,
    pass_bar: ProgressBar,
    activity: ProgressBar,
    job_id: String,
    verbose: bool,
}

impl PipelineUI {
    /// Size the pass bar from `job` and position it at its completed count.
    pub fn new(job: &Job, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let pass_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let pass_bar = multi.add(ProgressBar::new(job.total_passes as u64));
        pass_bar.set_style(pass_style);
        pass_bar.set_prefix("Passes");
        pass_bar.set_position(job.passes_status.completed_count() as u64);

        let activity_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg} {elapsed:.dim}")
            .expect("progress bar template is a valid static string");

        let activity = multi.add(ProgressBar::new_spinner());
        activity.set_style(activity_style);
        activity.set_prefix("   Now");

        Self {
            multi,
            pass_bar,
            activity,
            job_id: job.id.clone(),
            verbose,
        }
    }

    /// Print a line above the bars, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Apply one event. Returns true once the run has reached a resting state.
    pub fn handle(&self, event: &PipelineEvent) -> bool {
        if event.job_id() != self.job_id {
            return false;
        }
        match event {
            PipelineEvent::JobStarted { job } => {
                self.pass_bar
                    .set_position(job.passes_status.completed_count() as u64);
                false
            }
            PipelineEvent::PassStarted { pass, label, .. } => {
                self.pass_bar.set_message(format!(
                    "{} {}",
                    style(format!("Pass {}", pass)).yellow(),
                    label
                ));
                self.activity.reset_elapsed();
                self.activity
                    .set_message(format!("{}{}", RUNNING, style(label).cyan()));
                self.activity.enable_steady_tick(Duration::from_millis(100));
                false
            }
            PipelineEvent::PassCompleted {
                pass,
                changes,
                audit_score,
                ..
            } => {
                self.pass_bar.inc(1);
                let score = audit_score
                    .map(|s| format!(", audit score {}", style(s).cyan()))
                    .unwrap_or_default();
                self.print_line(format!(
                    "  {}Pass {} completed ({} change{}{})",
                    CHECK,
                    pass,
                    changes,
                    if *changes == 1 { "" } else { "s" },
                    score
                ));
                false
            }
            PipelineEvent::PassFailed { pass, error, .. } => {
                self.activity.finish_and_clear();
                self.print_line(format!(
                    "  {}Pass {} failed: {}",
                    CROSS,
                    pass,
                    style(error).red()
                ));
                true
            }
            PipelineEvent::JobPaused { job } => {
                self.activity.finish_and_clear();
                self.print_line(format!(
                    "  {}Paused before pass {}",
                    PAUSE, job.current_pass
                ));
                true
            }
            PipelineEvent::JobCompleted { .. } => {
                self.activity.finish_and_clear();
                self.pass_bar.finish_with_message(format!("{}done", SPARKLE));
                true
            }
            PipelineEvent::JobCancelled { .. } => {
                self.activity.finish_and_clear();
                self.print_line(format!("  {}Cancelled", STOP));
                true
            }
            PipelineEvent::VersionRestored {
                restored_from,
                version,
                ..
            } => {
                if self.verbose {
                    self.print_line(format!(
                        "  {}Restored version {} as version {}",
                        RESTORE, restored_from, version.version
                    ));
                }
                false
            }
        }
    }

    /// Clear any bars still on screen.
    pub fn finish(&self) {
        self.activity.finish_and_clear();
        if !self.pass_bar.is_finished() {
            self.pass_bar.abandon();
        }
    }

    /// Render events from `rx` until the run comes to rest or the channel closes.
    pub fn spawn_listener(
        self: Arc<Self>,
        mut rx: broadcast::Receiver<PipelineEvent>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if self.handle(&event) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "progress UI lagged behind pipeline events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
