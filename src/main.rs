use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;

use quill::config::QuillConfig;
use quill::logging::{LogConfig, init_logging};

mod cmd;

#[derive(Parser)]
#[command(name = "quill")]
#[command(version, about = "Resumable multi-pass AI content generation pipeline")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Seconds a single pass may run. Overrides quill.toml and QUILL_PASS_TIMEOUT_SECS.
    #[arg(long, global = true)]
    pub pass_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new quill project
    Init {
        /// Also write the default pass catalog to .quill/passes.json for editing
        #[arg(long)]
        with_catalog: bool,
    },
    /// List the passes every job runs through
    Passes {
        #[arg(long)]
        json: bool,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
    /// Create a pending job
    #[command(group(ArgGroup::new("brief_source").required(true).args(["brief", "brief_file"])))]
    Create {
        #[arg(long)]
        topic: String,

        #[arg(long)]
        brief_id: String,

        /// Content brief text
        #[arg(long)]
        brief: Option<String>,

        /// Read the content brief from a file
        #[arg(long)]
        brief_file: Option<PathBuf>,

        /// Business info as a JSON object
        #[arg(long, conflicts_with = "business_info_file")]
        business_info: Option<String>,

        /// Read business info JSON from a file
        #[arg(long)]
        business_info_file: Option<PathBuf>,

        /// Seed the working draft from a file
        #[arg(long)]
        draft_file: Option<PathBuf>,

        #[arg(long)]
        json: bool,
    },
    /// List all jobs, newest first
    Jobs {
        #[arg(long)]
        json: bool,
    },
    /// Run a pending job's passes
    Start { job_id: String },
    /// Ask a running job to pause at the next pass boundary
    Pause { job_id: String },
    /// Continue a paused job or retry a failed pass
    Resume { job_id: String },
    /// Cancel a job (terminal)
    Cancel { job_id: String },
    /// Rerun passes from the lowest selected pass to the end
    Rerun {
        job_id: String,

        /// Pass numbers, comma-separated (e.g. 5,7)
        #[arg(long, value_delimiter = ',', required = true)]
        passes: Vec<u32>,
    },
    /// Make an earlier draft version the working draft
    Restore { job_id: String, version: u32 },
    /// Move a job left in_progress by a crashed process to paused
    Recover { job_id: String },
    /// Show a job's progress
    Status {
        job_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Show a job's draft versions
    History {
        job_id: String,

        /// Print the content of one version
        #[arg(long)]
        show: Option<u32>,

        #[arg(long)]
        json: bool,
    },
    /// Show a job's change log and summary
    Changes {
        job_id: String,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let config = QuillConfig::with_cli_args(project_dir, cli.verbose, cli.pass_timeout)?;
    let _log_guard = init_logging(LogConfig {
        verbose: cli.verbose,
        json: cli.json_logs,
        log_dir: Some(config.log_dir()),
    })?;

    match &cli.command {
        Commands::Init { with_catalog } => cmd::cmd_init(&config, *with_catalog)?,
        Commands::Passes { json } => cmd::cmd_passes(&config, *json)?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
        Commands::Create {
            topic,
            brief_id,
            brief,
            brief_file,
            business_info,
            business_info_file,
            draft_file,
            json,
        } => {
            let input = cmd::CreateInput {
                topic_id: topic.clone(),
                brief_id: brief_id.clone(),
                brief: brief.clone(),
                brief_file: brief_file.clone(),
                business_info: business_info.clone(),
                business_info_file: business_info_file.clone(),
                draft_file: draft_file.clone(),
            };
            cmd::cmd_create(&config, input, *json).await?
        }
        Commands::Jobs { json } => cmd::cmd_jobs(&config, *json).await?,
        Commands::Start { job_id } => cmd::cmd_run(&config, job_id, cmd::RunAction::Start).await?,
        Commands::Resume { job_id } => {
            cmd::cmd_run(&config, job_id, cmd::RunAction::Resume).await?
        }
        Commands::Rerun { job_id, passes } => {
            cmd::cmd_run(&config, job_id, cmd::RunAction::Rerun(passes.clone())).await?
        }
        Commands::Pause { job_id } => cmd::cmd_pause(&config, job_id).await?,
        Commands::Cancel { job_id } => cmd::cmd_cancel(&config, job_id).await?,
        Commands::Restore { job_id, version } => {
            cmd::cmd_restore(&config, job_id, *version).await?
        }
        Commands::Recover { job_id } => cmd::cmd_recover(&config, job_id).await?,
        Commands::Status { job_id, json } => cmd::cmd_status(&config, job_id, *json).await?,
        Commands::History { job_id, show, json } => {
            cmd::cmd_history(&config, job_id, *show, *json).await?
        }
        Commands::Changes { job_id, json } => cmd::cmd_changes(&config, job_id, *json).await?,
    }

    Ok(())
}
