//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                                        |
//! |-----------|---------------------------------------------------------|
//! | `project` | `Init`, `Passes`                                        |
//! | `config`  | `Config`                                                |
//! | `job`     | `Create`, `Jobs`, `Status`, `History`, `Changes`        |
//! | `run`     | `Start`, `Resume`, `Rerun`, `Pause`, `Cancel`, `Restore`, `Recover` |

pub mod config;
pub mod job;
pub mod project;
pub mod run;

pub use config::cmd_config;
pub use job::{CreateInput, cmd_changes, cmd_create, cmd_history, cmd_jobs, cmd_status};
pub use project::{cmd_init, cmd_passes};
pub use run::{RunAction, cmd_cancel, cmd_pause, cmd_recover, cmd_restore, cmd_run};

use anyhow::{Context, Result};
use std::sync::Arc;

use quill::config::QuillConfig;
use quill::executor::CommandPassExecutor;
use quill::pipeline::PassPipeline;
use quill::store::{DbHandle, JobStore};

/// Build a pipeline from the project's configuration.
pub fn open_pipeline(config: &QuillConfig) -> Result<PassPipeline> {
    if !config.is_initialized() {
        anyhow::bail!(
            "No quill project found at {}. Run `quill init` first.",
            config.project_dir.display()
        );
    }
    for warning in config.validate() {
        tracing::warn!("config: {}", warning);
    }

    let catalog = config.load_catalog()?;
    let store = JobStore::new(&config.db_path())
        .with_context(|| format!("Failed to open job database {}", config.db_path().display()))?;
    let executor = CommandPassExecutor::new(
        config.executor_command(),
        config.executor_args(),
        config.project_dir.clone(),
    );

    Ok(
        PassPipeline::new(DbHandle::new(store), Arc::new(executor), catalog)
            .with_pass_timeout(config.pass_timeout()),
    )
}
