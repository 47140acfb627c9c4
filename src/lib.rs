pub mod changelog;
pub mod config;
pub mod errors;
pub mod executor;
pub mod history;
pub mod init;
pub mod job;
pub mod logging;
pub mod pass;
pub mod pipeline;
pub mod progress;
pub mod store;
pub mod ui;

pub use errors::{ExecutorError, PipelineError};
pub use executor::{PassExecutor, PassOutput};
pub use pipeline::{PassPipeline, PipelineEvent};
