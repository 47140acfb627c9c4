use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::errors::ExecutorError;
use crate::job::{JobContext, NewChangeLogEntry};
use crate::pass::PassDefinition;

/// What a pass produced: the rewritten draft and the edits it made.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PassOutput {
    pub draft: String,
    #[serde(default)]
    pub change_log: Vec<NewChangeLogEntry>,
    #[serde(default)]
    pub audit_score: Option<f64>,
}

/// JSON document written to an external executor's stdin.
#[derive(Debug, Serialize)]
pub struct PassRequest<'a> {
    pub pass: &'a PassDefinition,
    pub draft: &'a str,
    pub context: &'a JobContext,
}

/// The capability that turns one draft into the next for a given pass.
/// Real implementation: `CommandPassExecutor`. Tests supply scripted doubles.
#[async_trait]
pub trait PassExecutor: Send + Sync {
    async fn run(
        &self,
        pass: &PassDefinition,
        draft: &str,
        context: &JobContext,
    ) -> Result<PassOutput, ExecutorError>;
}

/// Runs each pass as a subprocess speaking JSON over stdin/stdout.
pub struct CommandPassExecutor {
    command: String,
    args: Vec<String>,
    working_dir: PathBuf,
}

impl CommandPassExecutor {
    pub fn new(command: impl Into<String>, args: Vec<String>, working_dir: PathBuf) -> Self {
        Self {
            command: command.into(),
            args,
            working_dir,
        }
    }

    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

#[async_trait]
impl PassExecutor for CommandPassExecutor {
    async fn run(
        &self,
        pass: &PassDefinition,
        draft: &str,
        context: &JobContext,
    ) -> Result<PassOutput, ExecutorError> {
        let request = serde_json::to_vec(&PassRequest {
            pass,
            draft,
            context,
        })
        .map_err(|e| ExecutorError::Failed(format!("failed to encode request: {}", e)))?;

        tracing::debug!(pass = pass.number, command = %self.command_line(), "spawning pass executor");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .current_dir(&self.working_dir)
            .kill_on_drop(true)
            .spawn()
            .map_err(ExecutorError::Spawn)?;

        let stdin = child.stdin.take();
        let write_request = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&request).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        // Feed stdin while draining stdout so a chatty child cannot block on a full pipe.
        let (written, output) = tokio::join!(write_request, child.wait_with_output());
        let output = output.map_err(ExecutorError::Spawn)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.trim();
            return Err(ExecutorError::Failed(if detail.is_empty() {
                format!("executor exited with {}", output.status)
            } else {
                format!("executor exited with {}: {}", output.status, detail)
            }));
        }
        if let Err(e) = written {
            tracing::warn!(pass = pass.number, error = %e, "executor closed stdin early");
        }

        serde_json::from_slice::<PassOutput>(&output.stdout)
            .map_err(|e| ExecutorError::InvalidOutput(e.to_string()))
    }
}
