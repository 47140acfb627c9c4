//! Configuration for quill, read from `.quill/quill.toml`.
//!
//! Settings are layered file → environment → CLI:
//!
//! ```toml
//! [pipeline]
//! pass_timeout_secs = 600
//! catalog_file = "passes.json"
//!
//! [executor]
//! command = "quill-pass"
//! args = []
//!
//! [database]
//! path = "quill.db"
//! ```
//!
//! `QUILL_EXECUTOR_CMD` and `QUILL_PASS_TIMEOUT_SECS` override the file.
//! Relative paths resolve against the `.quill` directory.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pass::PassCatalog;

pub const QUILL_DIR: &str = ".quill";
pub const CONFIG_FILE: &str = "quill.toml";
pub const EXECUTOR_CMD_ENV: &str = "QUILL_EXECUTOR_CMD";
pub const PASS_TIMEOUT_ENV: &str = "QUILL_PASS_TIMEOUT_SECS";

/// Pipeline behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Seconds a single pass may run before it is treated as failed
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,
    /// Optional JSON pass catalog overriding the built-in one
    #[serde(default)]
    pub catalog_file: Option<String>,
}

fn default_pass_timeout_secs() -> u64 {
    600
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            pass_timeout_secs: default_pass_timeout_secs(),
            catalog_file: None,
        }
    }
}

/// External pass executor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSection {
    #[serde(default = "default_executor_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_executor_command() -> String {
    "quill-pass".to_string()
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            command: default_executor_command(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "quill.db".to_string()
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// The complete quill.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QuillToml {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub executor: ExecutorSection,
    #[serde(default)]
    pub database: DatabaseSection,
}

impl QuillToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse quill.toml")
    }

    /// Load `quill.toml` from `quill_dir`, or defaults if it doesn't exist.
    pub fn load_or_default(quill_dir: &Path) -> Result<Self> {
        let config_path = quill_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize quill.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Executor command after applying the environment override.
    pub fn executor_command_with(&self, env: impl Fn(&str) -> Option<String>) -> String {
        env(EXECUTOR_CMD_ENV)
            .filter(|cmd| !cmd.trim().is_empty())
            .unwrap_or_else(|| self.executor.command.clone())
    }

    /// Pass timeout in seconds after applying the environment override.
    /// An unparsable override is ignored.
    pub fn pass_timeout_secs_with(&self, env: impl Fn(&str) -> Option<String>) -> u64 {
        env(PASS_TIMEOUT_ENV)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(self.pipeline.pass_timeout_secs)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.pass_timeout_secs == 0 {
            warnings.push(
                "pass_timeout_secs is 0: every pass will time out immediately".to_string(),
            );
        }
        if self.executor.command.trim().is_empty() {
            warnings.push("executor.command is empty".to_string());
        }
        if let Some(ref file) = self.pipeline.catalog_file
            && file.trim().is_empty()
        {
            warnings.push("pipeline.catalog_file is set but empty".to_string());
        }

        warnings
    }
}

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct QuillConfig {
    pub project_dir: PathBuf,
    pub quill_dir: PathBuf,
    pub toml: QuillToml,
    pub verbose: bool,
    /// CLI override for the pass timeout
    pub cli_pass_timeout_secs: Option<u64>,
}

impl QuillConfig {
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let quill_dir = project_dir.join(QUILL_DIR);
        let toml = QuillToml::load_or_default(&quill_dir)?;

        Ok(Self {
            project_dir,
            quill_dir,
            toml,
            verbose: false,
            cli_pass_timeout_secs: None,
        })
    }

    pub fn with_cli_args(
        project_dir: PathBuf,
        verbose: bool,
        pass_timeout_secs: Option<u64>,
    ) -> Result<Self> {
        let mut config = Self::new(project_dir)?;
        config.verbose = verbose;
        config.cli_pass_timeout_secs = pass_timeout_secs;
        Ok(config)
    }

    pub fn is_initialized(&self) -> bool {
        self.config_file().exists()
    }

    pub fn config_file(&self) -> PathBuf {
        self.quill_dir.join(CONFIG_FILE)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.quill_dir.join("logs")
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.toml.database.path)
    }

    pub fn catalog_path(&self) -> Option<PathBuf> {
        self.toml
            .pipeline
            .catalog_file
            .as_deref()
            .filter(|f| !f.trim().is_empty())
            .map(|f| self.resolve(f))
    }

    /// Executor command (env → file → default).
    pub fn executor_command(&self) -> String {
        self.toml.executor_command_with(process_env)
    }

    pub fn executor_args(&self) -> Vec<String> {
        self.toml.executor.args.clone()
    }

    /// Pass timeout (CLI → env → file → default).
    pub fn pass_timeout(&self) -> Duration {
        let secs = self
            .cli_pass_timeout_secs
            .unwrap_or_else(|| self.toml.pass_timeout_secs_with(process_env));
        Duration::from_secs(secs)
    }

    /// The configured pass catalog, or the built-in one.
    pub fn load_catalog(&self) -> Result<PassCatalog> {
        let path = self.catalog_path();
        if let Some(ref p) = path
            && !p.exists()
        {
            anyhow::bail!("Pass catalog file not found: {}", p.display());
        }
        PassCatalog::load_or_default(path.as_deref())
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.quill_dir.join(p)
        }
    }
}
