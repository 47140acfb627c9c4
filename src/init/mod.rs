//! `quill init`: create the `.quill/` directory in a project.
//!
//! ```text
//! .quill/
//! ├── quill.toml       # Configuration (defaults written on first init)
//! ├── passes.json      # Optional editable pass catalog (--with-catalog)
//! ├── quill.db         # Job database, created on first use
//! └── logs/            # Daily-rolling log files
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::{CONFIG_FILE, QUILL_DIR, QuillToml};
use crate::pass::PassCatalog;

pub const CATALOG_FILE: &str = "passes.json";

#[derive(Debug)]
pub struct InitResult {
    pub quill_dir: PathBuf,
    /// Whether the directory was newly created (false if it already existed)
    pub created: bool,
    /// Whether an editable pass catalog was written
    pub catalog_written: bool,
}

/// Initialize a quill project in `project_dir`. Existing files are left alone.
pub fn init_project(project_dir: &Path, with_catalog: bool) -> Result<InitResult> {
    let quill_dir = project_dir.join(QUILL_DIR);
    let created = !quill_dir.exists();

    let logs_dir = quill_dir.join("logs");
    std::fs::create_dir_all(&logs_dir)
        .with_context(|| format!("Failed to create directory: {}", logs_dir.display()))?;

    let config_path = quill_dir.join(CONFIG_FILE);
    let mut toml = QuillToml::load_or_default(&quill_dir)?;

    let mut catalog_written = false;
    if with_catalog {
        let catalog_path = quill_dir.join(CATALOG_FILE);
        if !catalog_path.exists() {
            PassCatalog::default().save(&catalog_path)?;
            catalog_written = true;
        }
        if toml.pipeline.catalog_file.is_none() {
            toml.pipeline.catalog_file = Some(CATALOG_FILE.to_string());
            toml.save(&config_path)?;
        }
    }

    if !config_path.exists() {
        toml.save(&config_path)?;
    }

    Ok(InitResult {
        quill_dir,
        created,
        catalog_written,
    })
}

pub fn is_initialized(project_dir: &Path) -> bool {
    project_dir.join(QUILL_DIR).join(CONFIG_FILE).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_structure() {
        let dir = TempDir::new().unwrap();
        assert!(!is_initialized(dir.path()));

        let result = init_project(dir.path(), false).unwrap();
        assert!(result.created);
        assert!(!result.catalog_written);
        assert!(result.quill_dir.join("logs").is_dir());
        assert!(is_initialized(dir.path()));

        let toml = QuillToml::load(&result.quill_dir.join(CONFIG_FILE)).unwrap();
        assert!(toml.pipeline.catalog_file.is_none());
    }

    #[test]
    fn test_init_is_idempotent_and_keeps_config() {
        let dir = TempDir::new().unwrap();
        init_project(dir.path(), false).unwrap();
        let config_path = dir.path().join(QUILL_DIR).join(CONFIG_FILE);
        std::fs::write(&config_path, "[executor]\ncommand = \"custom\"\n").unwrap();

        let result = init_project(dir.path(), false).unwrap();
        assert!(!result.created);
        let toml = QuillToml::load(&config_path).unwrap();
        assert_eq!(toml.executor.command, "custom");
    }

    #[test]
    fn test_init_with_catalog() {
        let dir = TempDir::new().unwrap();
        let result = init_project(dir.path(), true).unwrap();
        assert!(result.catalog_written);

        let catalog = PassCatalog::load(&result.quill_dir.join(CATALOG_FILE)).unwrap();
        assert_eq!(catalog, PassCatalog::default());
        let toml = QuillToml::load(&result.quill_dir.join(CONFIG_FILE)).unwrap();
        assert_eq!(toml.pipeline.catalog_file.as_deref(), Some(CATALOG_FILE));
    }
}
