//! Configuration view and validation: `quill config`.

use anyhow::Result;

use super::super::ConfigCommands;
use quill::config::QuillConfig;

pub fn cmd_config(config: &QuillConfig, command: Option<ConfigCommands>) -> Result<()> {
    let config_path = config.config_file();

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            if config_path.exists() {
                println!("Config file: {}", config_path.display());
            } else {
                println!("No quill.toml found at {}", config_path.display());
                println!("Using default configuration.");
            }
            println!();

            let toml = &config.toml;
            println!("[pipeline]");
            println!("  pass_timeout_secs = {}", toml.pipeline.pass_timeout_secs);
            if let Some(file) = &toml.pipeline.catalog_file {
                println!("  catalog_file = \"{}\"", file);
            }
            println!();
            println!("[executor]");
            println!("  command = \"{}\"", toml.executor.command);
            println!("  args = {:?}", toml.executor.args);
            println!();
            println!("[database]");
            println!("  path = \"{}\"", toml.database.path);
            println!();

            println!("Effective values (with env/CLI overrides):");
            println!("  executor command = \"{}\"", config.executor_command());
            println!("  pass timeout = {}s", config.pass_timeout().as_secs());
            println!("  database = {}", config.db_path().display());
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !config_path.exists() {
                println!("No quill.toml found. Using defaults (valid).");
                return Ok(());
            }

            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            if let Err(e) = config.load_catalog() {
                println!("Pass catalog error: {:#}", e);
            }
            println!();
        }
    }

    Ok(())
}
