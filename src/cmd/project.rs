//! Project initialization and pass catalog listing.

use anyhow::Result;
use console::style;

use quill::config::QuillConfig;
use quill::init::{CATALOG_FILE, init_project, is_initialized};

pub fn cmd_init(config: &QuillConfig, with_catalog: bool) -> Result<()> {
    let was_initialized = is_initialized(&config.project_dir);
    let result = init_project(&config.project_dir, with_catalog)?;

    if result.created {
        println!(
            "Initialized quill project at {}",
            result.quill_dir.display()
        );
        println!();
        println!("Created directory structure:");
        println!("  .quill/");
        println!("  ├── quill.toml    # Configuration");
        if result.catalog_written {
            println!("  ├── {}   # Editable pass catalog", CATALOG_FILE);
        }
        println!("  └── logs/         # Daily log files");
        println!();
        println!("Next steps:");
        println!("  1. Point [executor].command in quill.toml at your pass runner");
        println!("  2. Run `quill create` to register a job");
        println!("  3. Run `quill start <job-id>` to generate");
    } else if was_initialized {
        println!(
            "Quill project already initialized at {}",
            result.quill_dir.display()
        );
        if result.catalog_written {
            println!("Wrote default pass catalog to {}", CATALOG_FILE);
        }
        println!("Directory structure verified.");
    } else {
        println!(
            "Completed quill initialization at {}",
            result.quill_dir.display()
        );
    }

    Ok(())
}

pub fn cmd_passes(config: &QuillConfig, json: bool) -> Result<()> {
    let catalog = config.load_catalog()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&catalog)?);
        return Ok(());
    }

    println!(
        "Pass catalog v{} ({} passes)",
        catalog.version,
        catalog.total_passes()
    );
    println!();
    for pass in &catalog.passes {
        println!(
            "  {:>2}. {} {}",
            pass.number,
            style(&pass.label).bold(),
            style(&pass.description).dim()
        );
    }
    Ok(())
}
