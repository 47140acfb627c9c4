//! Integration tests for Quill
//!
//! These tests drive the `quill` binary end to end against a temp project.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a quill Command
fn quill() -> Command {
    cargo_bin_cmd!("quill")
}

/// Helper to create a temporary project directory
fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Helper to initialize a quill project in a temp directory
fn init_quill_project(dir: &TempDir) {
    quill()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

/// Point the project's executor at a shell script.
#[cfg(unix)]
fn use_script_executor(dir: &TempDir, script: &str) {
    let toml = format!(
        "[pipeline]\npass_timeout_secs = 30\n\n[executor]\ncommand = \"sh\"\nargs = [\"-c\", '''{} ''']\n",
        script
    );
    fs::write(dir.path().join(".quill/quill.toml"), toml).unwrap();
}

/// Create a job with a valid brief and return its id.
fn create_job(dir: &TempDir) -> String {
    let output = quill()
        .current_dir(dir.path())
        .args([
            "create",
            "--topic",
            "topic-1",
            "--brief-id",
            "brief-1",
            "--brief",
            "Explain long-term maintenance planning",
            "--business-info",
            r#"{"company":"Acme Beheer"}"#,
            "--json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success(), "create failed: {:?}", output);
    let job: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    job["id"].as_str().unwrap().to_string()
}

#[cfg(unix)]
const GENERATING_SCRIPT: &str = r#"cat > /dev/null; echo '{"draft":"generated text","change_log":[{"section_key":"intro","change_type":"image_added","reason":"hero"}]}'"#;

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_quill_help() {
        quill()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("rerun"));
    }

    #[test]
    fn test_quill_version() {
        quill().arg("--version").assert().success();
    }

    #[test]
    fn test_quill_init_creates_structure() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("Initialized quill project"));

        assert!(dir.path().join(".quill").exists());
        assert!(dir.path().join(".quill/quill.toml").exists());
        assert!(dir.path().join(".quill/logs").exists());
    }

    #[test]
    fn test_quill_init_idempotent() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("already initialized"));
    }

    #[test]
    fn test_quill_init_with_catalog() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .args(["init", "--with-catalog"])
            .assert()
            .success();

        let catalog = fs::read_to_string(dir.path().join(".quill/passes.json")).unwrap();
        assert!(catalog.contains("Draft Generation"));
    }

    #[test]
    fn test_passes_lists_catalog() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .arg("passes")
            .assert()
            .success()
            .stdout(predicate::str::contains("Draft Generation"))
            .stdout(predicate::str::contains("10 passes"));
    }

    #[test]
    fn test_jobs_requires_init() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .arg("jobs")
            .assert()
            .failure()
            .stderr(predicate::str::contains("quill init"));
    }

    #[test]
    fn test_jobs_empty() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .arg("jobs")
            .assert()
            .success()
            .stdout(predicate::str::contains("No jobs yet"));
    }

    #[test]
    fn test_rerun_requires_passes() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .args(["rerun", "some-job"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Configuration Tests
// =============================================================================

mod configuration {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();

        quill()
            .current_dir(dir.path())
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("No quill.toml found"))
            .stdout(predicate::str::contains("pass_timeout_secs = 600"));
    }

    #[test]
    fn test_config_env_and_cli_overrides() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .env("QUILL_EXECUTOR_CMD", "my-runner")
            .args(["--pass-timeout", "42", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("executor command = \"my-runner\""))
            .stdout(predicate::str::contains("pass timeout = 42s"));
    }

    #[test]
    fn test_config_validate_flags_missing_catalog() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        fs::write(
            dir.path().join(".quill/quill.toml"),
            "[pipeline]\ncatalog_file = \"missing.json\"\n",
        )
        .unwrap();

        quill()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Pass catalog error"));
    }
}

// =============================================================================
// Job Lifecycle Tests
// =============================================================================

mod jobs {
    use super::*;

    #[test]
    fn test_create_and_status() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("pending"))
            .stdout(predicate::str::contains("Pass 1 of 10"))
            .stdout(predicate::str::contains("Draft Generation"));

        quill()
            .current_dir(dir.path())
            .arg("jobs")
            .assert()
            .success()
            .stdout(predicate::str::contains(id.as_str()));
    }

    #[test]
    fn test_create_rejects_invalid_business_info() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .args([
                "create",
                "--topic",
                "t",
                "--brief-id",
                "b",
                "--brief",
                "A real brief",
                "--business-info",
                "not json",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not valid JSON"));
    }

    #[test]
    fn test_status_unknown_job() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .args(["status", "no-such-job"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not found"));
    }

    #[test]
    fn test_create_requires_a_brief() {
        let dir = create_temp_project();
        init_quill_project(&dir);

        quill()
            .current_dir(dir.path())
            .args(["create", "--topic", "t", "--brief-id", "b"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--brief"));

        quill()
            .current_dir(dir.path())
            .args(["create", "--topic", "t", "--brief-id", "b", "--brief", "   "])
            .assert()
            .failure()
            .stderr(predicate::str::contains("brief is missing"));

        quill()
            .current_dir(dir.path())
            .args([
                "create",
                "--topic",
                "t",
                "--brief-id",
                "b",
                "--brief",
                "A real brief",
                "--business-info",
                r#"["Acme"]"#,
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("JSON object"));

        quill()
            .current_dir(dir.path())
            .arg("jobs")
            .assert()
            .success()
            .stdout(predicate::str::contains("No jobs yet"));
    }

    #[test]
    fn test_create_reads_brief_from_file() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        let brief = dir.path().join("brief.md");
        fs::write(&brief, "Explain long-term maintenance planning").unwrap();

        quill()
            .current_dir(dir.path())
            .args(["create", "--topic", "t", "--brief-id", "b", "--brief-file"])
            .arg(&brief)
            .assert()
            .success()
            .stdout(predicate::str::contains("Created job"));

        quill()
            .current_dir(dir.path())
            .args(["create", "--topic", "t", "--brief-id", "b", "--brief", "x", "--brief-file"])
            .arg(&brief)
            .assert()
            .failure();
    }

    #[test]
    fn test_cancel_is_terminal() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["cancel", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("cancelled"));

        quill()
            .current_dir(dir.path())
            .args(["start", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cannot start"));
    }

    #[test]
    fn test_pause_pending_job_is_rejected() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["pause", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Cannot pause"));
    }
}

// =============================================================================
// Pass Execution Tests
// =============================================================================

#[cfg(unix)]
mod execution {
    use super::*;

    #[test]
    fn test_start_runs_all_passes() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        use_script_executor(&dir, GENERATING_SCRIPT);
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["start", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));

        quill()
            .current_dir(dir.path())
            .args(["status", &id, "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"percent\": 100"));

        quill()
            .current_dir(dir.path())
            .args(["history", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("v10"));

        quill()
            .current_dir(dir.path())
            .args(["changes", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("10 changes, 10 images added"));
    }

    #[test]
    fn test_executor_from_env_override() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        let id = create_job(&dir);

        // The default executor binary does not exist; the env override wins.
        quill()
            .current_dir(dir.path())
            .env("QUILL_EXECUTOR_CMD", "quill-definitely-not-installed")
            .args(["start", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Pass 1"));

        quill()
            .current_dir(dir.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("error"));
    }

    #[test]
    fn test_failed_pass_then_resume() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        use_script_executor(&dir, "cat > /dev/null; echo overloaded >&2; exit 3");
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["start", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("overloaded"));

        use_script_executor(&dir, GENERATING_SCRIPT);
        quill()
            .current_dir(dir.path())
            .args(["resume", &id])
            .assert()
            .success();

        quill()
            .current_dir(dir.path())
            .args(["status", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("completed"));
    }

    #[test]
    fn test_rerun_and_restore() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        use_script_executor(&dir, GENERATING_SCRIPT);
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["start", &id])
            .assert()
            .success();

        quill()
            .current_dir(dir.path())
            .args(["rerun", &id, "--passes", "9,10"])
            .assert()
            .success();

        quill()
            .current_dir(dir.path())
            .args(["history", &id])
            .assert()
            .success()
            .stdout(predicate::str::contains("v12"));

        quill()
            .current_dir(dir.path())
            .args(["restore", &id, "1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("as version 13"));

        quill()
            .current_dir(dir.path())
            .args(["history", &id, "--show", "2"])
            .assert()
            .success()
            .stdout(predicate::str::contains("generated text"));
    }

    #[test]
    fn test_pass_timeout_flag() {
        let dir = create_temp_project();
        init_quill_project(&dir);
        use_script_executor(&dir, "cat > /dev/null; sleep 5");
        let id = create_job(&dir);

        quill()
            .current_dir(dir.path())
            .args(["--pass-timeout", "1", "start", &id])
            .assert()
            .failure()
            .stderr(predicate::str::contains("timed out"));
    }
}
