//! Integration tests for the pulse CLI
//!
//! These tests run the built binary against temporary project directories and
//! a local backend.

mod common;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

use common::{Backend, StreamMode, TOKEN, serve};

/// Helper to create a pulse Command isolated from the caller's environment
fn pulse(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("pulse");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env("XDG_CONFIG_HOME", dir.path().join(".config"))
        .env_remove("PULSE_TOKEN")
        .env_remove("PULSE_BASE_URL")
        .env_remove("PULSE_ENABLE_FALLBACK")
        .env_remove("PULSE_POLLING_INTERVAL_MS")
        .env_remove("PULSE_LOG")
        .env_remove("RUST_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

fn write_config(dir: &TempDir, content: &str) {
    let config_dir = dir.path().join(".pulse");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("pulse.toml"), content).unwrap();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_pulse_help() {
        let dir = create_temp_project();
        pulse(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("watch"))
            .stdout(predicate::str::contains("status"))
            .stdout(predicate::str::contains("config"));
    }

    #[test]
    fn test_pulse_version() {
        let dir = create_temp_project();
        pulse(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_watch_requires_task_id() {
        let dir = create_temp_project();
        pulse(&dir).arg("watch").assert().failure();
    }
}

// =============================================================================
// Config Command Tests
// =============================================================================

mod config_command {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = create_temp_project();
        pulse(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No pulse.toml found"))
            .stdout(predicate::str::contains(
                "base_url = \"http://localhost:8000\"",
            ))
            .stdout(predicate::str::contains("heartbeat_check_interval_ms = 15000"));
    }

    #[test]
    fn test_config_init_creates_file_once() {
        let dir = create_temp_project();
        pulse(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created pulse.toml"));

        let content = fs::read_to_string(dir.path().join(".pulse/pulse.toml")).unwrap();
        assert!(content.contains("[progress]"));
        assert!(content.contains("max_reconnect_attempts = 5"));

        pulse(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = create_temp_project();
        write_config(
            &dir,
            r#"
[server]
base_url = "localhost:8000"
stream_path = "/api/tasks/stream"

[progress]
heartbeat_timeout_ms = 10000
heartbeat_check_interval_ms = 20000
"#,
        );

        pulse(&dir)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("base_url"))
            .stdout(predicate::str::contains("stream_path"))
            .stdout(predicate::str::contains("heartbeat_check_interval_ms"));
    }

    #[test]
    fn test_config_show_applies_env_and_cli_overrides() {
        let dir = create_temp_project();
        pulse(&dir)
            .env("PULSE_ENABLE_FALLBACK", "false")
            .args(["--base-url", "https://reports.example.com", "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "base_url = \"https://reports.example.com\"",
            ))
            .stdout(predicate::str::contains("enable_fallback = false"));
    }

    #[test]
    fn test_invalid_env_override_fails() {
        let dir = create_temp_project();
        pulse(&dir)
            .env("PULSE_POLLING_INTERVAL_MS", "soon")
            .args(["status", "t-1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("PULSE_POLLING_INTERVAL_MS"));
    }
}

// =============================================================================
// Watch / Status Against a Local Backend
// =============================================================================

mod live_backend {
    use super::*;

    async fn run(cmd: Command) -> assert_cmd::assert::Assert {
        let mut cmd = cmd;
        tokio::task::spawn_blocking(move || cmd.assert())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_streams_to_completion() {
        let dir = create_temp_project();
        let base = serve(Backend::new(StreamMode::Complete, "processing")).await;

        let mut cmd = pulse(&dir);
        cmd.args(["--base-url", &base, "--token", TOKEN, "watch", "t-1", "--plain"]);

        run(cmd)
            .await
            .success()
            .stdout(predicate::str::contains("80% [processing] Generating report"))
            .stdout(predicate::str::contains(format!(
                "Report ready: {}/reports/t-1",
                base
            )));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_reads_token_from_env() {
        let dir = create_temp_project();
        let base = serve(Backend::new(StreamMode::Complete, "processing")).await;

        let mut cmd = pulse(&dir);
        cmd.env("PULSE_TOKEN", TOKEN)
            .env("PULSE_BASE_URL", &base)
            .args(["watch", "t-1", "--plain"]);

        run(cmd).await.success();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_backend_error_exits_non_zero() {
        let dir = create_temp_project();
        let base = serve(Backend::new(StreamMode::BackendError, "processing")).await;

        let mut cmd = pulse(&dir);
        cmd.args(["--base-url", &base, "--token", TOKEN, "watch", "t-1", "--plain"]);

        run(cmd)
            .await
            .failure()
            .stderr(predicate::str::contains("Market data provider unavailable"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_rejected_token_exits_non_zero() {
        let dir = create_temp_project();
        let backend = Backend::new(StreamMode::Complete, "processing");
        let base = serve(backend.clone()).await;

        let mut cmd = pulse(&dir);
        cmd.args(["--base-url", &base, "--token", "wrong", "watch", "t-1", "--plain"]);

        run(cmd)
            .await
            .failure()
            .stderr(predicate::str::contains("unauthorized"));
        assert_eq!(backend.stream_hits(), 1);
        assert_eq!(backend.status_hits(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watch_polling_mode_uses_status_endpoint() {
        let dir = create_temp_project();
        let backend = Backend::new(StreamMode::Unavailable, "completed");
        let base = serve(backend.clone()).await;
        write_config(&dir, "[progress]\npolling_interval_ms = 100\n");

        let mut cmd = pulse(&dir);
        cmd.args(["--base-url", &base, "--token", TOKEN, "watch", "t-1", "--polling", "--plain"]);

        run(cmd)
            .await
            .success()
            .stdout(predicate::str::contains("Report ready"));
        assert_eq!(backend.stream_hits(), 0);
        assert!(backend.status_hits() >= 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_json() {
        let dir = create_temp_project();
        let base = serve(Backend::new(StreamMode::Unavailable, "processing")).await;

        let mut cmd = pulse(&dir);
        cmd.args(["--base-url", &base, "--token", TOKEN, "status", "t-1", "--json"]);

        run(cmd)
            .await
            .success()
            .stdout(predicate::str::contains("\"status\": \"processing\""))
            .stdout(predicate::str::contains("\"percentage\": 55.0"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_status_failed_task_exits_non_zero() {
        let dir = create_temp_project();
        let base = serve(Backend::new(StreamMode::Unavailable, "failed")).await;

        let mut cmd = pulse(&dir);
        cmd.args(["--base-url", &base, "--token", TOKEN, "status", "t-1"]);

        run(cmd)
            .await
            .failure()
            .stdout(predicate::str::contains("[failed]"))
            .stderr(predicate::str::contains("Quota exceeded"));
    }
}
