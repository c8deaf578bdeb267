//! One-shot status fetch: `pulse status <task_id>`.

use anyhow::{Context, Result};

use pulse::config::PulseConfig;
use pulse::polling::{HttpStatusClient, StatusClient};
use pulse::progress::{DEFAULT_STEP_LABELS, ProgressMachine};
use pulse::stream::task_url;
use pulse::ui::summary_line;

use super::credentials;

pub async fn cmd_status(
    config: &PulseConfig,
    token: Option<String>,
    task_id: &str,
    json: bool,
) -> Result<()> {
    let server = config.server();
    let client = HttpStatusClient::new(
        &server.base_url,
        &server.status_path,
        server.request_timeout(),
        credentials(token),
    )
    .context("Failed to build HTTP client")?;

    let snapshot = client
        .fetch_status(task_id)
        .await
        .with_context(|| format!("Failed to fetch status for task {}", task_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    let mut machine = ProgressMachine::new(
        task_id,
        DEFAULT_STEP_LABELS.iter().map(|s| s.to_string()).collect(),
    );
    machine.apply(&snapshot.to_event(task_id));
    let state = machine.state();

    println!("{}", summary_line(state));
    for step in &state.steps {
        println!("  {:<12} {}", step.status.to_string(), step.label);
    }
    if snapshot.is_completed() {
        println!(
            "Report: {}",
            task_url(&server.base_url, &server.results_path, task_id)
        );
    }
    if snapshot.is_failed() {
        anyhow::bail!(
            "Task {} failed: {}",
            task_id,
            state.error_message.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}
