//! Live task follow: `pulse watch <task_id>`.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use pulse::config::PulseConfig;
use pulse::coordinator::{CoordinatorOptions, ProgressCoordinator, ProgressSnapshot};
use pulse::errors::ProgressError;
use pulse::polling::HttpStatusClient;
use pulse::progress::{
    DEFAULT_STEP_LABELS, Lifecycle, ProgressMachine, TaskProgressState, run_progress_machine,
};
use pulse::status::ConnectionStatus;
use pulse::stream::{HttpStreamTransport, task_url};
use pulse::ui::{TaskProgressView, connection_line, summary_line};

use super::credentials;

pub struct WatchArgs {
    pub task_id: String,
    pub no_fallback: bool,
    pub polling: bool,
    pub open: bool,
    pub plain: bool,
    pub verbose: bool,
}

enum Outcome {
    Completed(TaskProgressState),
    Failed(String),
    Interrupted,
}

/// Progress bars on a terminal, one line per update otherwise.
enum Renderer {
    Bars(TaskProgressView),
    Plain,
}

impl Renderer {
    fn state(&self, state: &TaskProgressState) {
        match self {
            Renderer::Bars(view) => view.render_state(state),
            Renderer::Plain => println!("{}", console::strip_ansi_codes(&summary_line(state))),
        }
    }

    fn connection(&self, snapshot: &ProgressSnapshot) {
        match self {
            Renderer::Bars(view) => view.render_connection(snapshot),
            Renderer::Plain => eprintln!(
                "[{}] {}",
                snapshot.source,
                console::strip_ansi_codes(&connection_line(snapshot))
            ),
        }
    }

    fn completed(&self, state: &TaskProgressState, results_url: &str) {
        match self {
            Renderer::Bars(view) => view.finish_completed(state, results_url),
            Renderer::Plain => println!("Report ready: {}", results_url),
        }
    }

    fn failed(&self, reason: &str) {
        match self {
            Renderer::Bars(view) => view.finish_failed(reason),
            Renderer::Plain => eprintln!("Task failed: {}", reason),
        }
    }

    fn interrupted(&self) {
        match self {
            Renderer::Bars(view) => view.finish_interrupted(),
            Renderer::Plain => eprintln!("Disconnected."),
        }
    }
}

/// A connection failure that ends the watch. Backend task failures are
/// reported through the task state instead.
fn connection_failure(snapshot: &ProgressSnapshot) -> Option<String> {
    if snapshot.status != ConnectionStatus::Failed {
        return None;
    }
    match &snapshot.last_error {
        Some(ProgressError::BackendTaskFailure { .. }) => None,
        Some(err) => Some(err.to_string()),
        None => Some("connection failed".to_string()),
    }
}

pub async fn cmd_watch(config: &PulseConfig, token: Option<String>, args: WatchArgs) -> Result<()> {
    let server = config.server();
    let credentials = credentials(token);
    let status_client = HttpStatusClient::new(
        &server.base_url,
        &server.status_path,
        server.request_timeout(),
        Arc::clone(&credentials),
    )
    .context("Failed to build HTTP client")?;
    let transport = HttpStreamTransport::new().context("Failed to build HTTP client")?;

    let mut options = CoordinatorOptions::from_config(&args.task_id, config);
    if args.polling {
        options = options.with_auto_connect(false);
    }
    if args.no_fallback {
        options = options.with_fallback(false);
    }
    let auto_connect = options.auto_connect;

    let (coordinator, events) = ProgressCoordinator::new(
        options,
        Arc::new(transport),
        credentials,
        Arc::new(status_client),
    );
    if args.polling {
        coordinator.switch_to_polling();
    } else if !auto_connect {
        coordinator.connect();
    }
    info!(task_id = %args.task_id, source = %coordinator.source(), "watching task");

    let machine = ProgressMachine::new(
        &args.task_id,
        DEFAULT_STEP_LABELS.iter().map(|s| s.to_string()).collect(),
    );
    let (state_tx, mut state_rx) = watch::channel(machine.state().clone());
    let (nav_tx, mut nav_rx) = mpsc::unbounded_channel();
    let driver = tokio::spawn(run_progress_machine(machine, events, state_tx, nav_tx));

    let renderer = if args.plain || !console::Term::stdout().is_term() {
        Renderer::Plain
    } else {
        Renderer::Bars(TaskProgressView::new(&args.task_id, args.verbose))
    };
    let mut snapshots = coordinator.subscribe();
    renderer.connection(&snapshots.borrow_and_update());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => break Outcome::Interrupted,

            Ok(()) = state_rx.changed() => {
                let state = state_rx.borrow_and_update().clone();
                renderer.state(&state);
                if state.lifecycle == Lifecycle::Failed {
                    let reason = state
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "task failed".to_string());
                    break Outcome::Failed(reason);
                }
            }

            Ok(()) = snapshots.changed() => {
                let snapshot = snapshots.borrow_and_update().clone();
                renderer.connection(&snapshot);
                if let Some(reason) = connection_failure(&snapshot) {
                    break Outcome::Failed(reason);
                }
            }

            Some(_) = nav_rx.recv() => {
                break Outcome::Completed(state_rx.borrow().clone());
            }
        }
    };

    coordinator.disconnect();
    driver.abort();

    match outcome {
        Outcome::Completed(state) => {
            let results_url = task_url(&server.base_url, &server.results_path, &args.task_id);
            renderer.completed(&state, &results_url);
            if args.open
                && let Err(e) = open::that(&results_url)
            {
                warn!(url = %results_url, error = %e, "could not open browser");
            }
            Ok(())
        }
        Outcome::Failed(reason) => {
            renderer.failed(&reason);
            anyhow::bail!("Task {} failed: {}", args.task_id, reason)
        }
        Outcome::Interrupted => {
            renderer.interrupted();
            Ok(())
        }
    }
}
