use console::style;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::coordinator::ProgressSnapshot;
use crate::progress::{Lifecycle, StepProgress, StepStatus, TaskProgressState};
use crate::status::{ConnectionStatus, SourceKind};
use crate::ui::icons::{CHECK, CLOCK, CROSS, LINK, POLL, PROGRESS, REPORT, RETRY, SPARKLE};

/// Terminal view of one task's progress, rendered via `indicatif` progress bars.
///
/// Three bars are stacked vertically:
/// - Progress bar: percentage with the current status message
/// - Step line: per-step markers and the active step label
/// - Connection line: source and connection status
///
/// A reconnect shows up on the connection line as a neutral notice. Only a
/// failed connection is shown as an error.
pub struct TaskProgressView {
    multi: MultiProgress,
    progress_bar: ProgressBar,
    step_bar: ProgressBar,
    connection_bar: ProgressBar,
    verbose: bool,
}

impl TaskProgressView {
    /// Create the view and add all three bars to the multiplex renderer.
    pub fn new(task_id: &str, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let progress_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let progress_bar = multi.add(ProgressBar::new(100));
        progress_bar.set_style(progress_style);
        progress_bar.set_prefix("  Task");
        progress_bar.set_message(format!("{}", style(task_id).dim()));

        let step_style = ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {msg}")
            .expect("progress bar template is a valid static string");

        let step_bar = multi.add(ProgressBar::new_spinner());
        step_bar.set_style(step_style);
        step_bar.set_prefix(" Steps");
        step_bar.enable_steady_tick(Duration::from_millis(100));

        let line_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {msg}")
            .expect("progress bar template is a valid static string");

        let connection_bar = multi.add(ProgressBar::new(0));
        connection_bar.set_style(line_style);
        connection_bar.set_prefix("  Link");

        Self {
            multi,
            progress_bar,
            step_bar,
            connection_bar,
            verbose,
        }
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    /// Render a new task state.
    pub fn render_state(&self, state: &TaskProgressState) {
        self.progress_bar.set_position(state.percentage.round() as u64);

        let mut message = state.status_message.clone();
        if let Some(eta) = state.estimated_remaining_seconds {
            message = format!("{} {}", message, style(format!("({} left)", format_eta(eta))).dim());
        }
        self.progress_bar.set_message(message);

        let label = state
            .current_step_label
            .clone()
            .unwrap_or_else(|| state.lifecycle.to_string());
        self.step_bar.set_message(format!(
            "{} {}",
            step_markers(&state.steps),
            style(label).yellow()
        ));

        if self.verbose {
            self.print_line(format!(
                "    {} {} {}",
                PROGRESS,
                style(format!("{:.0}%", state.percentage)).cyan().bold(),
                style(&state.status_message).dim()
            ));
        }
    }

    /// Render the coordinator's connection snapshot.
    pub fn render_connection(&self, snapshot: &ProgressSnapshot) {
        self.connection_bar.set_message(connection_line(snapshot));
    }

    /// Finish all bars after a successful run and print where the report lives.
    pub fn finish_completed(&self, state: &TaskProgressState, results_url: &str) {
        self.progress_bar.set_position(100);
        self.progress_bar
            .finish_with_message(format!("{} {}", CHECK, state.status_message));
        self.step_bar.finish_with_message(format!(
            "{} {}",
            step_markers(&state.steps),
            style("all steps complete").green()
        ));
        self.connection_bar.finish_and_clear();
        self.print_line(format!(
            "\n{} Report ready: {}{}\n",
            SPARKLE,
            REPORT,
            style(results_url).green().bold()
        ));
    }

    /// Finish all bars after a failure.
    pub fn finish_failed(&self, reason: &str) {
        self.progress_bar.abandon();
        self.step_bar.abandon();
        self.connection_bar.finish_and_clear();
        self.print_line(format!("\n{} {}\n", CROSS, style(reason).red().bold()));
    }

    /// Stop rendering without a verdict, e.g. on Ctrl-C.
    pub fn finish_interrupted(&self) {
        self.progress_bar.abandon();
        self.step_bar.abandon();
        self.connection_bar
            .abandon_with_message(format!("{}", style("disconnected").dim()));
    }
}

/// One marker per step: `■` completed, `▶` in progress, `□` pending.
pub fn step_markers(steps: &[StepProgress]) -> String {
    steps
        .iter()
        .map(|step| match step.status {
            StepStatus::Completed => format!("{}", style("■").green()),
            StepStatus::InProgress => format!("{}", style("▶").cyan()),
            StepStatus::Pending => format!("{}", style("□").dim()),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable connection status with its source.
pub fn connection_line(snapshot: &ProgressSnapshot) -> String {
    let source = match snapshot.source {
        SourceKind::Stream => format!("{}live stream", LINK),
        SourceKind::Polling => format!("{}polling", POLL),
        SourceKind::None => String::new(),
    };
    let status = match snapshot.status {
        ConnectionStatus::Reconnecting {
            attempt,
            max_attempts,
        } => format!(
            "{}{}",
            RETRY,
            style(format!("reconnecting (attempt {}/{})", attempt, max_attempts)).yellow()
        ),
        ConnectionStatus::Failed => format!("{}", style("connection failed").red()),
        ConnectionStatus::Connected => format!("{}", style("connected").green()),
        other => format!("{}", style(other).dim()),
    };
    if source.is_empty() {
        status
    } else {
        format!("{} {}", source, status)
    }
}

/// `42s`, `3m 05s` or `1h 02m`.
pub fn format_eta(seconds: f64) -> String {
    let secs = seconds.max(0.0).round() as u64;
    if secs >= 3600 {
        format!("{}h {:02}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}

/// One-line plain summary of a task state, for non-interactive output.
pub fn summary_line(state: &TaskProgressState) -> String {
    let marker = match state.lifecycle {
        Lifecycle::Completed => CHECK.to_string(),
        Lifecycle::Failed => CROSS.to_string(),
        _ => PROGRESS.to_string(),
    };
    let mut line = format!(
        "{}{:>3.0}% [{}] {}",
        marker, state.percentage, state.lifecycle, state.status_message
    );
    if let Some(eta) = state.estimated_remaining_seconds
        && !state.lifecycle.is_terminal()
    {
        line.push_str(&format!(" {}{}", CLOCK, format_eta(eta)));
    }
    line
}
