use serde::Serialize;

/// Step labels shown for a market-research report when none are configured.
pub const DEFAULT_STEP_LABELS: &[&str] = &[
    "Gathering market data",
    "Analyzing competitors",
    "Identifying trends",
    "Generating report",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl Lifecycle {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Completed | Lifecycle::Failed)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Pending => write!(f, "pending"),
            Lifecycle::Processing => write!(f, "processing"),
            Lifecycle::Completed => write!(f, "completed"),
            Lifecycle::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::InProgress => write!(f, "in progress"),
            StepStatus::Completed => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepProgress {
    pub label: String,
    pub status: StepStatus,
}

/// Status of step `index` out of `count` equal bands at `percentage`.
///
/// Band `i` covers `(i/N*100, (i+1)/N*100]`: the step is completed once the
/// upper edge is reached and in progress anywhere strictly above the lower edge.
pub fn step_status(index: usize, count: usize, percentage: f64) -> StepStatus {
    if count == 0 {
        return StepStatus::Pending;
    }
    let lower = index as f64 / count as f64 * 100.0;
    let upper = (index + 1) as f64 / count as f64 * 100.0;
    if percentage >= upper {
        StepStatus::Completed
    } else if percentage > lower {
        StepStatus::InProgress
    } else {
        StepStatus::Pending
    }
}

/// Client-visible progress of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskProgressState {
    pub task_id: String,
    pub lifecycle: Lifecycle,
    pub percentage: f64,
    pub status_message: String,
    pub current_step_label: Option<String>,
    pub estimated_remaining_seconds: Option<f64>,
    pub error_message: Option<String>,
    pub steps: Vec<StepProgress>,
}

impl TaskProgressState {
    pub fn new<S: AsRef<str>>(task_id: impl Into<String>, step_labels: &[S]) -> Self {
        Self {
            task_id: task_id.into(),
            lifecycle: Lifecycle::Pending,
            percentage: 0.0,
            status_message: "Waiting for task to start".to_string(),
            current_step_label: None,
            estimated_remaining_seconds: None,
            error_message: None,
            steps: step_labels
                .iter()
                .map(|label| StepProgress {
                    label: label.as_ref().to_string(),
                    status: StepStatus::Pending,
                })
                .collect(),
        }
    }

    /// Recompute every step's status from the current percentage.
    pub(crate) fn derive_steps(&mut self) {
        let count = self.steps.len();
        for (index, step) in self.steps.iter_mut().enumerate() {
            step.status = step_status(index, count, self.percentage);
        }
    }

    /// Label of the first step still in progress, if any.
    pub fn active_step(&self) -> Option<&str> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
            .map(|s| s.label.as_str())
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}
