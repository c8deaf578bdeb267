use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::state::{Lifecycle, StepStatus, TaskProgressState};
use crate::stream::ProgressEvent;

/// Delay between a `completed` transition and the navigation signal.
pub const NAVIGATION_DELAY: Duration = Duration::from_secs(2);

/// Side effect requested by a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Move the user to the results view after `after`.
    Navigate { task_id: String, after: Duration },
}

/// Sent once per completed task, after [`NAVIGATION_DELAY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationSignal {
    pub task_id: String,
}

/// Pure transition function over [`TaskProgressState`].
#[derive(Debug, Clone)]
pub struct ProgressMachine {
    labels: Vec<String>,
    state: TaskProgressState,
}

impl ProgressMachine {
    pub fn new(task_id: impl Into<String>, step_labels: Vec<String>) -> Self {
        let state = TaskProgressState::new(task_id, &step_labels);
        Self {
            labels: step_labels,
            state,
        }
    }

    pub fn state(&self) -> &TaskProgressState {
        &self.state
    }

    /// Start over for another task with the same step labels.
    pub fn reset(&mut self, task_id: impl Into<String>) {
        self.state = TaskProgressState::new(task_id, &self.labels);
    }

    /// Apply one event. Returns the effect the transition requests, if any.
    pub fn apply(&mut self, event: &ProgressEvent) -> Option<Effect> {
        if self.state.lifecycle.is_terminal() {
            debug!(task_id = %self.state.task_id, kind = %event.kind(), "task already finished; event ignored");
            return None;
        }
        let event_task = event.task_id();
        if !event_task.is_empty() && event_task != self.state.task_id {
            debug!(
                task_id = %self.state.task_id,
                event_task_id = %event_task,
                "event for another task ignored"
            );
            return None;
        }

        match event {
            ProgressEvent::Connected { .. } => {
                self.state.lifecycle = Lifecycle::Processing;
                self.state.status_message = "Connected, waiting for progress".to_string();
                None
            }
            ProgressEvent::Progress {
                status,
                percentage,
                message,
                eta_seconds,
                step_name,
                ..
            } => {
                if percentage.is_nan() {
                    debug!(task_id = %self.state.task_id, "progress without a percentage ignored");
                    return None;
                }
                let percentage = percentage.clamp(0.0, 100.0);
                if percentage < self.state.percentage {
                    debug!(
                        task_id = %self.state.task_id,
                        current = self.state.percentage,
                        received = percentage,
                        "regressing progress dropped"
                    );
                    return None;
                }

                self.state.lifecycle = Lifecycle::Processing;
                self.state.percentage = percentage;
                self.state.status_message = if message.trim().is_empty() {
                    status.clone()
                } else {
                    message.clone()
                };
                self.state.estimated_remaining_seconds = eta_seconds.filter(|eta| *eta >= 0.0);
                self.state.derive_steps();
                self.state.current_step_label = step_name
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .or_else(|| self.state.active_step().map(str::to_string));
                None
            }
            ProgressEvent::Completed { message, .. } => {
                self.state.lifecycle = Lifecycle::Completed;
                self.state.percentage = 100.0;
                self.state.status_message = if message.trim().is_empty() {
                    "Report ready".to_string()
                } else {
                    message.clone()
                };
                self.state.estimated_remaining_seconds = None;
                self.state.current_step_label = None;
                for step in &mut self.state.steps {
                    step.status = StepStatus::Completed;
                }
                info!(task_id = %self.state.task_id, "task completed");
                Some(Effect::Navigate {
                    task_id: self.state.task_id.clone(),
                    after: NAVIGATION_DELAY,
                })
            }
            ProgressEvent::Error {
                error_code,
                error_message,
                ..
            } => {
                self.state.lifecycle = Lifecycle::Failed;
                self.state.error_message = Some(error_message.clone());
                self.state.status_message = error_message.clone();
                self.state.estimated_remaining_seconds = None;
                info!(task_id = %self.state.task_id, code = %error_code, "task failed");
                None
            }
            ProgressEvent::Heartbeat { .. } => None,
        }
    }
}

/// Drive `machine` from the coordinator's event receiver.
///
/// Every state change is published on `state_tx`. After a `completed`
/// transition the driver waits out the navigation delay, sends one
/// [`NavigationSignal`] and returns. It also returns when the event channel
/// closes. The final state is returned either way.
pub async fn run_progress_machine(
    mut machine: ProgressMachine,
    mut events: mpsc::UnboundedReceiver<ProgressEvent>,
    state_tx: watch::Sender<TaskProgressState>,
    navigation: mpsc::UnboundedSender<NavigationSignal>,
) -> TaskProgressState {
    while let Some(event) = events.recv().await {
        let effect = machine.apply(&event);
        state_tx.send_if_modified(|published| {
            if *published != *machine.state() {
                *published = machine.state().clone();
                true
            } else {
                false
            }
        });

        if let Some(Effect::Navigate { task_id, after }) = effect {
            tokio::time::sleep(after).await;
            debug!(task_id = %task_id, "navigating to results");
            let _ = navigation.send(NavigationSignal { task_id });
            break;
        }
    }
    machine.state().clone()
}
