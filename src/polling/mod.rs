//! Polling fallback: periodic status snapshots turned into progress events.
//!
//! Used when the stream path is unavailable. Each tick fetches one
//! [`StatusSnapshot`] and synthesizes an event with the same shape the stream
//! would have delivered. Fetch failures are logged and retried on the next tick;
//! a terminal snapshot (`completed` / `failed`) stops the poller by itself.
//!
//! Ticks never overlap: the fetch is awaited inside the loop before the next
//! tick is taken, and late ticks are delayed rather than bunched up.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::credentials::CredentialStore;
use crate::errors::{ProgressError, TransportError};
use crate::status::{ConnectionStatus, SourceReport};
use crate::stream::{ProgressEvent, task_url};

/// Error code attached to events synthesized from a `failed` snapshot.
pub const TASK_FAILED_CODE: &str = "TASK_FAILED";

/// Progress portion of a status snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotProgress {
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub current_step: Option<String>,
}

/// Response of the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: String,
    #[serde(default)]
    pub progress: SnapshotProgress,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl StatusSnapshot {
    fn normalized_status(&self) -> String {
        self.status.trim().to_lowercase()
    }

    pub fn is_completed(&self) -> bool {
        matches!(self.normalized_status().as_str(), "completed" | "complete" | "succeeded")
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.normalized_status().as_str(), "failed" | "error")
    }

    pub fn is_terminal(&self) -> bool {
        self.is_completed() || self.is_failed()
    }

    /// Synthesize the event the stream would have sent for this snapshot.
    pub fn to_event(&self, task_id: &str) -> ProgressEvent {
        if self.is_completed() {
            return ProgressEvent::Completed {
                task_id: task_id.to_string(),
                message: "Report generation completed".to_string(),
            };
        }
        if self.is_failed() {
            return ProgressEvent::Error {
                task_id: task_id.to_string(),
                error_code: TASK_FAILED_CODE.to_string(),
                error_message: self
                    .error_message
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| "Report generation failed".to_string()),
                retryable: false,
            };
        }

        let step = self.progress.current_step.clone();
        ProgressEvent::Progress {
            task_id: task_id.to_string(),
            status: self.normalized_status(),
            percentage: self.progress.percentage,
            message: step.clone().unwrap_or_else(|| self.normalized_status()),
            eta_seconds: None,
            step_name: step,
        }
    }
}

/// Source of task status snapshots.
#[async_trait]
pub trait StatusClient: Send + Sync + 'static {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusSnapshot, TransportError>;
}

/// Status endpoint client over `reqwest`.
pub struct HttpStatusClient {
    client: reqwest::Client,
    base_url: String,
    status_path: String,
    credentials: Arc<dyn CredentialStore>,
}

impl HttpStatusClient {
    pub fn new(
        base_url: impl Into<String>,
        status_path: impl Into<String>,
        request_timeout: Duration,
        credentials: Arc<dyn CredentialStore>,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            status_path: status_path.into(),
            credentials,
        })
    }
}

#[async_trait]
impl StatusClient for HttpStatusClient {
    async fn fetch_status(&self, task_id: &str) -> Result<StatusSnapshot, TransportError> {
        let url = task_url(&self.base_url, &self.status_path, task_id);
        let mut request = self.client.get(&url).header(ACCEPT, "application/json");
        if let Some(token) = self.credentials.bearer_token() {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if let Some(err) = TransportError::from_status(response.status().as_u16()) {
            return Err(err);
        }
        response
            .json::<StatusSnapshot>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Periodic status poller reporting into the coordinator's channel.
pub struct PollingFallback {
    client: Arc<dyn StatusClient>,
    reports: mpsc::UnboundedSender<SourceReport>,
    running: Option<(CancellationToken, JoinHandle<()>)>,
}

impl PollingFallback {
    pub fn new(client: Arc<dyn StatusClient>, reports: mpsc::UnboundedSender<SourceReport>) -> Self {
        Self {
            client,
            reports,
            running: None,
        }
    }

    /// Start polling `task_id` every `interval`. The first fetch is immediate.
    /// A second `start` while running is ignored.
    pub fn start(&mut self, task_id: &str, interval: Duration) {
        if self.is_running() {
            warn!(task_id, "polling already running; ignoring start");
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_loop(
            Arc::clone(&self.client),
            task_id.to_string(),
            interval.max(Duration::from_millis(1)),
            self.reports.clone(),
            cancel.clone(),
        ));
        info!(task_id, interval_ms = interval.as_millis() as u64, "status polling started");
        self.running = Some((cancel, handle));
    }

    /// Stop polling. Safe to call repeatedly.
    pub fn stop(&mut self) {
        if let Some((cancel, handle)) = self.running.take() {
            cancel.cancel();
            handle.abort();
            debug!("status polling stopped");
        }
    }

    /// True while the poll loop is alive (it exits by itself on a terminal snapshot).
    pub fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }
}

impl Drop for PollingFallback {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    client: Arc<dyn StatusClient>,
    task_id: String,
    interval: Duration,
    reports: mpsc::UnboundedSender<SourceReport>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last: Option<StatusSnapshot> = None;
    let _ = reports.send(SourceReport::Status(ConnectionStatus::Connecting));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = client.fetch_status(&task_id) => result,
        };

        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let err = ProgressError::PollingTransient(e.to_string());
                warn!(task_id = %task_id, error = %err, "status poll failed; retrying next tick");
                continue;
            }
        };

        if last.is_none() {
            let _ = reports.send(SourceReport::Status(ConnectionStatus::Connected));
        }
        if last.as_ref() == Some(&snapshot) {
            continue;
        }

        let terminal = snapshot.is_terminal();
        if reports
            .send(SourceReport::Event(snapshot.to_event(&task_id)))
            .is_err()
        {
            return;
        }
        if terminal {
            info!(task_id = %task_id, status = %snapshot.status, "task reached terminal status; polling stopped");
            return;
        }
        last = Some(snapshot);
    }
}
