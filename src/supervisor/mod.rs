//! Reconnection and heartbeat supervision for the task event stream.
//!
//! The supervisor owns the transport for one stream path:
//!
//! ```text
//! idle ──run()──▶ connecting ──open──▶ live ──heartbeat──▶ live
//!                    ▲    │              │
//!                    │    │ retryable    │ retryable failure /
//!                    │    ▼ failure      ▼ heartbeat deadline
//!                    └── retrying ◀──────┘
//!                         │ budget spent
//!                         ▼
//!                       failed ◀── non-retryable failure (401)
//! ```
//!
//! An attempt that has not opened within the heartbeat timeout counts as a
//! retryable network failure. A backend `completed` or `error` event ends
//! supervision without a reconnect. Everything observable leaves through [`SourceReport`]s; the
//! supervisor never reads coordinator state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::credentials::CredentialStore;
use crate::errors::ProgressError;
use crate::status::{ConnectionStatus, SourceReport};
use crate::stream::{StreamConnector, TransportSignal};

/// Immutable reconnection settings, built once per coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    interval: Duration,
    max_attempts: u32,
    heartbeat_timeout: Duration,
    heartbeat_check_interval: Duration,
}

impl ReconnectPolicy {
    /// The heartbeat check interval defaults to half the timeout, bounding
    /// detection latency to 1.5× the timeout.
    pub fn new(interval: Duration, max_attempts: u32, heartbeat_timeout: Duration) -> Self {
        Self {
            interval,
            max_attempts,
            heartbeat_timeout,
            heartbeat_check_interval: heartbeat_timeout / 2,
        }
    }

    pub fn with_heartbeat_check_interval(mut self, check_interval: Duration) -> Self {
        self.heartbeat_check_interval = check_interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    pub fn heartbeat_check_interval(&self) -> Duration {
        // `tokio::time::interval` panics on a zero period.
        self.heartbeat_check_interval.max(Duration::from_millis(1))
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), 5, Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Connecting,
    Live,
    Retrying,
    Failed,
}

/// Pause before asking a busy transport again. Not counted as a retry.
const BUSY_TRANSPORT_DELAY: Duration = Duration::from_millis(25);

/// How one connection attempt ended.
enum AttemptOutcome {
    Cancelled,
    /// The transport was still releasing an earlier connection
    Busy,
    /// Backend sent `completed` or `error`
    Finished,
    Failed(ProgressError),
}

/// Aborts the connection task when the attempt ends, on every exit path.
struct ConnectionTask(JoinHandle<()>);

impl Drop for ConnectionTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Drives a [`StreamConnector`] through connect / heartbeat / retry.
pub struct StreamSupervisor {
    url: String,
    connector: Arc<dyn StreamConnector>,
    credentials: Arc<dyn CredentialStore>,
    policy: ReconnectPolicy,
    state: SupervisorState,
    retry_count: u32,
}

impl StreamSupervisor {
    pub fn new(
        url: impl Into<String>,
        connector: Arc<dyn StreamConnector>,
        credentials: Arc<dyn CredentialStore>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            url: url.into(),
            connector,
            credentials,
            policy,
            state: SupervisorState::Idle,
            retry_count: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Supervise the stream until the task finishes, the budget runs out, a
    /// non-retryable failure occurs, or `cancel` fires. Returns the final state.
    pub async fn run(
        mut self,
        reports: mpsc::UnboundedSender<SourceReport>,
        cancel: CancellationToken,
    ) -> SupervisorState {
        loop {
            if self.state != SupervisorState::Connecting {
                self.state = SupervisorState::Connecting;
                let _ = reports.send(SourceReport::Status(ConnectionStatus::Connecting));
            }

            match self.attempt(&reports, &cancel).await {
                AttemptOutcome::Cancelled => {
                    debug!(url = %self.url, "stream supervision cancelled");
                    return self.state;
                }
                AttemptOutcome::Busy => {
                    debug!(url = %self.url, "transport busy; retrying connect");
                    tokio::select! {
                        _ = cancel.cancelled() => return self.state,
                        _ = tokio::time::sleep(BUSY_TRANSPORT_DELAY) => {}
                    }
                }
                AttemptOutcome::Finished => {
                    info!(url = %self.url, "task stream finished");
                    self.state = SupervisorState::Idle;
                    return self.state;
                }
                AttemptOutcome::Failed(err) if !err.is_retryable() => {
                    error!(url = %self.url, error = %err, "stream failed without retry");
                    self.state = SupervisorState::Failed;
                    let _ = reports.send(SourceReport::Failed(err));
                    return self.state;
                }
                AttemptOutcome::Failed(err) => {
                    if self.retry_count >= self.policy.max_attempts {
                        error!(
                            url = %self.url,
                            attempts = self.retry_count,
                            error = %err,
                            "reconnect budget exhausted"
                        );
                        self.state = SupervisorState::Failed;
                        let _ = reports.send(SourceReport::Failed(
                            ProgressError::RetryBudgetExhausted {
                                attempts: self.retry_count,
                                last: err.to_string(),
                            },
                        ));
                        return self.state;
                    }

                    self.retry_count += 1;
                    self.state = SupervisorState::Retrying;
                    warn!(
                        url = %self.url,
                        attempt = self.retry_count,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "stream dropped; reconnecting"
                    );
                    let _ = reports.send(SourceReport::Status(ConnectionStatus::Reconnecting {
                        attempt: self.retry_count,
                        max_attempts: self.policy.max_attempts,
                    }));

                    tokio::select! {
                        _ = cancel.cancelled() => return self.state,
                        _ = tokio::time::sleep(self.policy.interval) => {}
                    }
                }
            }
        }
    }

    async fn attempt(
        &mut self,
        reports: &mpsc::UnboundedSender<SourceReport>,
        cancel: &CancellationToken,
    ) -> AttemptOutcome {
        let token = self.credentials.bearer_token();
        let (signal_tx, mut signals) = mpsc::unbounded_channel();
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        let _connection = ConnectionTask(tokio::spawn(async move {
            connector.connect(&url, token.as_deref(), signal_tx).await;
        }));

        let mut heartbeat = tokio::time::interval(self.policy.heartbeat_check_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_heartbeat = Instant::now();
        let open_deadline = tokio::time::sleep(self.policy.heartbeat_timeout);
        tokio::pin!(open_deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return AttemptOutcome::Cancelled,

                signal = signals.recv() => {
                    let Some(signal) = signal else {
                        return AttemptOutcome::Failed(ProgressError::Network(
                            "connection ended without a close signal".to_string(),
                        ));
                    };

                    match signal {
                        TransportSignal::Open => {
                            debug!(url = %self.url, "stream open");
                            self.state = SupervisorState::Live;
                            self.retry_count = 0;
                            last_heartbeat = Instant::now();
                            heartbeat.reset();
                            let _ = reports.send(SourceReport::Status(ConnectionStatus::Connected));
                        }
                        TransportSignal::AlreadyOpen => return AttemptOutcome::Busy,
                        TransportSignal::Event(event) if event.is_heartbeat() => {
                            last_heartbeat = Instant::now();
                        }
                        TransportSignal::Event(event) => {
                            let terminal = event.is_terminal();
                            let _ = reports.send(SourceReport::Event(event));
                            if terminal {
                                return AttemptOutcome::Finished;
                            }
                        }
                        other => {
                            let err = other.failure().unwrap_or_else(|| {
                                ProgressError::Network("unexpected transport signal".to_string())
                            });
                            return AttemptOutcome::Failed(err);
                        }
                    }
                }

                _ = &mut open_deadline, if self.state == SupervisorState::Connecting => {
                    return AttemptOutcome::Failed(ProgressError::Network(format!(
                        "stream did not open within {} ms",
                        self.policy.heartbeat_timeout.as_millis()
                    )));
                }

                _ = heartbeat.tick(), if self.state == SupervisorState::Live => {
                    if last_heartbeat.elapsed() >= self.policy.heartbeat_timeout {
                        return AttemptOutcome::Failed(ProgressError::HeartbeatTimeout {
                            timeout_ms: self.policy.heartbeat_timeout.as_millis() as u64,
                        });
                    }
                }
            }
        }
    }
}
