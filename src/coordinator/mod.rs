//! Progress coordinator: owns exactly one progress source at a time.
//!
//! ```text
//!            connect()                  budget exhausted (fallback on)
//!   None ─────────────▶ Stream ───────────────────────────────▶ Polling
//!    ▲                    │        switch_to_polling()             │
//!    │                    └───────────────────────────────────────▶│
//!    └──────────── disconnect() / terminal event / failure ◀───────┘
//! ```
//!
//! Each source reports through its own channel, drained by a forwarding task.
//! Every `connect`, `switch_to_polling` and `disconnect` bumps an epoch under
//! the coordinator lock, and a forwarder applies a report only while its epoch
//! is current. Once one of those calls returns, nothing from the previous
//! source reaches the event receiver, whatever its network calls do later.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ProgressSection, PulseConfig};
use crate::credentials::CredentialStore;
use crate::errors::ProgressError;
use crate::polling::{PollingFallback, StatusClient};
use crate::status::{ConnectionStatus, SourceKind, SourceReport};
use crate::stream::{ProgressEvent, StreamConnector, task_url};
use crate::supervisor::{ReconnectPolicy, StreamSupervisor};

/// Per-task coordinator settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorOptions {
    pub task_id: String,
    pub stream_url: String,
    pub policy: ReconnectPolicy,
    pub polling_interval: Duration,
    pub auto_connect: bool,
    pub enable_fallback: bool,
}

impl CoordinatorOptions {
    /// Defaults from an empty `[progress]` section.
    pub fn new(task_id: impl Into<String>, stream_url: impl Into<String>) -> Self {
        Self::from_section(task_id, stream_url, &ProgressSection::default())
    }

    pub fn from_section(
        task_id: impl Into<String>,
        stream_url: impl Into<String>,
        section: &ProgressSection,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            stream_url: stream_url.into(),
            policy: section.reconnect_policy(),
            polling_interval: section.polling_interval(),
            auto_connect: section.auto_connect,
            enable_fallback: section.enable_fallback,
        }
    }

    pub fn from_config(task_id: &str, config: &PulseConfig) -> Self {
        let server = config.server();
        Self::from_section(
            task_id,
            task_url(&server.base_url, &server.stream_path, task_id),
            config.progress(),
        )
    }

    pub fn with_auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = auto_connect;
        self
    }

    pub fn with_fallback(mut self, enable_fallback: bool) -> Self {
        self.enable_fallback = enable_fallback;
        self
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }
}

/// What the UI sees of the coordinator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
    pub status: ConnectionStatus,
    pub source: SourceKind,
    pub latest_event: Option<ProgressEvent>,
    pub last_error: Option<ProgressError>,
}

enum ActiveSource {
    None,
    Stream { cancel: CancellationToken },
    Polling { poller: PollingFallback },
}

impl ActiveSource {
    fn kind(&self) -> SourceKind {
        match self {
            ActiveSource::None => SourceKind::None,
            ActiveSource::Stream { .. } => SourceKind::Stream,
            ActiveSource::Polling { .. } => SourceKind::Polling,
        }
    }

    /// Stop whatever is running and leave `None` behind.
    fn teardown(&mut self) {
        match std::mem::replace(self, ActiveSource::None) {
            ActiveSource::None => {}
            ActiveSource::Stream { cancel } => cancel.cancel(),
            ActiveSource::Polling { mut poller } => poller.stop(),
        }
    }
}

struct Inner {
    epoch: u64,
    source: ActiveSource,
    fallback_engaged: bool,
    snapshot: ProgressSnapshot,
}

struct Shared {
    options: CoordinatorOptions,
    connector: Arc<dyn StreamConnector>,
    credentials: Arc<dyn CredentialStore>,
    status_client: Arc<dyn StatusClient>,
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<ProgressSnapshot>,
    events_tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &mut Inner) {
        inner.snapshot.source = inner.source.kind();
        self.snapshot_tx.send_replace(inner.snapshot.clone());
    }

    fn start_stream(self: &Arc<Self>, inner: &mut Inner) {
        inner.source.teardown();
        inner.epoch += 1;
        let epoch = inner.epoch;

        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let supervisor = StreamSupervisor::new(
            self.options.stream_url.clone(),
            Arc::clone(&self.connector),
            Arc::clone(&self.credentials),
            self.options.policy,
        );
        tokio::spawn(supervisor.run(tx, cancel.clone()));
        tokio::spawn(forward(Arc::downgrade(self), epoch, rx));

        info!(task_id = %self.options.task_id, epoch, url = %self.options.stream_url, "stream source started");
        inner.source = ActiveSource::Stream { cancel };
        inner.snapshot.status = ConnectionStatus::Connecting;
        inner.snapshot.last_error = None;
        self.publish(inner);
    }

    fn start_polling(self: &Arc<Self>, inner: &mut Inner) {
        inner.source.teardown();
        inner.epoch += 1;
        let epoch = inner.epoch;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut poller = PollingFallback::new(Arc::clone(&self.status_client), tx);
        poller.start(&self.options.task_id, self.options.polling_interval);
        tokio::spawn(forward(Arc::downgrade(self), epoch, rx));

        info!(task_id = %self.options.task_id, epoch, "polling source started");
        inner.source = ActiveSource::Polling { poller };
        inner.snapshot.status = ConnectionStatus::Connecting;
        self.publish(inner);
    }

    /// Apply one report from the source started at `epoch`. Returns false
    /// once that source is no longer current.
    fn apply(self: &Arc<Self>, epoch: u64, report: SourceReport) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            debug!(
                task_id = %self.options.task_id,
                epoch,
                current_epoch = inner.epoch,
                "stale report dropped"
            );
            return false;
        }

        match report {
            SourceReport::Status(status) => {
                inner.snapshot.status = status;
            }
            SourceReport::Event(event) => {
                inner.snapshot.latest_event = Some(event.clone());
                match &event {
                    ProgressEvent::Completed { .. } => {
                        info!(task_id = %self.options.task_id, "task completed; closing source");
                        inner.snapshot.status = ConnectionStatus::Closed;
                        inner.source.teardown();
                        inner.epoch += 1;
                    }
                    ProgressEvent::Error {
                        error_code,
                        error_message,
                        ..
                    } => {
                        error!(task_id = %self.options.task_id, code = %error_code, "backend reported task failure");
                        inner.snapshot.status = ConnectionStatus::Failed;
                        inner.snapshot.last_error = Some(ProgressError::BackendTaskFailure {
                            code: error_code.clone(),
                            message: error_message.clone(),
                        });
                        inner.source.teardown();
                        inner.epoch += 1;
                    }
                    _ => {}
                }
                // Sent under the lock so a newer source can never overtake it.
                let _ = self.events_tx.send(event);
            }
            SourceReport::Failed(err) => {
                if err.permits_fallback() && inner.fallback_engaged {
                    debug!(task_id = %self.options.task_id, error = %err, "failure after fallback ignored");
                    return true;
                }
                if err.permits_fallback()
                    && self.options.enable_fallback
                    && matches!(inner.source, ActiveSource::Stream { .. })
                {
                    warn!(task_id = %self.options.task_id, error = %err, "stream unavailable; falling back to polling");
                    inner.fallback_engaged = true;
                    self.start_polling(&mut inner);
                    return true;
                }

                error!(task_id = %self.options.task_id, error = %err, "progress source failed");
                inner.snapshot.status = ConnectionStatus::Failed;
                inner.snapshot.last_error = Some(err);
                inner.source.teardown();
                inner.epoch += 1;
            }
        }

        self.publish(&mut inner);
        true
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        inner.source.teardown();
    }
}

async fn forward(
    shared: Weak<Shared>,
    epoch: u64,
    mut reports: mpsc::UnboundedReceiver<SourceReport>,
) {
    while let Some(report) = reports.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.apply(epoch, report) {
            return;
        }
    }
}

/// Owns the progress source for one task and exposes its state.
///
/// Cheap to clone; all clones share the same source.
#[derive(Clone)]
pub struct ProgressCoordinator {
    shared: Arc<Shared>,
}

impl ProgressCoordinator {
    /// Build a coordinator and the ordered event receiver it feeds.
    ///
    /// With `auto_connect` the stream is started right away, so this must be
    /// called inside a Tokio runtime.
    pub fn new(
        options: CoordinatorOptions,
        connector: Arc<dyn StreamConnector>,
        credentials: Arc<dyn CredentialStore>,
        status_client: Arc<dyn StatusClient>,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, _) = watch::channel(ProgressSnapshot::default());
        let auto_connect = options.auto_connect;

        let coordinator = Self {
            shared: Arc::new(Shared {
                options,
                connector,
                credentials,
                status_client,
                inner: Mutex::new(Inner {
                    epoch: 0,
                    source: ActiveSource::None,
                    fallback_engaged: false,
                    snapshot: ProgressSnapshot::default(),
                }),
                snapshot_tx,
                events_tx,
            }),
        };
        if auto_connect {
            coordinator.connect();
        }
        (coordinator, events_rx)
    }

    pub fn task_id(&self) -> &str {
        &self.shared.options.task_id
    }

    /// Start the supervised stream. Ignored while any source is active.
    pub fn connect(&self) {
        let mut inner = self.shared.lock();
        if !matches!(inner.source, ActiveSource::None) {
            warn!(task_id = %self.shared.options.task_id, source = %inner.source.kind(), "already connected; ignoring connect");
            return;
        }
        inner.fallback_engaged = false;
        self.shared.start_stream(&mut inner);
    }

    /// Tear down the stream path and poll instead. Ignored while already polling.
    pub fn switch_to_polling(&self) {
        let mut inner = self.shared.lock();
        if matches!(inner.source, ActiveSource::Polling { .. }) {
            debug!(task_id = %self.shared.options.task_id, "already polling");
            return;
        }
        self.shared.start_polling(&mut inner);
    }

    /// Tear down whichever source is active. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut inner = self.shared.lock();
        inner.epoch += 1;
        if matches!(inner.source, ActiveSource::None) {
            return;
        }
        info!(task_id = %self.shared.options.task_id, source = %inner.source.kind(), "disconnecting");
        inner.source.teardown();
        inner.snapshot.status = ConnectionStatus::Disconnected;
        self.shared.publish(&mut inner);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.lock().snapshot.status
    }

    pub fn latest_event(&self) -> Option<ProgressEvent> {
        self.shared.lock().snapshot.latest_event.clone()
    }

    pub fn source(&self) -> SourceKind {
        self.shared.lock().source.kind()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.shared.lock().snapshot.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    #[cfg(test)]
    fn epoch(&self) -> u64 {
        self.shared.lock().epoch
    }
}
