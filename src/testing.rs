//! Scripted stand-ins for the network seams, shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::errors::TransportError;
use crate::polling::{SnapshotProgress, StatusClient, StatusSnapshot};
use crate::stream::{ProgressEvent, StreamConnector, TransportSignal};

/// What one `connect` call does.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    signals: Vec<TransportSignal>,
    hold_open: bool,
}

impl Script {
    /// Send `signals`, then end the connection.
    pub(crate) fn new(signals: Vec<TransportSignal>) -> Self {
        Self {
            signals,
            hold_open: false,
        }
    }

    /// Send `signals`, then keep the connection open until aborted.
    pub(crate) fn held_open(signals: Vec<TransportSignal>) -> Self {
        Self {
            signals,
            hold_open: true,
        }
    }
}

/// A [`StreamConnector`] that plays back scripts, one per call.
///
/// Once the queue is empty, further calls hang without sending anything.
pub(crate) struct ScriptedConnector {
    scripts: Mutex<VecDeque<Script>>,
    repeat: Option<Script>,
    calls: AtomicUsize,
    tokens: Mutex<Vec<Option<String>>>,
    latest: Mutex<Option<mpsc::UnboundedSender<TransportSignal>>>,
}

impl ScriptedConnector {
    pub(crate) fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            repeat: None,
            calls: AtomicUsize::new(0),
            tokens: Mutex::new(Vec::new()),
            latest: Mutex::new(None),
        }
    }

    /// Every call plays the same script.
    pub(crate) fn repeating(script: Script) -> Self {
        Self {
            repeat: Some(script),
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }

    /// Push a signal through the most recent held-open connection, even one
    /// the consumer has already moved past. False if nobody is listening.
    pub(crate) fn send_to_latest(&self, signal: TransportSignal) -> bool {
        match self.latest.lock().unwrap().as_ref() {
            Some(sender) => sender.send(signal).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl StreamConnector for ScriptedConnector {
    async fn connect(
        &self,
        _url: &str,
        auth_token: Option<&str>,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens
            .lock()
            .unwrap()
            .push(auth_token.map(str::to_string));

        let next = self.scripts.lock().unwrap().pop_front();
        let Some(script) = next.or_else(|| self.repeat.clone()) else {
            std::future::pending::<()>().await;
            return;
        };

        if script.hold_open {
            *self.latest.lock().unwrap() = Some(signals.clone());
        }
        for signal in script.signals {
            if signals.send(signal).is_err() {
                return;
            }
        }
        if script.hold_open {
            std::future::pending::<()>().await;
        }
    }
}

/// A [`StatusClient`] that answers from a queue, repeating the last answer
/// once the queue runs dry.
pub(crate) struct ScriptedStatusClient {
    responses: Mutex<VecDeque<Result<StatusSnapshot, TransportError>>>,
    last: Mutex<Option<Result<StatusSnapshot, TransportError>>>,
    latency: Duration,
    calls: Mutex<Vec<Instant>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedStatusClient {
    pub(crate) fn new(responses: Vec<Result<StatusSnapshot, TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn repeating(response: Result<StatusSnapshot, TransportError>) -> Self {
        Self::new(vec![response])
    }

    pub(crate) fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Call start times in milliseconds since `origin`.
    pub(crate) fn call_times(&self, origin: Instant) -> Vec<u64> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|at| at.duration_since(origin).as_millis() as u64)
            .collect()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusClient for ScriptedStatusClient {
    async fn fetch_status(&self, _task_id: &str) -> Result<StatusSnapshot, TransportError> {
        self.calls.lock().unwrap().push(Instant::now());
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let next = self.responses.lock().unwrap().pop_front();
        let response = match next {
            Some(response) => {
                *self.last.lock().unwrap() = Some(response.clone());
                response
            }
            None => self
                .last
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Err(TransportError::Network("no scripted response".into()))),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

pub(crate) fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

pub(crate) fn heartbeat(task_id: &str) -> TransportSignal {
    TransportSignal::Event(ProgressEvent::Heartbeat {
        task_id: task_id.to_string(),
    })
}

pub(crate) fn progress_event(task_id: &str, percentage: f64) -> ProgressEvent {
    ProgressEvent::Progress {
        task_id: task_id.to_string(),
        status: "processing".to_string(),
        percentage,
        message: format!("{}% done", percentage),
        eta_seconds: None,
        step_name: None,
    }
}

pub(crate) fn progress(task_id: &str, percentage: f64) -> TransportSignal {
    TransportSignal::Event(progress_event(task_id, percentage))
}

pub(crate) fn snapshot(status: &str, percentage: f64, step: Option<&str>) -> StatusSnapshot {
    StatusSnapshot {
        status: status.to_string(),
        progress: SnapshotProgress {
            percentage,
            current_step: step.map(str::to_string),
        },
        error_message: None,
    }
}
