//! HTTP streaming transport.
//!
//! Opens one long-lived `text/event-stream` response per `connect` call and
//! turns it into [`TransportSignal`]s. The call does not return until the
//! stream closes or fails; all delivery happens through the signal channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::events::ProgressEvent;
use super::sse::SseDecoder;
use crate::errors::{ProgressError, TransportError};

/// Connect timeout for the stream request. The body itself has no timeout;
/// liveness is the supervisor's job.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Raw lifecycle and payload signals from one connection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportSignal {
    /// Response headers arrived with a 2xx status
    Open,
    /// A decoded frame, heartbeats included
    Event(ProgressEvent),
    /// Non-2xx response status
    HttpError(u16),
    /// Connection or body read failure
    NetworkError(String),
    /// The server ended the body cleanly
    Closed,
    /// The transport already holds an open connection; nothing was requested
    AlreadyOpen,
}

impl TransportSignal {
    /// Classify a failure signal. `None` for `Open`, `Event` and `AlreadyOpen`.
    ///
    /// 401 maps to the non-retryable [`ProgressError::Auth`] so an expired
    /// credential is never hammered with retries.
    pub fn failure(&self) -> Option<ProgressError> {
        match self {
            TransportSignal::Open | TransportSignal::Event(_) | TransportSignal::AlreadyOpen => {
                None
            }
            TransportSignal::HttpError(status) => TransportError::from_status(*status)
                .map(ProgressError::from)
                .or(Some(ProgressError::HttpStatus(*status))),
            TransportSignal::NetworkError(reason) => Some(ProgressError::Network(reason.clone())),
            TransportSignal::Closed => Some(ProgressError::Network(
                "stream closed by server before the task finished".to_string(),
            )),
        }
    }
}

/// Something that can open a task event stream.
///
/// `connect` runs until the connection ends. Implementations report
/// everything through `signals`; a closed receiver means nobody is listening
/// any more and the connection should be dropped.
#[async_trait]
pub trait StreamConnector: Send + Sync + 'static {
    async fn connect(
        &self,
        url: &str,
        auth_token: Option<&str>,
        signals: mpsc::UnboundedSender<TransportSignal>,
    );
}

/// Clears the open flag when the connection future finishes or is aborted.
struct OpenGuard(Arc<AtomicBool>);

impl Drop for OpenGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Server-Sent Events transport over `reqwest`.
///
/// Holds at most one open connection: a `connect` while another is open logs
/// a warning, reports [`TransportSignal::AlreadyOpen`] and returns without
/// touching the existing one.
#[derive(Debug, Clone)]
pub struct HttpStreamTransport {
    client: reqwest::Client,
    open: Arc<AtomicBool>,
}

impl HttpStreamTransport {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for HttpStreamTransport {
    async fn connect(
        &self,
        url: &str,
        auth_token: Option<&str>,
        signals: mpsc::UnboundedSender<TransportSignal>,
    ) {
        if self.open.swap(true, Ordering::SeqCst) {
            warn!(url, "stream transport already has an open connection; ignoring connect");
            let _ = signals.send(TransportSignal::AlreadyOpen);
            return;
        }
        let _guard = OpenGuard(Arc::clone(&self.open));

        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache");
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "stream request failed");
                let _ = signals.send(TransportSignal::NetworkError(e.to_string()));
                return;
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(url, status = status.as_u16(), "stream endpoint rejected request");
            let _ = signals.send(TransportSignal::HttpError(status.as_u16()));
            return;
        }

        if signals.send(TransportSignal::Open).is_err() {
            return;
        }

        let mut decoder = SseDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    let _ = signals.send(TransportSignal::NetworkError(e.to_string()));
                    return;
                }
            };

            for frame in decoder.feed(&bytes) {
                match ProgressEvent::from_frame(&frame.event, &frame.data) {
                    Ok(Some(event)) => {
                        if signals.send(TransportSignal::Event(event)).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        debug!(frame = %frame.event, "skipping unrecognized stream frame");
                    }
                    Err(e) => {
                        warn!(frame = %frame.event, error = %e, "dropping malformed stream frame");
                    }
                }
            }
        }

        let _ = signals.send(TransportSignal::Closed);
    }
}
