//! A small axum backend serving task streams and status snapshots.

#![allow(dead_code)]

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::stream;
use serde_json::json;

pub const TOKEN: &str = "secret-token";

/// How the stream endpoint behaves.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    /// connected, progress 40/80 with a heartbeat in between, completed
    Complete,
    /// connected, progress 30, then a backend error
    BackendError,
    /// Always 503
    Unavailable,
}

#[derive(Clone)]
pub struct Backend {
    pub stream_mode: StreamMode,
    /// Status the status endpoint reports
    pub status: &'static str,
    pub stream_hits: Arc<AtomicUsize>,
    pub status_hits: Arc<AtomicUsize>,
}

impl Backend {
    pub fn new(stream_mode: StreamMode, status: &'static str) -> Self {
        Self {
            stream_mode,
            status,
            stream_hits: Arc::new(AtomicUsize::new(0)),
            status_hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn stream_hits(&self) -> usize {
        self.stream_hits.load(Ordering::SeqCst)
    }

    pub fn status_hits(&self) -> usize {
        self.status_hits.load(Ordering::SeqCst)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {}", TOKEN))
}

fn frame(name: &str, payload: serde_json::Value) -> Result<Event, Infallible> {
    Ok(Event::default().event(name).data(payload.to_string()))
}

async fn stream_handler(
    State(backend): State<Backend>,
    Path(task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.stream_hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let frames = match backend.stream_mode {
        StreamMode::Unavailable => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
        StreamMode::Complete => vec![
            frame("connected", json!({ "task_id": task_id })),
            Ok(Event::default().comment("keep-alive")),
            frame(
                "progress",
                json!({
                    "task_id": task_id,
                    "status": "processing",
                    "percentage": 40.0,
                    "message": "Analyzing competitors",
                    "step_name": "Analyzing competitors",
                }),
            ),
            frame("heartbeat", json!({ "task_id": task_id })),
            frame(
                "progress",
                json!({
                    "taskId": task_id,
                    "status": "processing",
                    "percentage": 80.0,
                    "message": "Generating report",
                    "etaSeconds": 12.0,
                }),
            ),
            frame(
                "completed",
                json!({ "task_id": task_id, "message": "Report ready" }),
            ),
        ],
        StreamMode::BackendError => vec![
            frame("connected", json!({ "task_id": task_id })),
            frame(
                "progress",
                json!({
                    "task_id": task_id,
                    "status": "processing",
                    "percentage": 30.0,
                    "message": "Gathering market data",
                }),
            ),
            frame(
                "error",
                json!({
                    "task_id": task_id,
                    "error_code": "DATA_SOURCE_DOWN",
                    "error_message": "Market data provider unavailable",
                    "retryable": false,
                }),
            ),
        ],
    };

    Sse::new(stream::iter(frames)).into_response()
}

async fn status_handler(
    State(backend): State<Backend>,
    Path(_task_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    backend.status_hits.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let percentage = if backend.status == "completed" { 100.0 } else { 55.0 };
    let mut body = json!({
        "status": backend.status,
        "progress": { "percentage": percentage, "current_step": "Identifying trends" },
    });
    if backend.status == "failed" {
        body["error_message"] = json!("Quota exceeded");
    }
    Json(body).into_response()
}

/// Start the backend on an ephemeral port and return its base URL.
pub async fn serve(backend: Backend) -> String {
    let app = Router::new()
        .route("/api/tasks/{task_id}/stream", get(stream_handler))
        .route("/api/tasks/{task_id}/status", get(status_handler))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Accept connections and never write a byte back. Returns the base URL.
pub async fn serve_silent() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}
