use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A discrete update about a report task, as delivered by the stream endpoint
/// or synthesized by the status poller.
///
/// The wire payloads use snake_case keys; camelCase spellings are accepted on
/// input so the same type decodes both backend generations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    Connected {
        #[serde(default, alias = "taskId")]
        task_id: String,
    },

    Progress {
        #[serde(default, alias = "taskId")]
        task_id: String,
        #[serde(default)]
        status: String,
        #[serde(default)]
        percentage: f64,
        #[serde(default)]
        message: String,
        #[serde(default, alias = "etaSeconds", skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<f64>,
        #[serde(default, alias = "stepName", skip_serializing_if = "Option::is_none")]
        step_name: Option<String>,
    },

    Completed {
        #[serde(default, alias = "taskId")]
        task_id: String,
        #[serde(default)]
        message: String,
    },

    Error {
        #[serde(default, alias = "taskId")]
        task_id: String,
        #[serde(default, alias = "errorCode")]
        error_code: String,
        #[serde(default, alias = "errorMessage")]
        error_message: String,
        #[serde(default)]
        retryable: bool,
    },

    /// Liveness signal. Never surfaced past the supervisor.
    Heartbeat {
        #[serde(default, alias = "taskId")]
        task_id: String,
    },
}

/// Event discriminant, useful for logging and matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Connected,
    Progress,
    Completed,
    Error,
    Heartbeat,
}

impl EventKind {
    /// Parse an SSE `event:` name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "connected" => Some(EventKind::Connected),
            "progress" => Some(EventKind::Progress),
            "completed" => Some(EventKind::Completed),
            "error" => Some(EventKind::Error),
            "heartbeat" => Some(EventKind::Heartbeat),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Progress => "progress",
            EventKind::Completed => "completed",
            EventKind::Error => "error",
            EventKind::Heartbeat => "heartbeat",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ProgressEvent {
    /// Decode one SSE frame.
    ///
    /// Named frames (`event: progress`) carry the kind in the frame name and the
    /// payload in `data`. Unnamed frames (`message`) must carry the kind in an
    /// `event` field of the JSON payload. Returns `Ok(None)` for frame names
    /// this client does not understand.
    pub fn from_frame(name: &str, data: &str) -> Result<Option<Self>, serde_json::Error> {
        let data = data.trim();

        if name == "message" {
            if data.is_empty() {
                return Ok(None);
            }
            return serde_json::from_str(data).map(Some);
        }

        let Some(kind) = EventKind::from_name(name) else {
            return Ok(None);
        };

        let parsed = if data.is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str::<Value>(data)
        };
        let mut payload = match parsed {
            Ok(value) => value,
            // A heartbeat needs no payload, so `data: ping` is fine.
            Err(_) if kind == EventKind::Heartbeat => Value::Object(Default::default()),
            Err(e) => return Err(e),
        };

        if !payload.is_object() {
            // Scalar JSON payloads only make sense for heartbeats.
            if kind != EventKind::Heartbeat {
                return serde_json::from_value::<Self>(payload).map(Some);
            }
            payload = Value::Object(Default::default());
        }
        if let Some(map) = payload.as_object_mut() {
            map.insert("event".to_string(), Value::String(kind.as_str().to_string()));
        }

        serde_json::from_value(payload).map(Some)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ProgressEvent::Connected { .. } => EventKind::Connected,
            ProgressEvent::Progress { .. } => EventKind::Progress,
            ProgressEvent::Completed { .. } => EventKind::Completed,
            ProgressEvent::Error { .. } => EventKind::Error,
            ProgressEvent::Heartbeat { .. } => EventKind::Heartbeat,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            ProgressEvent::Connected { task_id }
            | ProgressEvent::Progress { task_id, .. }
            | ProgressEvent::Completed { task_id, .. }
            | ProgressEvent::Error { task_id, .. }
            | ProgressEvent::Heartbeat { task_id } => task_id,
        }
    }

    /// `completed` and `error` end the task; nothing useful follows them.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Completed { .. } | ProgressEvent::Error { .. }
        )
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, ProgressEvent::Heartbeat { .. })
    }
}
