//! Task event stream: wire types, SSE framing and the HTTP transport.

pub mod events;
pub mod sse;
pub mod transport;

pub use events::{EventKind, ProgressEvent};
pub use sse::{SseDecoder, SseFrame};
pub use transport::{HttpStreamTransport, StreamConnector, TransportSignal};

/// Expand a `{task_id}` path template against a base URL.
///
/// Tolerates a trailing slash on the base and a missing leading slash on the
/// path.
pub fn task_url(base_url: &str, path_template: &str, task_id: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path_template.replace("{task_id}", task_id);
    if path.starts_with('/') {
        format!("{}{}", base, path)
    } else {
        format!("{}/{}", base, path)
    }
}
