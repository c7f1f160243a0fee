//! Request deadline middleware.
//!
//! Wraps the whole handler in a hard wall-clock deadline. On expiry the
//! handler future is dropped and a fixed 504 payload is returned; blocking
//! work already handed to the worker pool keeps running to completion.

use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::warn;

/// Configured request deadline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestDeadline {
    limit: Duration,
}

impl RequestDeadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    /// The 504 body sent when the deadline fires.
    pub fn timeout_response(&self) -> Response {
        let secs = self.limit.as_secs_f64();
        (
            StatusCode::GATEWAY_TIMEOUT,
            Json(json!({
                "error": "Request timeout",
                "message": format!("Request took longer than {secs} seconds"),
                "timeout_seconds": secs,
            })),
        )
            .into_response()
    }
}

impl Default for RequestDeadline {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

/// Axum middleware: use with `middleware::from_fn_with_state(deadline, enforce_deadline)`.
pub async fn enforce_deadline(
    State(deadline): State<RequestDeadline>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match tokio::time::timeout(deadline.limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                %method,
                %path,
                timeout_secs = deadline.limit.as_secs_f64(),
                "request deadline exceeded"
            );
            deadline.timeout_response()
        }
    }
}
