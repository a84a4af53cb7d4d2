//! Request logging middleware.
//!
//! Tags every request with a uuid request id (echoed in `x-request-id` and
//! available to error bodies) and logs method, path, status and latency.

use crate::middleware::guard::client_addr;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

tokio::task_local! {
    static REQUEST_ID: String;
}

/// Request id of the request being served on this task, if any.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).ok()
}

/// Logs at INFO for 2xx-4xx and WARN for 5xx. Health probes pass through
/// untagged.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if path == "/health" || path.starts_with("/health/") {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let client = client_addr(&request);
    let id = Uuid::new_v4().to_string();

    let span = tracing::info_span!(
        "http_request",
        request_id = %id,
        method = %method,
        path = %path,
        client = %client,
    );

    let start = Instant::now();
    let mut response = REQUEST_ID
        .scope(id.clone(), next.run(request))
        .instrument(span.clone())
        .await;
    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    let _entered = span.enter();
    if status >= 500 {
        warn!(status, latency_ms, "Request failed (5xx)");
    } else {
        info!(status, latency_ms, "Request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}
