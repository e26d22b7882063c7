//! # Request/Response Logging Middleware
//!
//! Structured per-request logging: method, path, status, and duration, tagged
//! with the request ID from [`super::mw_req_stamp`].

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, info, warn};

pub async fn log_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let request_id = req
        .extensions()
        .get::<crate::middleware::RequestStamp>()
        .map(|s| s.id.clone())
        .unwrap_or_else(|| "unknown".to_string());

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status().as_u16();

    if response.status().is_success() {
        info!(request_id = %request_id, %method, %path, status, duration_ms = duration.as_millis(), "request completed");
    } else if response.status().is_client_error() {
        warn!(request_id = %request_id, %method, %path, status, duration_ms = duration.as_millis(), "client error");
    } else if response.status().is_server_error() {
        error!(request_id = %request_id, %method, %path, status, duration_ms = duration.as_millis(), "server error");
    }

    response
}
