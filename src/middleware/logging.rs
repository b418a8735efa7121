//! Logging middleware
//!
//! Wraps every request in an `http_request` span with a request id and logs
//! completion with status and duration.

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::{info, warn, Instrument};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

const SLOW_REQUEST: Duration = Duration::from_secs(30);

/// Request logging middleware
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start_time = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let span = tracing::info_span!(
        "http_request",
        request_id = %request_id,
        method = %method,
        path = %uri.path(),
    );

    let mut response = async move {
        info!(
            "Request started: {} {} - User-Agent: {}",
            method,
            uri,
            request
                .headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown")
        );

        let response = next.run(request).await;
        let duration = start_time.elapsed();
        log_completion(response.status(), duration);

        if duration > SLOW_REQUEST {
            warn!("Slow request: {} {} took {:.2}s", method, uri, duration.as_secs_f64());
        }
        response
    }
    .instrument(span)
    .await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

fn log_completion(status: StatusCode, duration: Duration) {
    let millis = duration.as_secs_f64() * 1000.0;
    if status.is_server_error() {
        warn!("Server error: {} - Duration: {:.2}ms", status, millis);
    } else if status.is_client_error() {
        warn!("Client error: {} - Duration: {:.2}ms", status, millis);
    } else {
        info!("Request completed: {} - Duration: {:.2}ms", status, millis);
    }
}
