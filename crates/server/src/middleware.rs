//! Request timing middleware.

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use std::time::Instant;

/// Response header carrying handler time in seconds.
pub const PROCESS_TIME_HEADER: &str = "x-process-time";

/// Log every request and stamp the response with its processing time.
///
/// For streamed answers this measures time to the first byte of the body.
pub async fn track_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let mut response = next.run(request).await;

    let elapsed = start.elapsed().as_secs_f64();
    tracing::info!(
        "{} {} -> {} in {:.2}ms",
        method,
        path,
        response.status().as_u16(),
        elapsed * 1000.0
    );

    if let Ok(value) = HeaderValue::from_str(&format!("{:.4}", elapsed)) {
        response.headers_mut().insert(PROCESS_TIME_HEADER, value);
    }
    response
}
