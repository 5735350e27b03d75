use std::time::Instant;

use axum::{extract::Request, middleware::Next, response::Response};

pub async fn trace_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    // for the chat route this is time-to-first-byte, the body is still streaming
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let status = response.status();
    if status.is_server_error() {
        tracing::warn!(%method, %path, status = status.as_u16(), elapsed_ms, "request failed");
    } else {
        tracing::info!(%method, %path, status = status.as_u16(), elapsed_ms, "request");
    }

    response
}
