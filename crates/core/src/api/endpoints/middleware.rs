use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderValue, Response},
    middleware::Next,
};
use tracing::info;
use uuid::Uuid;

use crate::masking::mask_sensitive;
use crate::metrics::PaymentMetrics;

const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Structured request logging with sensitive-field masking and correlation-id
/// propagation. The inbound `X-Correlation-ID` is reused when present,
/// generated otherwise, and always echoed on the response.
pub async fn log_requests(req: Request, next: Next) -> Response<Body> {
    let correlation_id = req
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let started = Instant::now();

    // Buffer the request body so it can be masked in the log record, then
    // hand the handler an equivalent request.
    let (parts, body) = req.into_parts();
    let request_bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let request_body = mask_sensitive(&String::from_utf8_lossy(&request_bytes));
    let req = Request::from_parts(parts, Body::from(request_bytes));

    let response = next.run(req).await;

    let latency_ms = started.elapsed().as_millis() as u64;
    let status = response.status();

    // Same treatment for the response body.
    let (mut parts, body) = response.into_parts();
    let response_bytes = to_bytes(body, usize::MAX).await.unwrap_or_default();
    let response_body = mask_sensitive(&String::from_utf8_lossy(&response_bytes));

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        parts.headers.insert(CORRELATION_ID_HEADER, value);
    }

    info!(
        correlation_id = %correlation_id,
        method = %method,
        path = %path,
        status = status.as_u16(),
        latency_ms,
        request_body = %request_body,
        response_body = %response_body,
        "request completed"
    );

    Response::from_parts(parts, Body::from(response_bytes))
}

/// Records request count, error count and latency for every request.
pub async fn record_metrics(
    State(metrics): State<Arc<PaymentMetrics>>,
    req: Request,
    next: Next,
) -> Response<Body> {
    let started = Instant::now();
    let response = next.run(req).await;
    metrics.record_request(response.status().as_u16(), started.elapsed());
    response
}
