//! Request tracing, HTTP metrics and response hardening.

use axum::extract::{MatchedPath, Request};
use axum::http::{HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

static REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Wraps each request in a `request` span and emits one wide event when it
/// finishes. The span carries empty `user_id` and `session` fields that the
/// session middleware fills in.
pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();

    // Reuse a caller supplied id so traces line up across a reverse proxy
    let request_id = req
        .headers()
        .get(&REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty() && v.len() <= 64)
        .map_or_else(|| Uuid::new_v4().to_string(), str::to_string);

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |mp| mp.as_str().to_string());

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        route = %route,
        user_id = tracing::field::Empty,
        session = tracing::field::Empty,
    );

    async move {
        let mut response = next.run(req).await;

        let elapsed = start.elapsed();
        let status = response.status();

        let labels = [
            ("method", method.to_string()),
            ("path", route),
            ("status", status.as_u16().to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels)
            .record(elapsed.as_secs_f64());

        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if status.is_server_error() {
            warn!(
                event = "http_request_finished",
                duration_ms,
                status_code = status.as_u16(),
                "Request failed"
            );
        } else {
            info!(
                event = "http_request_finished",
                duration_ms,
                status_code = status.as_u16(),
                "Request finished"
            );
        }

        if let Ok(value) = HeaderValue::from_str(&request_id) {
            response.headers_mut().insert(REQUEST_ID.clone(), value);
        }

        response
    }
    .instrument(span)
    .await
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(
            "default-src 'self'; img-src 'self' data:; script-src 'self'; style-src 'self'; frame-ancestors 'none'; base-uri 'self'",
        ),
    );

    // Anything carrying a session cookie or account data stays out of shared caches
    if headers.contains_key(header::SET_COOKIE) || !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}
