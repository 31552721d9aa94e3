use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::AppState;
use crate::session::{RequestMeta, UserSession};

/// Per-request working session, shared between the middleware and handlers.
pub type SessionHandle = Arc<Mutex<UserSession>>;

/// Opens the session before the handler runs and saves it afterwards,
/// translating the outcome into a `Set-Cookie` header.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_address = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| "unknown".to_string(), |ci| ci.0.ip().to_string());

    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string);

    let presented = state.cookies.read(request.headers());
    let path = request.uri().path().to_string();

    let session = state
        .sessions
        .open(RequestMeta {
            client_address: &client_address,
            user_agent: user_agent.as_deref(),
            session_cookie: presented.as_deref(),
        })
        .await;

    let span = tracing::Span::current();
    span.record("session", session.opened_as().as_str());
    if let Some(user_id) = session.user_id() {
        span.record("user_id", tracing::field::display(user_id));
    }

    let handle: SessionHandle = Arc::new(Mutex::new(session));
    request.extensions_mut().insert(handle.clone());

    let mut response = next.run(request).await;

    let session = handle.lock().await;

    if !path.starts_with("/api")
        && let Some(user_id) = session.user_id()
        && let Err(e) = state.auth.seen_user(user_id).await
    {
        tracing::debug!(error = %e, %user_id, "Failed to record last seen");
    }

    let directive = state.sessions.save(&session, &path).await;
    if let Some(cookie) = state.cookies.render(&directive) {
        response.headers_mut().append(header::SET_COOKIE, cookie);
    }

    response
}
