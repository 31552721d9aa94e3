use axum::{
    Extension, Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use uuid::Uuid;

use super::session::SessionHandle;
use super::{ApiError, ApiResponse, AppState, LoginRequest, MessageResponse};
use crate::constants::API_KEY_HEADER;
use crate::services::{AuthError, Principal, UserInfo};

// ============================================================================
// Middleware
// ============================================================================

/// Resolves the caller to a [`Principal`] and stores it in the request
/// extensions. An `X-API-KEY` header takes precedence over the session.
///
/// Missing credentials yield 401, an invalid or expired API key 403.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = request.extensions().get::<SessionHandle>().cloned();
    let principal = resolve_principal(&state, request.headers(), session.as_ref()).await?;

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

async fn resolve_principal(
    state: &AppState,
    headers: &HeaderMap,
    session: Option<&SessionHandle>,
) -> Result<Principal, ApiError> {
    if let Some(key) = extract_api_key(headers) {
        if !state.api_keys.check_valid(&key).await? {
            return Err(ApiError::Forbidden("Invalid API key".to_string()));
        }
        return Ok(Principal::ApiKey(key));
    }

    if let Some(session) = session
        && let Some(user_id) = session.lock().await.user_id()
    {
        return Ok(Principal::User(user_id));
    }

    Err(ApiError::unauthenticated())
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::to_string)
}

// ============================================================================
// Helpers
// ============================================================================

/// Rejects with 403 unless the principal satisfies every key in `required`.
pub async fn require(
    state: &AppState,
    principal: &Principal,
    required: &[&str],
) -> Result<(), ApiError> {
    if state.permissions.check(required, principal).await? {
        Ok(())
    } else {
        Err(ApiError::forbidden())
    }
}

/// The user acting behind a principal.
pub async fn principal_user_id(state: &AppState, principal: &Principal) -> Result<Uuid, ApiError> {
    match principal {
        Principal::User(user_id) => Ok(*user_id),
        Principal::ApiKey(key) => state
            .api_keys
            .owner(key)
            .await?
            .ok_or_else(|| ApiError::Forbidden("Invalid API key".to_string())),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/login
/// Verify credentials and bind the session to the user
pub async fn login(
    State(state): State<Arc<AppState>>,
    Extension(session): Extension<SessionHandle>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user_id = state
        .auth
        .check_credentials(&payload.username, &payload.password)
        .await
        .map_err(|e| match e {
            AuthError::MissingUser(_) | AuthError::AuthenticationMismatch => {
                ApiError::Unauthorized("Invalid credentials".to_string())
            }
            other => other.into(),
        })?;

    let user = state.auth.get_user(user_id).await?;
    let permissions = state.auth.user_permissions(user_id).await?;

    session
        .lock()
        .await
        .login(user.id, &user.username)
        .map_err(|e| ApiError::internal(format!("Failed to create session: {e}")))?;

    tracing::info!(%user_id, username = %user.username, "User logged in");

    Ok(Json(ApiResponse::success(UserInfo::new(user, permissions))))
}

/// POST /auth/logout
/// Drop the session; the stored row is deleted and the cookie cleared
pub async fn logout(
    Extension(session): Extension<SessionHandle>,
) -> Json<ApiResponse<MessageResponse>> {
    session.lock().await.clear();
    Json(ApiResponse::success(MessageResponse::new("Logged out")))
}

/// GET /api/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let user_id = principal_user_id(&state, &principal).await?;
    let user = state.auth.get_user(user_id).await?;
    let permissions = state.auth.user_permissions(user_id).await?;

    Ok(Json(ApiResponse::success(UserInfo::new(user, permissions))))
}
