use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::principal_user_id;
use super::{ApiError, ApiResponse, AppState, CreateApiKeyRequest, MessageResponse};
use crate::services::{ApiKeyInfo, Principal};

const MAX_EXPIRY_DAYS: i64 = 3650;

/// GET /api/keys
/// Keys owned by the caller
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<ApiKeyInfo>>>, ApiError> {
    let user_id = principal_user_id(&state, &principal).await?;
    let keys = state.api_keys.list_api_keys(user_id).await?;
    Ok(Json(ApiResponse::success(keys)))
}

/// POST /api/keys
/// Issue a key for the caller, optionally expiring after N days
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    body: Bytes,
) -> Result<Json<ApiResponse<ApiKeyInfo>>, ApiError> {
    let user_id = principal_user_id(&state, &principal).await?;

    let payload: CreateApiKeyRequest = if body.is_empty() {
        CreateApiKeyRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::validation(format!("Invalid request body: {e}")))?
    };

    let expires_at = match payload.expires_in_days {
        Some(days) if !(1..=MAX_EXPIRY_DAYS).contains(&days) => {
            return Err(ApiError::validation(format!(
                "expires_in_days must be between 1 and {MAX_EXPIRY_DAYS}"
            )));
        }
        Some(days) => Some(Utc::now() + Duration::days(days)),
        None => None,
    };

    let key = state.api_keys.create_api_key(user_id, expires_at).await?;
    Ok(Json(ApiResponse::success(key)))
}

/// DELETE /api/keys/{key}
/// Revoke one of the caller's keys
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(key): Path<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    let user_id = principal_user_id(&state, &principal).await?;

    let parsed = Uuid::parse_str(key.trim()).ok();
    let owned = state
        .api_keys
        .list_api_keys(user_id)
        .await?
        .iter()
        .any(|k| Some(k.key) == parsed);

    if !owned || !state.api_keys.delete_api_key(&key).await? {
        return Err(ApiError::not_found("API key", key));
    }

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "API key revoked",
    ))))
}
