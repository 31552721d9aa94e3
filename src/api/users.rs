//! User and permission management endpoints.
//!
//! Every handler checks the caller's grants before touching anything:
//! `view-users` to read, `manage-users` to create or delete accounts,
//! `modify-users` to change grants and `admin` to register permissions.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;
use uuid::Uuid;

use super::auth::require;
use super::{
    ApiError, ApiResponse, AppState, CreatePermissionRequest, CreateUserRequest, ListUsersQuery,
    MessageResponse, PermissionKeysRequest,
};
use crate::constants::permissions::{ADMIN, MANAGE_USERS, MODIFY_USERS, VIEW_USERS};
use crate::entities::permissions::Model as Permission;
use crate::services::{Principal, UserInfo, UserPage};

const MAX_PAGE_SIZE: u64 = 100;

/// GET /api/users
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<ApiResponse<UserPage>>, ApiError> {
    require(&state, &principal, &[VIEW_USERS]).await?;

    if query.page_size.is_some_and(|size| size > MAX_PAGE_SIZE) {
        return Err(ApiError::validation(format!(
            "page_size must be at most {MAX_PAGE_SIZE}"
        )));
    }

    let page = state
        .auth
        .list_users(
            query.page_size,
            query.page.unwrap_or(1),
            query.username.as_deref(),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// GET /api/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    require(&state, &principal, &[VIEW_USERS]).await?;

    let user = state.auth.get_user(user_id).await?;
    let permissions = state.auth.user_permissions(user_id).await?;

    Ok(Json(ApiResponse::success(UserInfo::new(user, permissions))))
}

/// POST /api/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    require(&state, &principal, &[MANAGE_USERS]).await?;

    let user = state
        .auth
        .create_user(&payload.username, &payload.password)
        .await?;

    Ok(Json(ApiResponse::success(UserInfo::new(user, Vec::new()))))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    require(&state, &principal, &[MANAGE_USERS]).await?;

    state.auth.delete_user(user_id).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(
        "User deleted",
    ))))
}

/// POST /api/users/{id}/permissions
pub async fn grant_permissions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<PermissionKeysRequest>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    require(&state, &principal, &[MODIFY_USERS]).await?;

    state
        .permissions
        .add_user_permissions(user_id, &payload.keys)
        .await?;

    let granted = state.auth.user_permissions(user_id).await?;
    Ok(Json(ApiResponse::success(granted)))
}

/// DELETE /api/users/{id}/permissions
pub async fn revoke_permissions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<PermissionKeysRequest>,
) -> Result<Json<ApiResponse<Vec<String>>>, ApiError> {
    require(&state, &principal, &[MODIFY_USERS]).await?;

    state
        .permissions
        .delete_user_permissions(user_id, &payload.keys)
        .await?;

    let granted = state.auth.user_permissions(user_id).await?;
    Ok(Json(ApiResponse::success(granted)))
}

/// GET /api/permissions
pub async fn list_permissions(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<Permission>>>, ApiError> {
    require(&state, &principal, &[VIEW_USERS]).await?;

    let permissions = state.permissions.list_permissions().await?;
    Ok(Json(ApiResponse::success(permissions)))
}

/// POST /api/permissions
pub async fn create_permission(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreatePermissionRequest>,
) -> Result<Json<ApiResponse<Permission>>, ApiError> {
    require(&state, &principal, &[ADMIN]).await?;

    let permission = state
        .permissions
        .create_permission(&payload.key, &payload.description)
        .await?;

    Ok(Json(ApiResponse::success(permission)))
}
