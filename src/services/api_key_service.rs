//! Machine credentials sent in the `X-API-KEY` header.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::entities::api_keys;
use crate::services::auth_service::AuthError;

#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyInfo {
    pub key: Uuid,
    pub user_id: Uuid,
    pub created: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<api_keys::Model> for ApiKeyInfo {
    fn from(model: api_keys::Model) -> Self {
        Self {
            key: model.key,
            user_id: model.user_id,
            created: model.created,
            expires_at: model.expires_at,
        }
    }
}

#[async_trait::async_trait]
pub trait ApiKeyService: Send + Sync {
    /// Issues a key for `user_id`. Fails with [`AuthError::MissingUser`]
    /// for an unknown user.
    async fn create_api_key(
        &self,
        user_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKeyInfo, AuthError>;

    /// False for unknown keys. An expired key is deleted and reported invalid.
    async fn check_valid(&self, key: &str) -> Result<bool, AuthError>;

    /// Returns false when the key did not exist.
    async fn delete_api_key(&self, key: &str) -> Result<bool, AuthError>;

    /// Owning user's grants; empty for an unknown or expired key.
    async fn permissions_for(&self, key: &str) -> Result<Vec<String>, AuthError>;

    /// Owner of a live key.
    async fn owner(&self, key: &str) -> Result<Option<Uuid>, AuthError>;

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKeyInfo>, AuthError>;
}
