//! `SeaORM` implementation of the `ApiKeyService` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::Store;
use crate::entities::api_keys;
use crate::services::api_key_service::{ApiKeyInfo, ApiKeyService};
use crate::services::auth_service::AuthError;

pub struct SeaOrmApiKeyService {
    store: Store,
}

impl SeaOrmApiKeyService {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }

    /// Keys are UUIDs; anything else cannot exist.
    async fn lookup(&self, key: &str) -> Result<Option<api_keys::Model>, AuthError> {
        let Ok(key) = Uuid::parse_str(key.trim()) else {
            return Ok(None);
        };
        Ok(self.store.get_api_key(key).await?)
    }

    /// The key if present and not expired.
    async fn live(&self, key: &str) -> Result<Option<api_keys::Model>, AuthError> {
        Ok(self
            .lookup(key)
            .await?
            .filter(|k| !is_expired(k, Utc::now())))
    }
}

fn is_expired(key: &api_keys::Model, now: DateTime<Utc>) -> bool {
    key.expires_at.is_some_and(|expires| expires <= now)
}

#[async_trait]
impl ApiKeyService for SeaOrmApiKeyService {
    async fn create_api_key(
        &self,
        user_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<ApiKeyInfo, AuthError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AuthError::MissingUser(user_id.to_string()));
        }

        let key = self
            .store
            .create_api_key(user_id, expires_at)
            .await
            .map_err(|e| {
                error!(error = %e, %user_id, "Failed to create API key");
                AuthError::from(e)
            })?;

        info!(%user_id, expires_at = ?key.expires_at, "API key issued");
        Ok(key.into())
    }

    async fn check_valid(&self, key: &str) -> Result<bool, AuthError> {
        let Some(found) = self.lookup(key).await? else {
            return Ok(false);
        };

        if is_expired(&found, Utc::now()) {
            debug!(user_id = %found.user_id, "Evicting expired API key");
            self.store.delete_api_key(found.key).await?;
            return Ok(false);
        }

        Ok(true)
    }

    async fn delete_api_key(&self, key: &str) -> Result<bool, AuthError> {
        let Ok(key) = Uuid::parse_str(key.trim()) else {
            return Ok(false);
        };

        let deleted = self.store.delete_api_key(key).await.map_err(|e| {
            error!(error = %e, "Failed to delete API key");
            AuthError::from(e)
        })?;

        if deleted {
            info!("API key revoked");
        }
        Ok(deleted)
    }

    async fn permissions_for(&self, key: &str) -> Result<Vec<String>, AuthError> {
        let Some(found) = self.live(key).await? else {
            return Ok(Vec::new());
        };

        Ok(self.store.get_user_permission_keys(found.user_id).await?)
    }

    async fn owner(&self, key: &str) -> Result<Option<Uuid>, AuthError> {
        Ok(self.live(key).await?.map(|k| k.user_id))
    }

    async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<ApiKeyInfo>, AuthError> {
        let keys = self.store.list_api_keys(user_id).await?;
        Ok(keys.into_iter().map(ApiKeyInfo::from).collect())
    }
}
