//! `SeaORM` implementation of the `PermissionService` trait.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::db::Store;
use crate::entities::permissions::Model as Permission;
use crate::services::api_key_service::ApiKeyService;
use crate::services::auth_service::{AuthError, is_unique_violation};
use crate::services::permission_service::{
    PermissionService, Principal, is_authorized, validate_key,
};

pub struct SeaOrmPermissionService {
    store: Store,
    api_keys: Arc<dyn ApiKeyService>,
}

impl SeaOrmPermissionService {
    #[must_use]
    pub fn new(store: Store, api_keys: Arc<dyn ApiKeyService>) -> Self {
        Self { store, api_keys }
    }
}

#[async_trait]
impl PermissionService for SeaOrmPermissionService {
    async fn create_permission(
        &self,
        key: &str,
        description: &str,
    ) -> Result<Permission, AuthError> {
        validate_key(key)?;

        if self.store.get_permission(key).await?.is_some() {
            return Err(AuthError::DuplicateKey(key.to_string()));
        }

        let permission = self
            .store
            .create_permission(key, description)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AuthError::DuplicateKey(key.to_string())
                } else {
                    error!(error = %e, key, "Failed to create permission");
                    AuthError::from(e)
                }
            })?;

        info!(key, "Permission registered");
        Ok(permission)
    }

    async fn get_permission(&self, key: &str) -> Result<Option<Permission>, AuthError> {
        Ok(self.store.get_permission(key).await?)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, AuthError> {
        Ok(self.store.list_permissions().await?)
    }

    async fn add_user_permissions(&self, user_id: Uuid, keys: &[String]) -> Result<(), AuthError> {
        self.store
            .add_user_permissions(user_id, keys)
            .await
            .map_err(|e| {
                let err = AuthError::from(e);
                if matches!(err, AuthError::PersistenceFailure(_)) {
                    error!(error = %err, %user_id, "Failed to grant permissions");
                }
                err
            })?;

        info!(%user_id, ?keys, "Permissions granted");
        Ok(())
    }

    async fn delete_user_permissions(
        &self,
        user_id: Uuid,
        keys: &[String],
    ) -> Result<(), AuthError> {
        self.store
            .delete_user_permissions(user_id, keys)
            .await
            .map_err(|e| {
                let err = AuthError::from(e);
                if matches!(err, AuthError::PersistenceFailure(_)) {
                    error!(error = %err, %user_id, "Failed to revoke permissions");
                }
                err
            })?;

        info!(%user_id, ?keys, "Permissions revoked");
        Ok(())
    }

    async fn granted(&self, principal: &Principal) -> Result<Vec<String>, AuthError> {
        match principal {
            Principal::User(user_id) => Ok(self.store.get_user_permission_keys(*user_id).await?),
            Principal::ApiKey(key) => self.api_keys.permissions_for(key).await,
        }
    }

    async fn check(&self, required: &[&str], principal: &Principal) -> Result<bool, AuthError> {
        let granted = self.granted(principal).await?;
        let allowed = is_authorized(required, &granted);

        let decision = if allowed { "allow" } else { "deny" };
        metrics::counter!("authorization_checks_total", "decision" => decision).increment(1);
        debug!(?required, ?granted, decision, "Authorization check");

        Ok(allowed)
    }
}
