use std::collections::HashMap;

use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use thiserror::Error;
use uuid::Uuid;

use crate::entities::{permissions, prelude::*, user_permissions};

/// Reasons a grant batch is rejected. Any of these rolls back the whole batch.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("user {0} does not exist")]
    MissingUser(Uuid),

    #[error("permission '{0}' does not exist")]
    MissingPermission(String),

    #[error("user already holds permission '{0}'")]
    AlreadyHeld(String),

    #[error("user does not hold permission '{0}'")]
    NotHeld(String),

    #[error(transparent)]
    Database(#[from] DbErr),
}

pub struct PermissionRepository {
    conn: DatabaseConnection,
}

impl PermissionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&self, key: &str, description: &str) -> Result<permissions::Model> {
        let model = permissions::ActiveModel {
            key: Set(key.to_string()),
            description: Set(description.to_string()),
        }
        .insert(&self.conn)
        .await
        .with_context(|| format!("Failed to insert permission '{key}'"))?;

        Ok(model)
    }

    pub async fn get(&self, key: &str) -> Result<Option<permissions::Model>> {
        Permissions::find_by_id(key.to_string())
            .one(&self.conn)
            .await
            .with_context(|| format!("Failed to lookup permission '{key}'"))
    }

    pub async fn list_all(&self) -> Result<Vec<permissions::Model>> {
        Permissions::find()
            .order_by_asc(permissions::Column::Key)
            .all(&self.conn)
            .await
            .context("Failed to list permissions")
    }

    pub async fn keys_for_user(&self, user_id: Uuid) -> Result<Vec<String>> {
        let grants = UserPermissions::find()
            .filter(user_permissions::Column::UserId.eq(user_id))
            .order_by_asc(user_permissions::Column::Key)
            .all(&self.conn)
            .await
            .with_context(|| format!("Failed to lookup permissions for user '{user_id}'"))?;

        Ok(grants.into_iter().map(|g| g.key).collect())
    }

    /// All grants for the given users, keyed by user id.
    pub async fn keys_for_users(&self, user_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<String>>> {
        if user_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let grants = UserPermissions::find()
            .filter(user_permissions::Column::UserId.is_in(user_ids.iter().copied()))
            .order_by_asc(user_permissions::Column::Key)
            .all(&self.conn)
            .await
            .context("Failed to lookup permissions for users")?;

        let mut by_user: HashMap<Uuid, Vec<String>> = HashMap::new();
        for grant in grants {
            by_user.entry(grant.user_id).or_default().push(grant.key);
        }

        Ok(by_user)
    }

    pub async fn add_user_permissions(
        &self,
        user_id: Uuid,
        keys: &[String],
    ) -> Result<(), GrantError> {
        let txn = self.conn.begin().await?;

        if Users::find_by_id(user_id).one(&txn).await?.is_none() {
            return Err(GrantError::MissingUser(user_id));
        }

        for key in keys {
            if Permissions::find_by_id(key.clone()).one(&txn).await?.is_none() {
                return Err(GrantError::MissingPermission(key.clone()));
            }

            // Sees rows inserted earlier in this batch, so repeated keys are caught too
            if UserPermissions::find_by_id((user_id, key.clone()))
                .one(&txn)
                .await?
                .is_some()
            {
                return Err(GrantError::AlreadyHeld(key.clone()));
            }

            user_permissions::ActiveModel {
                user_id: Set(user_id),
                key: Set(key.clone()),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(())
    }

    pub async fn delete_user_permissions(
        &self,
        user_id: Uuid,
        keys: &[String],
    ) -> Result<(), GrantError> {
        let txn = self.conn.begin().await?;

        if Users::find_by_id(user_id).one(&txn).await?.is_none() {
            return Err(GrantError::MissingUser(user_id));
        }

        for key in keys {
            if Permissions::find_by_id(key.clone()).one(&txn).await?.is_none() {
                return Err(GrantError::MissingPermission(key.clone()));
            }

            let Some(grant) = UserPermissions::find_by_id((user_id, key.clone()))
                .one(&txn)
                .await?
            else {
                return Err(GrantError::NotHeld(key.clone()));
            };

            grant.delete(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }
}
