use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use uuid::Uuid;

use crate::entities::{api_keys, prelude::*};

pub struct ApiKeyRepository {
    conn: DatabaseConnection,
}

impl ApiKeyRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<api_keys::Model> {
        api_keys::ActiveModel {
            key: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            created: Set(Utc::now()),
            expires_at: Set(expires_at),
        }
        .insert(&self.conn)
        .await
        .with_context(|| format!("Failed to create API key for user '{user_id}'"))
    }

    pub async fn get(&self, key: Uuid) -> Result<Option<api_keys::Model>> {
        ApiKeys::find_by_id(key)
            .one(&self.conn)
            .await
            .with_context(|| format!("Failed to lookup API key '{key}'"))
    }

    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<api_keys::Model>> {
        ApiKeys::find()
            .filter(api_keys::Column::UserId.eq(user_id))
            .order_by_asc(api_keys::Column::Created)
            .all(&self.conn)
            .await
            .with_context(|| format!("Failed to list API keys for user '{user_id}'"))
    }

    /// Returns false when no such key existed.
    pub async fn delete(&self, key: Uuid) -> Result<bool> {
        let result = ApiKeys::delete_by_id(key)
            .exec(&self.conn)
            .await
            .with_context(|| format!("Failed to delete API key '{key}'"))?;

        Ok(result.rows_affected > 0)
    }
}
