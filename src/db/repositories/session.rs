use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};

use crate::entities::{prelude::*, user_sessions};
use crate::session::SessionStore;

/// Each call runs in its own implicit transaction on a pooled connection.
pub struct SessionRepository {
    conn: DatabaseConnection,
}

impl SessionRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionStore for SessionRepository {
    async fn get(&self, id: &str) -> Result<Option<user_sessions::Model>> {
        UserSessions::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .with_context(|| format!("Failed to lookup session '{id}'"))
    }

    async fn insert(&self, record: user_sessions::Model) -> Result<()> {
        let id = record.id.clone();
        user_sessions::ActiveModel {
            id: Set(record.id),
            device_identifier: Set(record.device_identifier),
            created_at: Set(record.created_at),
            expires_at: Set(record.expires_at),
            user_id: Set(record.user_id),
            data: Set(record.data),
        }
        .insert(&self.conn)
        .await
        .with_context(|| format!("Failed to insert session '{id}'"))?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        expires_at: Option<DateTime<Utc>>,
        data: serde_json::Value,
    ) -> Result<bool> {
        let Some(existing) = UserSessions::find_by_id(id.to_string())
            .one(&self.conn)
            .await
            .with_context(|| format!("Failed to lookup session '{id}' for update"))?
        else {
            return Ok(false);
        };

        let mut active: user_sessions::ActiveModel = existing.into();
        active.expires_at = Set(expires_at);
        active.data = Set(Some(data));
        active
            .update(&self.conn)
            .await
            .with_context(|| format!("Failed to update session '{id}'"))?;

        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = UserSessions::delete_by_id(id.to_string())
            .exec(&self.conn)
            .await
            .with_context(|| format!("Failed to delete session '{id}'"))?;

        Ok(result.rows_affected > 0)
    }
}
