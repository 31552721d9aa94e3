use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use uuid::Uuid;

use super::permission::GrantError;
use crate::entities::{api_keys, prelude::*, user_permissions, user_sessions, users};

/// User data returned from repository (without sensitive password hash)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl From<users::Model> for User {
    fn from(model: users::Model) -> Self {
        Self {
            id: model.id,
            username: model.username,
            created: model.created,
            last_seen: model.last_seen,
            last_updated: model.last_updated,
        }
    }
}

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Insert a user with an already computed password hash.
    pub async fn create(&self, username: &str, passhash: String) -> Result<User> {
        let now = Utc::now();

        let model = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            passhash: Set(passhash),
            created: Set(now),
            last_seen: Set(now),
            last_updated: Set(now),
        }
        .insert(&self.conn)
        .await
        .with_context(|| format!("Failed to insert user '{username}'"))?;

        Ok(User::from(model))
    }

    /// Insert a user together with their first grants. Either all rows land
    /// or none do.
    pub async fn create_with_permissions(
        &self,
        username: &str,
        passhash: String,
        keys: &[String],
    ) -> std::result::Result<User, GrantError> {
        let txn = self.conn.begin().await?;
        let now = Utc::now();

        let model = users::ActiveModel {
            id: Set(Uuid::new_v4()),
            username: Set(username.to_string()),
            passhash: Set(passhash),
            created: Set(now),
            last_seen: Set(now),
            last_updated: Set(now),
        }
        .insert(&txn)
        .await?;

        for key in keys {
            if Permissions::find_by_id(key.clone()).one(&txn).await?.is_none() {
                return Err(GrantError::MissingPermission(key.clone()));
            }

            user_permissions::ActiveModel {
                user_id: Set(model.id),
                key: Set(key.clone()),
            }
            .insert(&txn)
            .await?;
        }

        txn.commit().await?;
        Ok(User::from(model))
    }

    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let user = Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user by ID")?;

        Ok(user.map(User::from))
    }

    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let user = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user by username")?;

        Ok(user.map(User::from))
    }

    /// Get user by username together with the stored password hash
    pub async fn get_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        let user = Users::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.conn)
            .await
            .context("Failed to query user credentials")?;

        Ok(user.map(|u| {
            let passhash = u.passhash.clone();
            (User::from(u), passhash)
        }))
    }

    /// Page through users in creation order. The boolean reports whether another
    /// page exists for the same filter.
    pub async fn list(
        &self,
        page_size: Option<u64>,
        page: u64,
        username_filter: Option<&str>,
    ) -> Result<(Vec<User>, bool)> {
        let mut query = Users::find().order_by_asc(users::Column::Created);

        if let Some(filter) = username_filter.filter(|f| !f.is_empty()) {
            // SQLite LIKE is case-insensitive for ASCII
            query = query.filter(users::Column::Username.contains(filter));
        }

        let Some(page_size) = page_size.filter(|size| *size > 0) else {
            let rows = query
                .all(&self.conn)
                .await
                .context("Failed to list users")?;
            return Ok((rows.into_iter().map(User::from).collect(), false));
        };

        let offset = page_size * page.saturating_sub(1);
        let mut rows = query
            .limit(page_size + 1)
            .offset(offset)
            .all(&self.conn)
            .await
            .context("Failed to list users")?;

        let has_next_page = rows.len() as u64 > page_size;
        rows.truncate(usize::try_from(page_size).unwrap_or(usize::MAX));

        Ok((rows.into_iter().map(User::from).collect(), has_next_page))
    }

    pub async fn count(&self) -> Result<u64> {
        Users::find()
            .count(&self.conn)
            .await
            .context("Failed to count users")
    }

    /// Returns false when the user does not exist.
    pub async fn touch_last_seen(&self, id: Uuid) -> Result<bool> {
        let Some(user) = Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for last seen update")?
        else {
            return Ok(false);
        };

        let mut active: users::ActiveModel = user.into();
        active.last_seen = Set(Utc::now());
        active.update(&self.conn).await?;

        Ok(true)
    }

    pub async fn update_passhash(&self, id: Uuid, passhash: String) -> Result<()> {
        let user = Users::find_by_id(id)
            .one(&self.conn)
            .await
            .context("Failed to query user for password update")?
            .ok_or_else(|| anyhow::anyhow!("User not found: {id}"))?;

        let mut active: users::ActiveModel = user.into();
        active.passhash = Set(passhash);
        active.last_updated = Set(Utc::now());
        active.update(&self.conn).await?;

        Ok(())
    }

    /// Delete a user along with their sessions, grants and API keys.
    /// Returns the deleted username, or `None` if the user did not exist.
    pub async fn delete(&self, id: Uuid) -> Result<Option<String>> {
        let txn = self.conn.begin().await?;

        let Some(user) = Users::find_by_id(id).one(&txn).await? else {
            return Ok(None);
        };

        UserSessions::delete_many()
            .filter(user_sessions::Column::UserId.eq(id))
            .exec(&txn)
            .await?;

        UserPermissions::delete_many()
            .filter(user_permissions::Column::UserId.eq(id))
            .exec(&txn)
            .await?;

        ApiKeys::delete_many()
            .filter(api_keys::Column::UserId.eq(id))
            .exec(&txn)
            .await?;

        let username = user.username.clone();
        user.delete(&txn).await?;

        txn.commit().await.context("Failed to commit user deletion")?;
        Ok(Some(username))
    }
}
