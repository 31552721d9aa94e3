use anyhow::Result;
use chrono::{DateTime, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::entities::{api_keys, permissions};

pub mod migrator;
pub mod repositories;

pub use repositories::permission::GrantError;
pub use repositories::session::SessionRepository;
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,

    /// True when no schema revision existed before this process migrated.
    fresh_schema: bool,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url
                .trim_start_matches("sqlite://")
                .trim_start_matches("sqlite:");
            let path_str = path_str.split('?').next().unwrap_or(path_str);
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        let fresh_schema = migrator::Migrator::get_applied_migrations(&conn)
            .await?
            .is_empty();

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn, fresh_schema })
    }

    /// Whether this process created the schema from scratch.
    #[must_use]
    pub const fn is_fresh_schema(&self) -> bool {
        self.fresh_schema
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn permission_repo(&self) -> repositories::permission::PermissionRepository {
        repositories::permission::PermissionRepository::new(self.conn.clone())
    }

    fn api_key_repo(&self) -> repositories::api_key::ApiKeyRepository {
        repositories::api_key::ApiKeyRepository::new(self.conn.clone())
    }

    /// Session persistence handle for the session codec.
    #[must_use]
    pub fn session_store(&self) -> Arc<SessionRepository> {
        Arc::new(SessionRepository::new(self.conn.clone()))
    }

    pub async fn create_user(&self, username: &str, passhash: String) -> Result<User> {
        self.user_repo().create(username, passhash).await
    }

    pub async fn create_user_with_permissions(
        &self,
        username: &str,
        passhash: String,
        keys: &[String],
    ) -> std::result::Result<User, GrantError> {
        self.user_repo()
            .create_with_permissions(username, passhash, keys)
            .await
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_credentials(&self, username: &str) -> Result<Option<(User, String)>> {
        self.user_repo().get_credentials(username).await
    }

    pub async fn list_users(
        &self,
        page_size: Option<u64>,
        page: u64,
        username_filter: Option<&str>,
    ) -> Result<(Vec<User>, bool)> {
        self.user_repo()
            .list(page_size, page, username_filter)
            .await
    }

    pub async fn count_users(&self) -> Result<u64> {
        self.user_repo().count().await
    }

    pub async fn touch_user_last_seen(&self, id: Uuid) -> Result<bool> {
        self.user_repo().touch_last_seen(id).await
    }

    pub async fn update_user_passhash(&self, id: Uuid, passhash: String) -> Result<()> {
        self.user_repo().update_passhash(id, passhash).await
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<Option<String>> {
        self.user_repo().delete(id).await
    }

    pub async fn create_permission(
        &self,
        key: &str,
        description: &str,
    ) -> Result<permissions::Model> {
        self.permission_repo().create(key, description).await
    }

    pub async fn get_permission(&self, key: &str) -> Result<Option<permissions::Model>> {
        self.permission_repo().get(key).await
    }

    pub async fn list_permissions(&self) -> Result<Vec<permissions::Model>> {
        self.permission_repo().list_all().await
    }

    pub async fn get_user_permission_keys(&self, user_id: Uuid) -> Result<Vec<String>> {
        self.permission_repo().keys_for_user(user_id).await
    }

    pub async fn get_permission_keys_for_users(
        &self,
        user_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<String>>> {
        self.permission_repo().keys_for_users(user_ids).await
    }

    pub async fn add_user_permissions(
        &self,
        user_id: Uuid,
        keys: &[String],
    ) -> std::result::Result<(), GrantError> {
        self.permission_repo()
            .add_user_permissions(user_id, keys)
            .await
    }

    pub async fn delete_user_permissions(
        &self,
        user_id: Uuid,
        keys: &[String],
    ) -> std::result::Result<(), GrantError> {
        self.permission_repo()
            .delete_user_permissions(user_id, keys)
            .await
    }

    pub async fn create_api_key(
        &self,
        user_id: Uuid,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<api_keys::Model> {
        self.api_key_repo().create(user_id, expires_at).await
    }

    pub async fn get_api_key(&self, key: Uuid) -> Result<Option<api_keys::Model>> {
        self.api_key_repo().get(key).await
    }

    pub async fn list_api_keys(&self, user_id: Uuid) -> Result<Vec<api_keys::Model>> {
        self.api_key_repo().list_for_user(user_id).await
    }

    pub async fn delete_api_key(&self, key: Uuid) -> Result<bool> {
        self.api_key_repo().delete(key).await
    }
}
