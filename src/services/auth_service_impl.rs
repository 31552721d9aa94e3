//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use sea_orm::SqlErr;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::constants::limits::MAX_USERNAME_LENGTH;
use crate::db::{GrantError, Store, User};
use crate::services::auth_service::{
    AuthError, AuthService, UserInfo, UserPage, is_unique_violation,
};
use crate::services::password::CredentialVerifier;

pub struct SeaOrmAuthService {
    store: Store,
    verifier: CredentialVerifier,
    auto_rehash: bool,
}

impl SeaOrmAuthService {
    pub fn new(store: Store, security: &SecurityConfig) -> Result<Self, AuthError> {
        let verifier = CredentialVerifier::from_config(security)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(Self {
            store,
            verifier,
            auto_rehash: security.auto_rehash,
        })
    }

    fn validate_username(username: &str) -> Result<(), AuthError> {
        let length = username.chars().count();
        if username.trim().is_empty() || length > MAX_USERNAME_LENGTH {
            return Err(AuthError::Validation(format!(
                "Username must be between 1 and {MAX_USERNAME_LENGTH} characters"
            )));
        }
        Ok(())
    }

    /// Validate a new account and hash its password.
    async fn new_passhash(&self, username: &str, password: &str) -> Result<String, AuthError> {
        Self::validate_username(username)?;

        if password.is_empty() {
            return Err(AuthError::Validation("Password cannot be empty".to_string()));
        }

        if self.store.get_user_by_username(username).await?.is_some() {
            return Err(AuthError::DuplicateUser(username.to_string()));
        }

        Ok(self.verifier.hash(password).await?)
    }

    async fn rehash(&self, user_id: Uuid, password: &str) {
        let passhash = match self.verifier.hash(password).await {
            Ok(hash) => hash,
            Err(e) => {
                warn!(error = %e, %user_id, "Failed to compute replacement password hash");
                return;
            }
        };

        match self.store.update_user_passhash(user_id, passhash).await {
            Ok(()) => info!(%user_id, "Password hash upgraded to current parameters"),
            Err(e) => warn!(error = %e, %user_id, "Failed to store replacement password hash"),
        }
    }
}

fn login_outcome(outcome: &'static str) {
    metrics::counter!("auth_login_attempts_total", "outcome" => outcome).increment(1);
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let passhash = self.new_passhash(username, password).await?;

        let user = self
            .store
            .create_user(username, passhash)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    AuthError::DuplicateUser(username.to_string())
                } else {
                    error!(error = %e, username, "Failed to create user");
                    AuthError::from(e)
                }
            })?;

        info!(user_id = %user.id, username, "User created");
        Ok(user)
    }

    async fn create_user_with_permissions(
        &self,
        username: &str,
        password: &str,
        permissions: &[String],
    ) -> Result<User, AuthError> {
        let passhash = self.new_passhash(username, password).await?;

        let user = self
            .store
            .create_user_with_permissions(username, passhash, permissions)
            .await
            .map_err(|e| match e {
                GrantError::Database(ref db)
                    if matches!(db.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) =>
                {
                    AuthError::DuplicateUser(username.to_string())
                }
                other => {
                    error!(error = %other, username, "Failed to create user");
                    AuthError::from(other)
                }
            })?;

        info!(user_id = %user.id, username, ?permissions, "User created");
        Ok(user)
    }

    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        let deleted = self.store.delete_user(user_id).await.map_err(|e| {
            error!(error = %e, %user_id, "Failed to delete user");
            AuthError::from(e)
        })?;

        let Some(username) = deleted else {
            return Err(AuthError::MissingUser(user_id.to_string()));
        };

        info!(%user_id, username, "User deleted");
        Ok(())
    }

    async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::MissingUser(user_id.to_string()))
    }

    async fn get_user_by_username(&self, username: &str) -> Result<User, AuthError> {
        self.store
            .get_user_by_username(username)
            .await?
            .ok_or_else(|| AuthError::MissingUser(username.to_string()))
    }

    async fn list_users(
        &self,
        page_size: Option<u64>,
        page: u64,
        username_filter: Option<&str>,
    ) -> Result<UserPage, AuthError> {
        let (users, has_next_page) = self
            .store
            .list_users(page_size, page, username_filter)
            .await?;

        let ids: Vec<Uuid> = users.iter().map(|u| u.id).collect();
        let mut grants = self.store.get_permission_keys_for_users(&ids).await?;

        let users = users
            .into_iter()
            .map(|user| {
                let permissions = grants.remove(&user.id).unwrap_or_default();
                UserInfo::new(user, permissions)
            })
            .collect();

        Ok(UserPage {
            users,
            has_next_page,
        })
    }

    async fn seen_user(&self, user_id: Uuid) -> Result<(), AuthError> {
        if self.store.touch_user_last_seen(user_id).await? {
            Ok(())
        } else {
            Err(AuthError::MissingUser(user_id.to_string()))
        }
    }

    async fn check_credentials(&self, username: &str, password: &str) -> Result<Uuid, AuthError> {
        let Some((user, passhash)) = self.store.get_user_credentials(username).await? else {
            login_outcome("unknown_user");
            return Err(AuthError::MissingUser(username.to_string()));
        };

        let matched = self.verifier.verify(password, &passhash).await.map_err(|e| {
            error!(error = %e, user_id = %user.id, "Password verification failed unexpectedly");
            login_outcome("error");
            AuthError::from(e)
        })?;

        if !matched {
            login_outcome("mismatch");
            return Err(AuthError::AuthenticationMismatch);
        }

        login_outcome("success");

        if self.auto_rehash && self.verifier.needs_rehash(&passhash) {
            self.rehash(user.id, password).await;
        }

        Ok(user.id)
    }

    async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<String>, AuthError> {
        if self.store.get_user(user_id).await?.is_none() {
            return Err(AuthError::MissingUser(user_id.to_string()));
        }

        Ok(self.store.get_user_permission_keys(user_id).await?)
    }
}
