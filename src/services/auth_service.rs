//! Domain service for user accounts and password authentication.
//!
//! Also hosts [`AuthError`], the error taxonomy shared by the permission and
//! API key services.

use chrono::{DateTime, Utc};
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::db::{GrantError, User};

/// Errors raised by authentication and authorization operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid permission key '{0}': only lowercase letters and dashes, at most 60 characters")]
    InvalidKeyFormat(String),

    #[error("Permission '{0}' already exists")]
    DuplicateKey(String),

    #[error("User already holds permission '{0}'")]
    DuplicatePermission(String),

    #[error("User '{0}' already exists")]
    DuplicateUser(String),

    #[error("User '{0}' not found")]
    MissingUser(String),

    #[error("Permission '{0}' not found")]
    MissingPermission(String),

    #[error("Invalid credentials")]
    AuthenticationMismatch,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    PersistenceFailure(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DbErr> for AuthError {
    fn from(err: DbErr) -> Self {
        Self::PersistenceFailure(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        if err.downcast_ref::<DbErr>().is_some() {
            Self::PersistenceFailure(format!("{err:#}"))
        } else {
            Self::Internal(format!("{err:#}"))
        }
    }
}

impl From<GrantError> for AuthError {
    fn from(err: GrantError) -> Self {
        match err {
            GrantError::MissingUser(id) => Self::MissingUser(id.to_string()),
            GrantError::MissingPermission(key) | GrantError::NotHeld(key) => {
                Self::MissingPermission(key)
            }
            GrantError::AlreadyHeld(key) => Self::DuplicatePermission(key),
            GrantError::Database(e) => e.into(),
        }
    }
}

/// True when the error chain holds a unique constraint violation.
pub(crate) fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<DbErr>()
        .and_then(DbErr::sql_err)
        .is_some_and(|e| matches!(e, SqlErr::UniqueConstraintViolation(_)))
}

/// User info DTO for responses.
#[derive(Debug, Clone, Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub created: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub permissions: Vec<String>,
}

impl UserInfo {
    #[must_use]
    pub fn new(user: User, permissions: Vec<String>) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created: user.created,
            last_seen: user.last_seen,
            permissions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserPage {
    pub users: Vec<UserInfo>,
    pub has_next_page: bool,
}

/// Domain service trait for user accounts.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Registers a user and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::DuplicateUser`] if the username is taken and
    /// [`AuthError::Validation`] for an empty or over-long username or an
    /// empty password.
    async fn create_user(&self, username: &str, password: &str) -> Result<User, AuthError>;

    /// Registers a user already holding `permissions`. Nothing is stored
    /// unless every grant succeeds.
    async fn create_user_with_permissions(
        &self,
        username: &str,
        password: &str,
        permissions: &[String],
    ) -> Result<User, AuthError>;

    /// Deletes a user together with their sessions, grants and API keys.
    async fn delete_user(&self, user_id: Uuid) -> Result<(), AuthError>;

    async fn get_user(&self, user_id: Uuid) -> Result<User, AuthError>;

    async fn get_user_by_username(&self, username: &str) -> Result<User, AuthError>;

    /// Pages through users in creation order, each with their grants.
    /// Without a page size every matching user is returned.
    async fn list_users(
        &self,
        page_size: Option<u64>,
        page: u64,
        username_filter: Option<&str>,
    ) -> Result<UserPage, AuthError>;

    /// Records that the user was just active.
    async fn seen_user(&self, user_id: Uuid) -> Result<(), AuthError>;

    /// Verifies a username/password pair and returns the user id.
    ///
    /// Hashes made with weaker parameters are replaced on success.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingUser`] for an unknown username and
    /// [`AuthError::AuthenticationMismatch`] for a wrong password.
    async fn check_credentials(&self, username: &str, password: &str) -> Result<Uuid, AuthError>;

    async fn user_permissions(&self, user_id: Uuid) -> Result<Vec<String>, AuthError>;
}
