//! Permission registry, user grants and the authorization decision.

use std::sync::OnceLock;

use regex::Regex;
use uuid::Uuid;

use crate::constants::permissions::ADMIN;
use crate::entities::permissions::Model as Permission;
use crate::services::auth_service::AuthError;

/// Who is asking: a logged-in user or a machine presenting an API key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    User(Uuid),
    ApiKey(String),
}

/// Decide whether `granted` satisfies `required`.
///
/// An empty grant set is always denied, even for an empty requirement: a
/// principal that resolves to nothing is treated as unauthenticated.
/// Otherwise `admin` satisfies anything, and any other grant set must be a
/// superset of `required`.
#[must_use]
pub fn is_authorized<S: AsRef<str>>(required: &[&str], granted: &[S]) -> bool {
    if granted.is_empty() {
        return false;
    }

    let holds = |key: &str| granted.iter().any(|g| g.as_ref() == key);

    holds(ADMIN) || required.iter().all(|&key| holds(key))
}

pub fn validate_key(key: &str) -> Result<(), AuthError> {
    static RE_KEY: OnceLock<Regex> = OnceLock::new();
    let re = RE_KEY
        .get_or_init(|| Regex::new(r"^[a-z-]{0,60}$").expect("Invalid regex pattern defined in code"));

    if re.is_match(key) {
        Ok(())
    } else {
        Err(AuthError::InvalidKeyFormat(key.to_string()))
    }
}

#[async_trait::async_trait]
pub trait PermissionService: Send + Sync {
    /// Registers a new permission.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidKeyFormat`] if the key is not lowercase
    /// letters and dashes (at most 60), [`AuthError::DuplicateKey`] if it
    /// already exists.
    async fn create_permission(&self, key: &str, description: &str)
    -> Result<Permission, AuthError>;

    async fn get_permission(&self, key: &str) -> Result<Option<Permission>, AuthError>;

    /// All registered permissions ordered by key.
    async fn list_permissions(&self) -> Result<Vec<Permission>, AuthError>;

    /// Grants every key in `keys`, or none of them.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingUser`], [`AuthError::MissingPermission`] for an
    /// unregistered key, [`AuthError::DuplicatePermission`] for a key the user
    /// already holds.
    async fn add_user_permissions(&self, user_id: Uuid, keys: &[String]) -> Result<(), AuthError>;

    /// Revokes every key in `keys`, or none of them. A key that is not
    /// registered or not held yields [`AuthError::MissingPermission`].
    async fn delete_user_permissions(
        &self,
        user_id: Uuid,
        keys: &[String],
    ) -> Result<(), AuthError>;

    /// Permission keys the principal holds, directly or through its API key.
    async fn granted(&self, principal: &Principal) -> Result<Vec<String>, AuthError>;

    /// Whether the principal satisfies every key in `required`.
    async fn check(&self, required: &[&str], principal: &Principal) -> Result<bool, AuthError>;
}
