//! One-time creation of the first administrator.

use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::BootstrapConfig;
use crate::constants::permissions::ADMIN;
use crate::services::{AuthError, AuthService};

/// Creates the configured default user holding `admin`, but only when this
/// process created the schema. Returns the new user's id.
///
/// The user and the grant are written in one transaction. A failure leaves no
/// partial account behind, but the schema is no longer fresh afterwards, so
/// the next start will not try again.
pub async fn ensure_default_admin(
    auth: &dyn AuthService,
    config: &BootstrapConfig,
    fresh_schema: bool,
) -> Result<Option<Uuid>, AuthError> {
    if !fresh_schema {
        return Ok(None);
    }

    let (Some(username), Some(password)) = (
        config.default_user.as_deref().filter(|u| !u.is_empty()),
        config.default_user_password.as_deref().filter(|p| !p.is_empty()),
    ) else {
        warn!(
            "Fresh database without a default user; set APP_DEFAULT_USER and APP_DEFAULT_USER_PASSWORD to create one"
        );
        return Ok(None);
    };

    let user = auth
        .create_user_with_permissions(username, password, &[ADMIN.to_string()])
        .await
        .inspect_err(|e| {
            error!(
                error = %e,
                username,
                "Failed to create the default administrator; this is not retried on later starts, use `create-user` and `grant` instead"
            );
        })?;

    info!(user_id = %user.id, username, "Default administrator created");
    Ok(Some(user.id))
}
