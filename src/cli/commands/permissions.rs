//! Permission command handlers

use crate::config::Config;

pub async fn cmd_create_permission(
    config: &Config,
    key: &str,
    description: &str,
) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let permission = state.permissions.create_permission(key, description).await?;

    println!("✓ Registered permission '{}'", permission.key);
    Ok(())
}

pub async fn cmd_list_permissions(config: &Config) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let permissions = state.permissions.list_permissions().await?;

    println!("Permissions ({} total)", permissions.len());
    println!("{:-<70}", "");

    for permission in permissions {
        println!("{:<20} {}", permission.key, permission.description);
    }

    Ok(())
}

pub async fn cmd_grant(config: &Config, username: &str, keys: &[String]) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let user = state.auth.get_user_by_username(username).await?;
    state.permissions.add_user_permissions(user.id, keys).await?;

    println!("✓ Granted {} to '{username}'", keys.join(", "));
    Ok(())
}

pub async fn cmd_revoke(config: &Config, username: &str, keys: &[String]) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let user = state.auth.get_user_by_username(username).await?;
    state
        .permissions
        .delete_user_permissions(user.id, keys)
        .await?;

    println!("✓ Revoked {} from '{username}'", keys.join(", "));
    Ok(())
}
