//! User command handlers

use crate::config::Config;

pub async fn cmd_create_user(config: &Config, username: &str, password: &str) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let user = state.auth.create_user(username, password).await?;

    println!("✓ Created user '{}' ({})", user.username, user.id);
    Ok(())
}

pub async fn cmd_delete_user(config: &Config, username: &str) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let user = state.auth.get_user_by_username(username).await?;
    state.auth.delete_user(user.id).await?;

    println!("✓ Deleted user '{username}'");
    Ok(())
}

pub async fn cmd_list_users(config: &Config, filter: Option<&str>) -> anyhow::Result<()> {
    let state = super::open(config).await?;
    let page = state.auth.list_users(None, 1, filter).await?;

    if page.users.is_empty() {
        println!("No users found.");
        return Ok(());
    }

    println!("Users ({} total)", page.users.len());
    println!("{:-<70}", "");

    for user in page.users {
        let permissions = if user.permissions.is_empty() {
            "-".to_string()
        } else {
            user.permissions.join(", ")
        };

        println!("• {} ({})", user.username, user.id);
        println!(
            "  Created: {} | Last seen: {}",
            user.created.format("%Y-%m-%d %H:%M"),
            user.last_seen.format("%Y-%m-%d %H:%M")
        );
        println!("  Permissions: {permissions}");
    }

    Ok(())
}
