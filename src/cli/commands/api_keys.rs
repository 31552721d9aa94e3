//! API key command handler

use chrono::{Duration, Utc};

use crate::config::Config;

pub async fn cmd_create_api_key(
    config: &Config,
    username: &str,
    expires_in_days: Option<i64>,
) -> anyhow::Result<()> {
    let expires_at = match expires_in_days {
        Some(days) if days <= 0 => anyhow::bail!("--expires-in-days must be positive"),
        Some(days) => Some(
            Utc::now()
                + Duration::try_days(days)
                    .ok_or_else(|| anyhow::anyhow!("--expires-in-days is too large"))?,
        ),
        None => None,
    };

    let state = super::open(config).await?;
    let user = state.auth.get_user_by_username(username).await?;
    let key = state.api_keys.create_api_key(user.id, expires_at).await?;

    println!("✓ API key for '{username}': {}", key.key);
    match key.expires_at {
        Some(expires) => println!("  Expires: {}", expires.format("%Y-%m-%d %H:%M UTC")),
        None => println!("  Expires: never"),
    }
    println!("  Send it in the X-API-KEY header.");

    Ok(())
}
