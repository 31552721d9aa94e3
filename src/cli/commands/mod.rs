mod api_keys;
mod permissions;
mod users;

pub use api_keys::cmd_create_api_key;
pub use permissions::{cmd_create_permission, cmd_grant, cmd_list_permissions, cmd_revoke};
pub use users::{cmd_create_user, cmd_delete_user, cmd_list_users};

use std::path::Path;
use std::sync::Arc;

use crate::api::{AppState, create_app_state_from_config};
use crate::config::Config;
use crate::services::ensure_default_admin;

/// Opens the database and wires the services the same way the server does.
async fn open(config: &Config) -> anyhow::Result<Arc<AppState>> {
    let state = create_app_state_from_config(config.clone(), None).await?;

    ensure_default_admin(
        state.auth.as_ref(),
        &state.config.bootstrap,
        state.store.is_fresh_schema(),
    )
    .await?;

    Ok(state)
}

pub fn cmd_init() -> anyhow::Result<()> {
    let path = Path::new("config.toml");

    if path.exists() {
        println!("config.toml already exists, leaving it untouched.");
        return Ok(());
    }

    Config::default().save_to_path(path)?;
    println!("✓ Wrote default configuration to config.toml");
    Ok(())
}
