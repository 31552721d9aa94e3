pub mod api;
pub mod cli;
pub mod config;
pub mod constants;
pub mod db;
pub mod entities;
pub mod services;
pub mod session;

use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
pub use config::Config;
use services::ensure_default_admin;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let fmt_layer = tracing_subscriber::fmt::layer();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if config.observability.loki_enabled {
        let url = url::Url::parse(&config.observability.loki_url).context("Invalid Loki URL")?;

        let (layer, task) = tracing_loki::builder()
            .label("app", "mediamirror")?
            .extra_field("env", "production")?
            .build_url(url)?;

        tokio::spawn(task);

        registry.with(layer).init();
        info!(
            "Loki logging initialized at {}",
            config.observability.loki_url
        );
    } else {
        registry.init();
    }

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config, prometheus_handle).await,
        Commands::CreateUser { username, password } => {
            cli::cmd_create_user(&config, &username, &password).await
        }
        Commands::DeleteUser { username } => cli::cmd_delete_user(&config, &username).await,
        Commands::Users { filter } => cli::cmd_list_users(&config, filter.as_deref()).await,
        Commands::Grant { username, keys } => cli::cmd_grant(&config, &username, &keys).await,
        Commands::Revoke { username, keys } => cli::cmd_revoke(&config, &username, &keys).await,
        Commands::CreatePermission { key, description } => {
            cli::cmd_create_permission(&config, &key, &description).await
        }
        Commands::Permissions => cli::cmd_list_permissions(&config).await,
        Commands::CreateApiKey {
            username,
            expires_in_days,
        } => cli::cmd_create_api_key(&config, &username, expires_in_days).await,
        Commands::Init => cli::cmd_init(),
    }
}

async fn run_server(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<()> {
    info!(
        "Starting {} v{}",
        config.general.app_name,
        env!("CARGO_PKG_VERSION")
    );

    let addr = format!("{}:{}", config.server.bind_address, config.server.port);
    let state = api::create_app_state_from_config(config, prometheus_handle).await?;

    ensure_default_admin(
        state.auth.as_ref(),
        &state.config.bootstrap,
        state.store.is_fresh_schema(),
    )
    .await?;

    let app = api::router(state);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    info!("🌐 Web Server running at http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("Web server error")?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Error listening for shutdown: {}", e),
    }
}
