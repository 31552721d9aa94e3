use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::services::{
    ApiKeyService, AuthService, PermissionService, SeaOrmApiKeyService, SeaOrmAuthService,
    SeaOrmPermissionService,
};
use crate::session::{CookieSettings, SessionCodec};

pub mod auth;
mod error;
mod keys;
mod observability;
pub mod session;
mod system;
mod types;
mod users;

pub use error::ApiError;
pub use session::SessionHandle;
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    pub store: Store,

    pub auth: Arc<dyn AuthService>,

    pub permissions: Arc<dyn PermissionService>,

    pub api_keys: Arc<dyn ApiKeyService>,

    pub sessions: Arc<SessionCodec>,

    pub cookies: CookieSettings,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

pub fn create_app_state(
    store: Store,
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let auth: Arc<dyn AuthService> = Arc::new(SeaOrmAuthService::new(
        store.clone(),
        &config.security,
    )?);

    let api_keys: Arc<dyn ApiKeyService> = Arc::new(SeaOrmApiKeyService::new(store.clone()));

    let permissions: Arc<dyn PermissionService> = Arc::new(SeaOrmPermissionService::new(
        store.clone(),
        api_keys.clone(),
    ));

    let sessions = Arc::new(SessionCodec::new(store.session_store(), &config.session));
    let cookies = CookieSettings::from_config(&config.session)?;

    Ok(Arc::new(AppState {
        config: Arc::new(config),
        store,
        auth,
        permissions,
        api_keys,
        sessions,
        cookies,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    }))
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let store = Store::with_pool_options(
        &config.general.database_path,
        config.general.max_db_connections,
        config.general.min_db_connections,
    )
    .await?;

    create_app_state(store, config, prometheus_handle)
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let protected_routes = create_protected_router(state.clone());

    let api_router = Router::new()
        .merge(protected_routes)
        .route("/system/health/live", get(system::health_live))
        .route("/system/health/ready", get(system::health_ready));

    let origins: Vec<HeaderValue> = cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
    let cors_layer = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
        .allow_credentials(true);

    Router::new()
        .nest("/api", api_router)
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session::session_middleware,
        ))
        .layer(cors_layer)
        .layer(middleware::from_fn(observability::security_headers_middleware))
        .layer(middleware::from_fn(observability::logging_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(auth::me))
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{id}", get(users::get_user).delete(users::delete_user))
        .route(
            "/users/{id}/permissions",
            post(users::grant_permissions).delete(users::revoke_permissions),
        )
        .route(
            "/permissions",
            get(users::list_permissions).post(users::create_permission),
        )
        .route("/keys", get(keys::list_keys).post(keys::create_key))
        .route("/keys/{key}", delete(keys::delete_key))
        .route("/metrics", get(system::get_metrics))
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}

async fn not_found() -> ApiError {
    ApiError::NotFound("No such route".to_string())
}
