//! Health probes and metrics.

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::sync::Arc;

use super::auth::require;
use super::{ApiError, ApiResponse, AppState};
use crate::constants::permissions::ADMIN;
use crate::services::Principal;

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
    pub uptime: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthReadyResponse {
    pub ready: bool,
    pub database: bool,
}

/// `GET /api/system/health/live`
///
/// Lightweight liveness probe to indicate the API process is running.
pub async fn health_live(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthLiveResponse {
        status: "alive",
        uptime: state.start_time.elapsed().as_secs(),
    }))
}

/// `GET /api/system/health/ready`
///
/// Readiness probe that checks database connectivity.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store.ping().await.is_ok();

    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthReadyResponse {
            ready: database,
            database,
        })),
    )
        .into_response()
}

/// `GET /api/metrics`
///
/// Prometheus exposition, admin only.
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<String, ApiError> {
    require(&state, &principal, &[ADMIN]).await?;

    Ok(state.prometheus_handle.as_ref().map_or_else(
        || "Metrics not enabled or failed to initialize".to_string(),
        metrics_exporter_prometheus::PrometheusHandle::render,
    ))
}
