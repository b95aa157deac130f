use axum::{extract::Extension, Json};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    active_jobs: usize,
    headless: Option<HeadlessHealth>,
}

#[derive(Serialize)]
pub struct HeadlessHealth {
    max_sessions: usize,
    in_use: usize,
}

/// Liveness check
///
/// Reports running workers and headless pool occupancy. Headless is `null`
/// when rendering is not configured.
pub async fn health_handler(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    let headless = state.headless_pool.as_ref().map(|pool| HeadlessHealth {
        max_sessions: pool.max_sessions(),
        in_use: pool.in_use(),
    });

    Json(HealthResponse {
        status: "ok".to_string(),
        active_jobs: state.orchestrator.active_jobs(),
        headless,
    })
}
