//! Application setup and server configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use extraction::SessionPool;

use crate::kernel::jobs::JobOrchestrator;
use crate::server::routes::{cancel_handler, health_handler, status_handler, submit_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: JobOrchestrator,
    pub headless_pool: Option<Arc<SessionPool>>,
}

impl AppState {
    pub fn new(orchestrator: JobOrchestrator) -> Self {
        Self {
            orchestrator,
            headless_pool: None,
        }
    }

    pub fn with_headless_pool(mut self, pool: Option<Arc<SessionPool>>) -> Self {
        self.headless_pool = pool;
        self
    }
}

/// Build the Axum application router
///
/// `request_timeout` bounds the accept and poll handlers; job work runs on
/// detached workers and is not subject to it.
pub fn build_app(state: AppState, request_timeout: Duration) -> Router {
    // CORS configuration - allow any origin, clients are server-to-server
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/parse", post(submit_handler))
        .route("/parse/:job_id", get(status_handler).delete(cancel_handler))
        .route("/health", get(health_handler))
        // Middleware layers (applied in reverse order - last added runs first)
        .layer(Extension(state))
        .layer(TimeoutLayer::new(request_timeout))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
