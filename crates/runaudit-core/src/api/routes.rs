//! API routes

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, AppState};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/health", get(handlers::health))

        // Scheduler
        .route("/api/v1/jobs", get(handlers::list_jobs))

        // Audit
        .route("/api/v1/audit/run", post(handlers::run_audit))

        .with_state(state)
}
