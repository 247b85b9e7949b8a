//! API handlers for the HTTP service

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::audit::{Auditor, AUDIT_JOB_ID};
use crate::models::AuditOutcome;
use crate::scheduler::{DriverState, JobStatus, TaskDriver};

use super::error_response;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Scheduler owning the recurring audit
    pub driver: Arc<TaskDriver>,
    /// Auditor used for manual runs
    pub auditor: Arc<Auditor>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: String,
    /// Crate version
    pub version: String,
    /// Task driver state
    pub scheduler: DriverState,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        scheduler: state.driver.state(),
    })
}

/// Scheduler status response
#[derive(Serialize)]
pub struct JobsResponse {
    /// Task driver state
    pub state: DriverState,
    /// Registered jobs, ordered by id
    pub jobs: Vec<JobStatus>,
}

/// List registered jobs and their counters
pub async fn list_jobs(State(state): State<AppState>) -> Json<JobsResponse> {
    Json(JobsResponse {
        state: state.driver.state(),
        jobs: state.driver.status(),
    })
}

/// Run one audit now, through the scheduled job's run slot
pub async fn run_audit(State(state): State<AppState>) -> Response {
    let guard = match state.driver.try_acquire(AUDIT_JOB_ID) {
        Ok(Some(guard)) => guard,
        Ok(None) => {
            warn!("Manual audit rejected, an audit is already running");
            return error_response(StatusCode::CONFLICT, "An audit is already running");
        }
        Err(e) => return e.into_response(),
    };

    info!("Manual audit requested");
    let outcome = state.auditor.run().await;
    drop(guard);

    match outcome {
        AuditOutcome::FetchFailed { error } => error_response(StatusCode::BAD_GATEWAY, error),
        AuditOutcome::DispatchFailed { error, .. } => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, error)
        }
        outcome => (StatusCode::OK, Json(outcome)).into_response(),
    }
}
