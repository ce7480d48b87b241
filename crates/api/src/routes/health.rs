//! Health checks for the load balancer and orchestrator

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Unhealthy,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: Status,
    pub version: &'static str,
    pub store: Status,
}

async fn check_store(state: &AppState) -> Status {
    match state.credentials.ping().await {
        Ok(()) => Status::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Credential store unreachable");
            Status::Unhealthy
        }
    }
}

/// Overall status with the store check broken out
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store = check_store(&state).await;
    let (code, status) = match store {
        Status::Healthy => (StatusCode::OK, Status::Healthy),
        Status::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, Status::Unhealthy),
    };

    (
        code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            store,
        }),
    )
}

/// The process is up
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// The process can reach its store
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    match check_store(&state).await {
        Status::Healthy => StatusCode::OK,
        Status::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}
