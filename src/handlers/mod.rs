pub mod transactions;
pub mod webhook;

use crate::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub db: String,
    pub provider_circuit: String,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match state.ledger.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!("Health check could not reach the ledger: {}", e);
            "disconnected"
        }
    };

    let health_response = HealthStatus {
        status: if db_status == "connected" {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        db: db_status.to_string(),
        provider_circuit: state.orchestration.provider_circuit_state(),
    };

    // Return 503 if the ledger is down, 200 otherwise
    let status_code = if db_status == "connected" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health_response))
}
