use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub customer_id: Uuid,
    pub amount: BigDecimal,
}

pub async fn create_transaction(
    State(state): State<AppState>,
    Json(payload): Json<CreateTransactionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if payload.amount <= BigDecimal::from(0) {
        return Err(AppError::Validation(format!(
            "amount must be greater than zero, got {}",
            payload.amount
        )));
    }

    let tx = state
        .orchestration
        .create_transaction(payload.customer_id, payload.amount)
        .await?;

    Ok((StatusCode::CREATED, Json(tx)))
}

pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.orchestration.get_transaction(id).await?;
    Ok(Json(tx))
}

/// Pulls the provider's current view of the transaction and applies it.
pub async fn reconcile_transaction(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let tx = state.orchestration.reconcile(id).await?;
    Ok(Json(tx))
}
