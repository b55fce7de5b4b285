use axum::{
    body::Bytes,
    extract::{Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::services::WebhookAck;
use crate::AppState;

/// The provider appends the signature as a query parameter.
#[derive(Debug, Deserialize)]
pub struct SignatureQuery {
    pub hmac: Option<String>,
}

pub async fn provider_callback(
    State(state): State<AppState>,
    Query(query): Query<SignatureQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let ack = state.webhooks.handle(query.hmac.as_deref(), &body).await?;

    let status = match ack {
        WebhookAck::Accepted { .. } => "accepted",
        WebhookAck::Duplicate => "duplicate",
        WebhookAck::Ignored {
            merchant_order_id,
            current,
            reported,
        } => {
            tracing::info!(
                merchant_order_id = %merchant_order_id,
                current = %current,
                reported = %reported,
                "Webhook acknowledged without a state change"
            );
            "accepted"
        }
    };

    Ok(Json(json!({ "status": status })))
}
