use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::domain::PreconditionError;
use crate::ports::RepositoryError;
use crate::services::{OrchestrationError, WebhookError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Precondition failed: {0}")]
    Precondition(#[from] PreconditionError),

    #[error("Payment provider error: {0}")]
    Provider(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Precondition(_) => StatusCode::BAD_REQUEST,
            AppError::Provider(_) => StatusCode::BAD_GATEWAY,
            AppError::SignatureVerification(_)
            | AppError::UnknownTransaction(_)
            | AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::Conflict(msg) => AppError::Conflict(msg),
            RepositoryError::Database(msg) => AppError::Database(msg),
        }
    }
}

impl From<OrchestrationError> for AppError {
    fn from(err: OrchestrationError) -> Self {
        match err {
            OrchestrationError::InvalidAmount(msg) => AppError::Validation(msg),
            OrchestrationError::Precondition(e) => AppError::Precondition(e),
            e @ OrchestrationError::Provider { .. } => AppError::Provider(e.to_string()),
            OrchestrationError::Repository(e) => e.into(),
        }
    }
}

impl From<WebhookError> for AppError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MalformedPayload(msg) => AppError::MalformedPayload(msg),
            e @ WebhookError::MissingSignature => AppError::SignatureVerification(e.to_string()),
            WebhookError::SignatureVerification(msg) => AppError::SignatureVerification(msg),
            WebhookError::UnknownTransaction(id) => AppError::UnknownTransaction(id),
            WebhookError::Repository(e) => e.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        }
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
