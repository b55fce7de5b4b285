use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::webhook::PayloadError;
use crate::domain::{TransactionFlags, TransactionState, WebhookPayload};
use crate::ports::{ApplyOutcome, RepositoryError, TransactionRepository};
use crate::services::orchestration::{transaction_current_state, OrchestrationService};

type HmacSha512 = Hmac<Sha512>;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    #[error("Missing webhook signature")]
    MissingSignature,

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("No transaction with merchant order id {0}")]
    UnknownTransaction(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// How an authenticated delivery was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAck {
    Accepted {
        merchant_order_id: String,
        state: TransactionState,
    },
    /// Already processed; acknowledged without side effects.
    Duplicate,
    /// Recorded, but the reported state is not reachable from the current one.
    Ignored {
        merchant_order_id: String,
        current: TransactionState,
        reported: TransactionState,
    },
}

fn verify_signature(secret: &str, message: &str, signature: &str) -> Result<(), WebhookError> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| WebhookError::SignatureVerification("signature is not hex".to_string()))?;

    let mut mac = HmacSha512::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::SignatureVerification(e.to_string()))?;
    mac.update(message.as_bytes());

    // Constant-time comparison
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::SignatureVerification("signature mismatch".to_string()))
}

/// Authenticates provider callbacks and hands them to the orchestration service.
pub struct WebhookService {
    ledger: Arc<dyn TransactionRepository>,
    orchestration: Arc<OrchestrationService>,
    hmac_secret: String,
}

impl WebhookService {
    pub fn new(
        ledger: Arc<dyn TransactionRepository>,
        orchestration: Arc<OrchestrationService>,
        hmac_secret: String,
    ) -> Self {
        Self {
            ledger,
            orchestration,
            hmac_secret,
        }
    }

    /// Verifies the signature over the canonical string. A signed field that
    /// is absent fails verification instead of being defaulted.
    fn authenticate(
        &self,
        payload: &WebhookPayload,
        signature: &str,
    ) -> Result<TransactionFlags, WebhookError> {
        let unsigned = |e: PayloadError| WebhookError::SignatureVerification(e.to_string());
        let canonical = payload.callback.canonical_string().map_err(unsigned)?;
        verify_signature(&self.hmac_secret, &canonical, signature)?;
        payload.callback.flags().map_err(unsigned)
    }

    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, WebhookError> {
        let payload = WebhookPayload::parse(body).map_err(|e| {
            tracing::warn!("Rejecting webhook: {}", e);
            WebhookError::MalformedPayload(e.to_string())
        })?;

        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                tracing::warn!(
                    merchant_order_id = %payload.merchant_order_id,
                    "Webhook delivered without a signature"
                );
                WebhookError::MissingSignature
            })?;

        let event_id = payload.event_id(signature);
        if self.ledger.webhook_event_exists(&event_id).await? {
            tracing::info!(event_id = %event_id, "Duplicate webhook delivery acknowledged");
            return Ok(WebhookAck::Duplicate);
        }

        let callback = &payload.callback;
        let flags = self.authenticate(&payload, signature).map_err(|e| {
            tracing::warn!(
                merchant_order_id = %payload.merchant_order_id,
                provider_transaction_id = %payload.provider_transaction_id,
                "Webhook signature verification failed: {}",
                e
            );
            e
        })?;

        if let Some(data) = &callback.data {
            tracing::info!(
                merchant_order_id = %payload.merchant_order_id,
                message = data.message.as_deref().unwrap_or(""),
                acq_response_code = %data
                    .acq_response_code
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default(),
                "Provider callback received"
            );
        }

        let reported = transaction_current_state(&flags);
        let outcome = self
            .orchestration
            .update_and_notify(
                &payload.merchant_order_id,
                &payload.provider_transaction_id,
                &flags,
                Some(&event_id),
            )
            .await?;

        match outcome {
            ApplyOutcome::Applied(tx) => Ok(WebhookAck::Accepted {
                merchant_order_id: tx.merchant_order_id,
                state: tx.state,
            }),
            ApplyOutcome::Duplicate => {
                tracing::info!(event_id = %event_id, "Concurrent duplicate webhook delivery");
                Ok(WebhookAck::Duplicate)
            }
            ApplyOutcome::Rejected(tx) => Ok(WebhookAck::Ignored {
                merchant_order_id: tx.merchant_order_id,
                current: tx.state,
                reported,
            }),
            ApplyOutcome::UnknownTransaction => {
                tracing::error!(
                    merchant_order_id = %payload.merchant_order_id,
                    provider_transaction_id = %payload.provider_transaction_id,
                    "Webhook references an unknown transaction"
                );
                Err(WebhookError::UnknownTransaction(payload.merchant_order_id))
            }
        }
    }
}
