use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::payloads::{AuthRequest, BillingData, OrderRequest, PaymentKeyRequest};
use super::token_cache::{TokenCache, AUTH_TOKEN_CACHE_KEY};
use crate::config::ProviderConfig;
use crate::domain::webhook::{ProviderId, TransactionFlags};
use crate::domain::BillingProfile;

const AUTH_PATH: &str = "/auth/tokens";
const ORDERS_PATH: &str = "/ecommerce/orders";
const PAYMENT_KEYS_PATH: &str = "/acceptance/payment_keys";
const TRANSACTIONS_PATH: &str = "/acceptance/transactions";
const INQUIRY_PATH: &str = "/ecommerce/orders/transaction_inquiry";

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },
    #[error("The API did not return the {field} from {endpoint}")]
    MissingField { endpoint: String, field: &'static str },
    #[error("Invalid response from provider: {0}")]
    InvalidResponse(String),
    #[error("Circuit breaker open: {0}")]
    CircuitBreakerOpen(String),
}

/// Status of one provider transaction as returned by the lookup endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTransactionStatus {
    pub id: ProviderId,
    #[serde(flatten)]
    pub flags: TransactionFlags,
}

type Breaker = StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>;

/// HTTP client for the payment provider's order / payment-key flow.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    config: ProviderConfig,
    token_cache: Arc<dyn TokenCache>,
    circuit_breaker: Breaker,
}

impl ProviderClient {
    pub fn new(config: ProviderConfig, token_cache: Arc<dyn TokenCache>) -> Self {
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();

        let backoff = backoff::equal_jittered(Duration::from_secs(30), Duration::from_secs(60));
        let policy = failure_policy::consecutive_failures(config.circuit_breaker_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        ProviderClient {
            client,
            config,
            token_cache,
            circuit_breaker,
        }
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Cached bearer token, refreshed with the static API key on a miss.
    pub async fn get_auth_token(&self) -> Result<String, ProviderError> {
        if let Some(token) = self.token_cache.get(AUTH_TOKEN_CACHE_KEY).await {
            tracing::debug!("Provider auth token served from cache");
            return Ok(token);
        }

        let payload = AuthRequest {
            api_key: &self.config.api_key,
        };
        let token = self.request_field(AUTH_PATH, &payload, "token").await?;

        self.token_cache
            .set(AUTH_TOKEN_CACHE_KEY, &token, self.config.auth_token_ttl)
            .await;
        tracing::info!("Provider auth token refreshed");

        Ok(token)
    }

    /// Registers the order and returns the provider's order id.
    pub async fn create_order(
        &self,
        merchant_order_id: &str,
        amount_cents: i64,
        billing: &BillingProfile,
    ) -> Result<String, ProviderError> {
        let token = self.get_auth_token().await?;
        let payload = OrderRequest::new(&token, merchant_order_id, amount_cents, &billing.currency);
        let order_id = self.request_field(ORDERS_PATH, &payload, "id").await?;

        tracing::info!(merchant_order_id, provider_order_id = %order_id, "Provider order created");
        Ok(order_id)
    }

    /// Requests the payment key used to render the provider's payment frame.
    pub async fn payment_key_token(
        &self,
        provider_order_id: &str,
        amount_cents: i64,
        billing: &BillingProfile,
    ) -> Result<String, ProviderError> {
        let token = self.get_auth_token().await?;
        let payload = PaymentKeyRequest {
            auth_token: &token,
            amount_cents,
            currency: &billing.currency,
            order_id: provider_order_id,
            billing_data: BillingData::from_profile(billing),
            integration_id: &self.config.integration_id,
        };
        let payment_token = self.request_field(PAYMENT_KEYS_PATH, &payload, "token").await?;

        tracing::info!(provider_order_id, "Provider payment token issued");
        Ok(payment_token)
    }

    /// Looks up a provider transaction by its id.
    pub async fn get_transaction_status(
        &self,
        provider_transaction_id: &str,
    ) -> Result<ProviderTransactionStatus, ProviderError> {
        let token = self.get_auth_token().await?;
        let url = format!("{}/{}", self.url(TRANSACTIONS_PATH), provider_transaction_id);
        let request = self.client.get(&url).bearer_auth(token);

        let body = self.send_json(TRANSACTIONS_PATH, request).await?;
        serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// Looks up the latest provider transaction for one of our merchant order ids.
    pub async fn inquire_by_merchant_order_id(
        &self,
        merchant_order_id: &str,
    ) -> Result<ProviderTransactionStatus, ProviderError> {
        let token = self.get_auth_token().await?;
        let request = self
            .client
            .post(self.url(INQUIRY_PATH))
            .json(&serde_json::json!({
                "auth_token": token,
                "merchant_order_id": merchant_order_id,
            }));

        let body = self.send_json(INQUIRY_PATH, request).await?;
        serde_json::from_value(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    /// POSTs `payload` to `path` and returns the named field of the JSON reply.
    /// Transport errors, non-2xx statuses and an absent or empty field all
    /// surface as `ProviderError`.
    async fn request_field<T: Serialize + ?Sized>(
        &self,
        path: &'static str,
        payload: &T,
        field: &'static str,
    ) -> Result<String, ProviderError> {
        let request = self.client.post(self.url(path)).json(payload);
        let body = self.send_json(path, request).await?;

        let value = match body.get(field) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };

        value.ok_or_else(|| {
            tracing::error!(endpoint = path, field, "Provider response is missing a field");
            ProviderError::MissingField {
                endpoint: path.to_string(),
                field,
            }
        })
    }

    async fn send_json(
        &self,
        path: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<serde_json::Value, ProviderError> {
        let result = self
            .circuit_breaker
            .call(async move {
                let response = request.send().await.map_err(|source| ProviderError::Request {
                    endpoint: path.to_string(),
                    source,
                })?;

                let status = response.status();
                if !status.is_success() {
                    return Err(ProviderError::Status {
                        endpoint: path.to_string(),
                        status: status.as_u16(),
                    });
                }

                response
                    .json::<serde_json::Value>()
                    .await
                    .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
            })
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(FailsafeError::Rejected) => {
                tracing::warn!(endpoint = path, "Provider circuit breaker is open");
                Err(ProviderError::CircuitBreakerOpen(
                    "Provider API circuit breaker is open".to_string(),
                ))
            }
            Err(FailsafeError::Inner(e)) => {
                tracing::error!(endpoint = path, error = %e, "Provider request failed");
                Err(e)
            }
        }
    }
}
