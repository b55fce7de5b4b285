#![allow(dead_code)]

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha512;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use paygate_core::adapters::{InMemoryCustomerDirectory, InMemoryLedger};
use paygate_core::config::ProviderConfig;
use paygate_core::domain::{Address, Customer, TransactionFlags, WebhookPayload};
use paygate_core::ports::TransactionNotifier;
use paygate_core::provider::{InMemoryTokenCache, ProviderClient};
use paygate_core::services::{OrchestrationService, WebhookService};

pub const HMAC_SECRET: &str = "test-hmac-secret";
pub const PROVIDER_ORDER_ID: i64 = 217503754;
pub const PAYMENT_TOKEN: &str = "pay-token-xyz";

/// Notifier that only records what was scheduled.
#[derive(Default)]
pub struct RecordingNotifier {
    scheduled: Mutex<Vec<Uuid>>,
}

impl RecordingNotifier {
    pub fn scheduled(&self) -> Vec<Uuid> {
        self.scheduled.lock().unwrap().clone()
    }
}

impl TransactionNotifier for RecordingNotifier {
    fn schedule_transaction_state_notification(&self, transaction_id: Uuid) {
        self.scheduled.lock().unwrap().push(transaction_id);
    }
}

pub fn provider_config(base_url: &str) -> ProviderConfig {
    ProviderConfig {
        base_url: base_url.to_string(),
        api_key: "api-key".to_string(),
        integration_id: "4097558".to_string(),
        hmac_secret: HMAC_SECRET.to_string(),
        timeout: Duration::from_secs(5),
        auth_token_ttl: Duration::from_secs(3000),
        circuit_breaker_threshold: 5,
    }
}

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub customers: Arc<InMemoryCustomerDirectory>,
    pub notifier: Arc<RecordingNotifier>,
    pub orchestration: Arc<OrchestrationService>,
    pub webhooks: Arc<WebhookService>,
}

pub fn harness(base_url: &str) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let customers = Arc::new(InMemoryCustomerDirectory::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let provider = ProviderClient::new(
        provider_config(base_url),
        Arc::new(InMemoryTokenCache::new()),
    );
    let orchestration = Arc::new(OrchestrationService::new(
        ledger.clone(),
        customers.clone(),
        provider,
        notifier.clone(),
    ));
    let webhooks = Arc::new(WebhookService::new(
        ledger.clone(),
        orchestration.clone(),
        HMAC_SECRET.to_string(),
    ));

    Harness {
        ledger,
        customers,
        notifier,
        orchestration,
        webhooks,
    }
}

/// Adds a customer, with a primary address in `country` when given.
pub fn seed_customer(customers: &InMemoryCustomerDirectory, country: Option<&str>) -> Uuid {
    let id = Uuid::new_v4();
    customers.add_customer(Customer {
        id,
        email: Some("buyer@example.com".to_string()),
        first_name: Some("Nour".to_string()),
        last_name: Some("Hassan".to_string()),
        phone_number: Some("+201000000000".to_string()),
    });

    if let Some(country) = country {
        customers.add_address(Address {
            id: Uuid::new_v4(),
            customer_id: id,
            country: country.to_string(),
            line: Some("12 Tahrir St".to_string()),
            city: Some("Cairo".to_string()),
            state: None,
            postal_code: Some("11511".to_string()),
            building_number: Some("12".to_string()),
            apartment_number: None,
            is_primary: true,
        });
    }

    id
}

pub async fn mock_auth(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/auth/tokens")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "bearer-1"}"#)
        .create_async()
        .await
}

pub async fn mock_order(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/ecommerce/orders")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": PROVIDER_ORDER_ID }).to_string())
        .create_async()
        .await
}

pub async fn mock_payment_key(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/acceptance/payment_keys")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "token": PAYMENT_TOKEN }).to_string())
        .create_async()
        .await
}

pub fn flags_captured() -> TransactionFlags {
    TransactionFlags {
        success: true,
        is_capture: true,
        ..Default::default()
    }
}

pub fn flags_authorized() -> TransactionFlags {
    TransactionFlags {
        success: true,
        is_auth: true,
        ..Default::default()
    }
}

pub fn flags_errored() -> TransactionFlags {
    TransactionFlags {
        error_occured: true,
        ..Default::default()
    }
}

pub fn flags_refunded() -> TransactionFlags {
    TransactionFlags {
        success: true,
        is_refunded: true,
        ..Default::default()
    }
}

/// A provider transaction callback in the shape the provider posts it.
pub fn callback_body(merchant_order_id: &str, provider_tx_id: i64, flags: TransactionFlags) -> Value {
    json!({
        "type": "TRANSACTION",
        "obj": {
            "id": provider_tx_id,
            "pending": flags.pending,
            "amount_cents": 4999,
            "success": flags.success,
            "is_auth": flags.is_auth,
            "is_capture": flags.is_capture,
            "is_standalone_payment": flags.is_standalone_payment,
            "is_voided": flags.is_voided,
            "is_refunded": flags.is_refunded,
            "is_3d_secure": true,
            "integration_id": 4097558,
            "has_parent_transaction": false,
            "order": {"id": PROVIDER_ORDER_ID, "merchant_order_id": merchant_order_id},
            "created_at": "2024-06-13T11:33:44.592345",
            "currency": "EGP",
            "error_occured": flags.error_occured,
            "owner": 1664444,
            "source_data": {"pan": "2346", "type": "card", "sub_type": "MasterCard"},
            "data": {"message": "Approved", "acq_response_code": "00"}
        }
    })
}

/// Signs `body` the way the provider does: HMAC-SHA512 over the canonical
/// field concatenation, hex encoded.
pub fn sign(body: &Value) -> String {
    let payload = WebhookPayload::parse(body.to_string().as_bytes()).unwrap();
    let canonical = payload.callback.canonical_string().unwrap();

    let mut mac = Hmac::<Sha512>::new_from_slice(HMAC_SECRET.as_bytes()).unwrap();
    mac.update(canonical.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub fn is_merchant_order_id(value: &str) -> bool {
    value.len() == 10
        && value.starts_with("ORD-")
        && value[4..]
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}
