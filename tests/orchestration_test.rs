mod common;

use mockito::Matcher;
use serde_json::json;
use uuid::Uuid;

use common::*;
use paygate_core::domain::{PreconditionError, TransactionState};
use paygate_core::ports::{StateUpdate, TransactionRepository};
use paygate_core::provider::ProviderError;
use paygate_core::services::OrchestrationError;

#[tokio::test]
async fn test_create_transaction_runs_handshake() {
    let mut server = mockito::Server::new_async().await;
    // One auth call: the token is served from cache for the payment key request
    let auth = server
        .mock("POST", "/auth/tokens")
        .match_body(Matcher::Json(json!({"api_key": "api-key"})))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"token": "bearer-1"}"#)
        .expect(1)
        .create_async()
        .await;
    let order = server
        .mock("POST", "/ecommerce/orders")
        .match_body(Matcher::PartialJson(json!({
            "auth_token": "bearer-1",
            "delivery_needed": "false",
            "amount_cents": 4999,
            "currency": "EGP",
            "items": []
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "id": PROVIDER_ORDER_ID }).to_string())
        .expect(1)
        .create_async()
        .await;
    let payment_key = server
        .mock("POST", "/acceptance/payment_keys")
        .match_body(Matcher::PartialJson(json!({
            "amount_cents": 4999,
            "currency": "EGP",
            "order_id": PROVIDER_ORDER_ID.to_string(),
            "integration_id": "4097558",
            "billing_data": {
                "email": "buyer@example.com",
                "country": "EG",
                "floor": "NA",
                "apartment": "NA",
                "shipping_method": "PKG"
            }
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(json!({ "token": PAYMENT_TOKEN }).to_string())
        .expect(1)
        .create_async()
        .await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("EG"));

    let tx = h
        .orchestration
        .create_transaction(customer_id, "49.99".parse().unwrap())
        .await
        .unwrap();

    assert!(is_merchant_order_id(&tx.merchant_order_id), "{}", tx.merchant_order_id);
    assert_eq!(tx.state, TransactionState::Pending);
    assert_eq!(tx.amount, "49.99".parse().unwrap());
    assert_eq!(tx.provider_order_id.as_deref(), Some("217503754"));
    assert_eq!(tx.payment_token.as_deref(), Some(PAYMENT_TOKEN));
    assert!(tx.awaiting_payment());

    let stored = h.ledger.get_by_id(tx.id).await.unwrap();
    assert_eq!(stored.provider_order_id, tx.provider_order_id);
    assert!(h.notifier.scheduled().is_empty());

    auth.assert_async().await;
    order.assert_async().await;
    payment_key.assert_async().await;
}

#[tokio::test]
async fn test_missing_primary_address_fails_before_provider_call() {
    let mut server = mockito::Server::new_async().await;
    let auth = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, None);

    let err = h
        .orchestration
        .create_transaction(customer_id, "49.99".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::Precondition(PreconditionError::NoPrimaryAddress(id)) if id == customer_id
    ));
    auth.assert_async().await;

    // The pending row is kept as it was
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn test_unsupported_country_is_precondition_error() {
    let mut server = mockito::Server::new_async().await;
    let any = server
        .mock("POST", Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("US"));

    let err = h
        .orchestration
        .create_transaction(customer_id, "10.00".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::Precondition(PreconditionError::UnsupportedCountry(ref c)) if c == "US"
    ));
    any.assert_async().await;
}

#[tokio::test]
async fn test_provider_error_marks_transaction_failed() {
    let mut server = mockito::Server::new_async().await;
    let _auth = mock_auth(&mut server).await;
    let _order = server
        .mock("POST", "/ecommerce/orders")
        .with_status(500)
        .create_async()
        .await;
    let payment_key = server
        .mock("POST", "/acceptance/payment_keys")
        .expect(0)
        .create_async()
        .await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("EG"));

    let err = h
        .orchestration
        .create_transaction(customer_id, "49.99".parse().unwrap())
        .await
        .unwrap_err();

    let merchant_order_id = match err {
        OrchestrationError::Provider {
            merchant_order_id,
            source: ProviderError::Status { status: 500, .. },
        } => merchant_order_id,
        other => panic!("expected a provider status error, got {:?}", other),
    };

    let stored = h
        .ledger
        .find_by_merchant_order_id(&merchant_order_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, TransactionState::Failed);
    assert!(stored.provider_order_id.is_none());
    payment_key.assert_async().await;
}

#[tokio::test]
async fn test_missing_payment_token_marks_transaction_failed() {
    let mut server = mockito::Server::new_async().await;
    let _auth = mock_auth(&mut server).await;
    let _order = mock_order(&mut server).await;
    let _payment_key = server
        .mock("POST", "/acceptance/payment_keys")
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(r#"{"detail": "integration not found"}"#)
        .create_async()
        .await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("AE"));

    let err = h
        .orchestration
        .create_transaction(customer_id, "120".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::Provider {
            source: ProviderError::MissingField { field: "token", .. },
            ..
        }
    ));
    assert_eq!(h.ledger.len(), 1);
}

#[tokio::test]
async fn test_invalid_amount_is_rejected_without_a_row() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("EG"));

    for amount in ["0", "-5.00", "0.001", "10000000000.00", "100000000000.00", "1e30"] {
        let err = h
            .orchestration
            .create_transaction(customer_id, amount.parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestrationError::InvalidAmount(_)), "{}", amount);
    }
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_unknown_customer_is_rejected_without_a_row() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url());
    let missing = Uuid::new_v4();

    let err = h
        .orchestration
        .create_transaction(missing, "49.99".parse().unwrap())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::Precondition(PreconditionError::CustomerNotFound(id)) if id == missing
    ));
    assert!(h.ledger.is_empty());
}

#[tokio::test]
async fn test_reconcile_without_provider_id_uses_inquiry() {
    let mut server = mockito::Server::new_async().await;
    let _auth = mock_auth(&mut server).await;
    let _order = mock_order(&mut server).await;
    let _payment_key = mock_payment_key(&mut server).await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("EG"));
    let tx = h
        .orchestration
        .create_transaction(customer_id, "49.99".parse().unwrap())
        .await
        .unwrap();

    let inquiry = server
        .mock("POST", "/ecommerce/orders/transaction_inquiry")
        .match_body(Matcher::PartialJson(json!({
            "merchant_order_id": tx.merchant_order_id
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": 192036465,
                "success": true,
                "pending": false,
                "is_refunded": false,
                "is_voided": false,
                "is_capture": true,
                "is_auth": false,
                "is_standalone_payment": false,
                "error_occured": false
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let reconciled = h.orchestration.reconcile(tx.id).await.unwrap();
    assert_eq!(reconciled.state, TransactionState::Succeeded);
    assert_eq!(reconciled.provider_transaction_id.as_deref(), Some("192036465"));
    assert_eq!(h.notifier.scheduled(), vec![tx.id]);
    inquiry.assert_async().await;
}

#[tokio::test]
async fn test_reconcile_with_provider_id_fetches_status() {
    let mut server = mockito::Server::new_async().await;
    let _auth = mock_auth(&mut server).await;

    let h = harness(&server.url());
    let customer_id = seed_customer(&h.customers, Some("EG"));
    let tx = h
        .ledger
        .insert(&paygate_core::domain::Transaction::new(
            customer_id,
            "49.99".parse().unwrap(),
        ))
        .await
        .unwrap();
    h.ledger
        .apply_provider_state(StateUpdate {
            merchant_order_id: &tx.merchant_order_id,
            provider_transaction_id: "9001",
            state: TransactionState::Authorized,
            event_id: None,
        })
        .await
        .unwrap();

    let lookup = server
        .mock("GET", "/acceptance/transactions/9001")
        .match_header("authorization", "Bearer bearer-1")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": 9001,
                "success": true,
                "pending": false,
                "is_refunded": true,
                "is_voided": false,
                "is_capture": false,
                "is_auth": false,
                "is_standalone_payment": true,
                "error_occured": false
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let reconciled = h.orchestration.reconcile(tx.id).await.unwrap();
    assert_eq!(reconciled.state, TransactionState::Refunded);
    assert_eq!(h.notifier.scheduled().len(), 1);
    lookup.assert_async().await;
}

#[tokio::test]
async fn test_reconcile_unknown_transaction_is_not_found() {
    let server = mockito::Server::new_async().await;
    let h = harness(&server.url());

    let err = h.orchestration.reconcile(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        OrchestrationError::Repository(paygate_core::ports::RepositoryError::NotFound(_))
    ));
}
