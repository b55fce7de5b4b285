//! Typed view of the provider's transaction callback.
//!
//! Parsing is two-staged: [`WebhookPayload::parse`] only insists on the fields
//! needed to route the event (transaction id and merchant order id), so that a
//! malformed body is reported as such. Signed fields stay optional until
//! [`TransactionCallback::canonical_string`] is asked for them, where a missing
//! field is a verification failure rather than a default.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Provider identifiers arrive as JSON numbers or strings depending on the endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderId {
    Number(i64),
    Text(String),
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderId::Number(n) => write!(f, "{}", n),
            ProviderId::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome flags reported by the provider for one transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFlags {
    pub success: bool,
    pub pending: bool,
    pub is_refunded: bool,
    pub is_voided: bool,
    pub is_capture: bool,
    pub is_auth: bool,
    pub is_standalone_payment: bool,
    pub error_occured: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackOrder {
    pub id: Option<ProviderId>,
    pub merchant_order_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceData {
    pub pan: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub sub_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackData {
    pub message: Option<String>,
    pub acq_response_code: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionCallback {
    pub id: Option<ProviderId>,
    pub success: Option<bool>,
    pub pending: Option<bool>,
    pub is_refunded: Option<bool>,
    pub is_voided: Option<bool>,
    pub is_capture: Option<bool>,
    pub is_auth: Option<bool>,
    pub is_standalone_payment: Option<bool>,
    pub error_occured: Option<bool>,
    pub is_3d_secure: Option<bool>,
    pub has_parent_transaction: Option<bool>,
    pub amount_cents: Option<i64>,
    pub currency: Option<String>,
    pub created_at: Option<String>,
    pub order: Option<CallbackOrder>,
    pub owner: Option<ProviderId>,
    pub integration_id: Option<ProviderId>,
    pub source_data: Option<SourceData>,
    pub data: Option<CallbackData>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    obj: Option<TransactionCallback>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("malformed webhook payload: {0}")]
    Malformed(String),

    #[error("signed field '{0}' is missing")]
    MissingSignedField(&'static str),
}

/// A callback that passed structural validation.
#[derive(Debug, Clone)]
pub struct WebhookPayload {
    pub provider_transaction_id: String,
    pub merchant_order_id: String,
    pub callback: TransactionCallback,
}

impl WebhookPayload {
    pub fn parse(body: &[u8]) -> Result<Self, PayloadError> {
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))?;
        let callback = envelope
            .obj
            .ok_or_else(|| PayloadError::Malformed("missing 'obj'".to_string()))?;

        let provider_transaction_id = callback
            .id
            .as_ref()
            .map(ToString::to_string)
            .ok_or_else(|| PayloadError::Malformed("missing 'obj.id'".to_string()))?;

        let merchant_order_id = callback
            .order
            .as_ref()
            .and_then(|o| o.merchant_order_id.clone())
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                PayloadError::Malformed("missing 'obj.order.merchant_order_id'".to_string())
            })?;

        Ok(Self {
            provider_transaction_id,
            merchant_order_id,
            callback,
        })
    }

    /// Dedupe key for this delivery. A redelivery repeats both the transaction
    /// id and the signature; a later status change for the same provider
    /// transaction is signed differently and therefore counts as a new event.
    pub fn event_id(&self, signature: &str) -> String {
        format!(
            "{}:{}",
            self.provider_transaction_id,
            signature.trim().to_ascii_lowercase()
        )
    }
}

fn flag(value: Option<bool>, name: &'static str) -> Result<&'static str, PayloadError> {
    match value {
        Some(true) => Ok("true"),
        Some(false) => Ok("false"),
        None => Err(PayloadError::MissingSignedField(name)),
    }
}

fn text<T: ToString>(value: Option<&T>, name: &'static str) -> Result<String, PayloadError> {
    value
        .map(ToString::to_string)
        .ok_or(PayloadError::MissingSignedField(name))
}

impl TransactionCallback {
    /// Concatenation of the signed fields in the provider's documented order,
    /// with no separators.
    pub fn canonical_string(&self) -> Result<String, PayloadError> {
        let order = self.order.as_ref();
        let source = self.source_data.as_ref();

        let parts = [
            text(self.amount_cents.as_ref(), "amount_cents")?,
            text(self.created_at.as_ref(), "created_at")?,
            text(self.currency.as_ref(), "currency")?,
            flag(self.error_occured, "error_occured")?.to_string(),
            flag(self.has_parent_transaction, "has_parent_transaction")?.to_string(),
            text(self.id.as_ref(), "id")?,
            text(self.integration_id.as_ref(), "integration_id")?,
            flag(self.is_3d_secure, "is_3d_secure")?.to_string(),
            flag(self.is_auth, "is_auth")?.to_string(),
            flag(self.is_capture, "is_capture")?.to_string(),
            flag(self.is_refunded, "is_refunded")?.to_string(),
            flag(self.is_standalone_payment, "is_standalone_payment")?.to_string(),
            flag(self.is_voided, "is_voided")?.to_string(),
            text(order.and_then(|o| o.id.as_ref()), "order.id")?,
            text(self.owner.as_ref(), "owner")?,
            flag(self.pending, "pending")?.to_string(),
            text(source.and_then(|s| s.pan.as_ref()), "source_data.pan")?,
            text(source.and_then(|s| s.sub_type.as_ref()), "source_data.sub_type")?,
            text(source.and_then(|s| s.kind.as_ref()), "source_data.type")?,
            flag(self.success, "success")?.to_string(),
        ];

        Ok(parts.concat())
    }

    pub fn flags(&self) -> Result<TransactionFlags, PayloadError> {
        let require = |value: Option<bool>, name: &'static str| {
            value.ok_or(PayloadError::MissingSignedField(name))
        };

        Ok(TransactionFlags {
            success: require(self.success, "success")?,
            pending: require(self.pending, "pending")?,
            is_refunded: require(self.is_refunded, "is_refunded")?,
            is_voided: require(self.is_voided, "is_voided")?,
            is_capture: require(self.is_capture, "is_capture")?,
            is_auth: require(self.is_auth, "is_auth")?,
            is_standalone_payment: require(self.is_standalone_payment, "is_standalone_payment")?,
            error_occured: require(self.error_occured, "error_occured")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body() -> serde_json::Value {
        json!({
            "type": "TRANSACTION",
            "obj": {
                "id": 192036465,
                "pending": false,
                "amount_cents": 4999,
                "success": true,
                "is_auth": false,
                "is_capture": false,
                "is_standalone_payment": true,
                "is_voided": false,
                "is_refunded": false,
                "is_3d_secure": true,
                "integration_id": 4097558,
                "has_parent_transaction": false,
                "order": {"id": 217503754, "merchant_order_id": "ORD-1A2B3C"},
                "created_at": "2024-06-13T11:33:44.592345",
                "currency": "EGP",
                "error_occured": false,
                "owner": 1664444,
                "source_data": {"pan": "2346", "type": "card", "sub_type": "MasterCard"},
                "data": {"message": "Approved", "acq_response_code": "00"}
            }
        })
    }

    #[test]
    fn test_parse_extracts_routing_fields() {
        let payload = WebhookPayload::parse(body().to_string().as_bytes()).unwrap();
        assert_eq!(payload.provider_transaction_id, "192036465");
        assert_eq!(payload.merchant_order_id, "ORD-1A2B3C");
    }

    #[test]
    fn test_parse_rejects_missing_merchant_order_id() {
        let mut value = body();
        value["obj"]["order"]
            .as_object_mut()
            .unwrap()
            .remove("merchant_order_id");
        let err = WebhookPayload::parse(value.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn test_parse_rejects_non_json() {
        let err = WebhookPayload::parse(b"hmac=abc").unwrap_err();
        assert!(matches!(err, PayloadError::Malformed(_)));
    }

    #[test]
    fn test_canonical_string_field_order() {
        let payload = WebhookPayload::parse(body().to_string().as_bytes()).unwrap();
        let canonical = payload.callback.canonical_string().unwrap();
        assert_eq!(
            canonical,
            "49992024-06-13T11:33:44.592345EGPfalsefalse1920364654097558truefalsefalsefalsetruefalse2175037541664444false2346MasterCardcardtrue"
        );
    }

    #[test]
    fn test_missing_signed_field_is_not_defaulted() {
        let mut value = body();
        value["obj"]["source_data"]
            .as_object_mut()
            .unwrap()
            .remove("pan");
        let payload = WebhookPayload::parse(value.to_string().as_bytes()).unwrap();
        assert_eq!(
            payload.callback.canonical_string().unwrap_err(),
            PayloadError::MissingSignedField("source_data.pan")
        );
    }

    #[test]
    fn test_event_id_is_stable_across_signature_case() {
        let payload = WebhookPayload::parse(body().to_string().as_bytes()).unwrap();
        assert_eq!(payload.event_id("ABCDEF"), payload.event_id("abcdef"));
        assert_ne!(payload.event_id("abcdef"), payload.event_id("abcde0"));
    }
}
