//! Transaction domain entity.
//! Framework-agnostic representation of a payment attempt and its state machine.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const MERCHANT_ORDER_ID_PREFIX: &str = "ORD-";
const MERCHANT_ORDER_ID_HEX_LEN: usize = 6;

/// Lifecycle state of a transaction as seen by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    Pending,
    Authorized,
    Succeeded,
    Failed,
    Error,
    Voided,
    Refunded,
}

impl TransactionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Pending => "pending",
            TransactionState::Authorized => "authorized",
            TransactionState::Succeeded => "succeeded",
            TransactionState::Failed => "failed",
            TransactionState::Error => "error",
            TransactionState::Voided => "voided",
            TransactionState::Refunded => "refunded",
        }
    }

    /// Whether a provider-reported outcome may move a row from `self` to `next`.
    ///
    /// FAILED stays open to provider overrides because the handshake failure is
    /// a local verdict; ERROR only yields to refund/void.
    pub fn can_transition_to(&self, next: TransactionState) -> bool {
        use TransactionState::*;

        if *self == next {
            return true;
        }

        match self {
            Pending => true,
            Failed => next != Pending,
            Authorized => matches!(next, Succeeded | Refunded | Voided | Error | Failed),
            Succeeded | Error => matches!(next, Refunded | Voided),
            Refunded | Voided => false,
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownState(pub String);

impl fmt::Display for UnknownState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transaction state '{}'", self.0)
    }
}

impl std::error::Error for UnknownState {}

impl FromStr for TransactionState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionState::Pending),
            "authorized" => Ok(TransactionState::Authorized),
            "succeeded" => Ok(TransactionState::Succeeded),
            "failed" => Ok(TransactionState::Failed),
            "error" => Ok(TransactionState::Error),
            "voided" => Ok(TransactionState::Voided),
            "refunded" => Ok(TransactionState::Refunded),
            other => Err(UnknownState(other.to_string())),
        }
    }
}

/// Domain entity representing a transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Transaction {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub merchant_order_id: String,
    pub amount: BigDecimal,
    pub state: TransactionState,
    pub provider_order_id: Option<String>,
    pub payment_token: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(customer_id: Uuid, amount: BigDecimal) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id,
            merchant_order_id: generate_merchant_order_id(),
            amount,
            state: TransactionState::Pending,
            provider_order_id: None,
            payment_token: None,
            provider_transaction_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// True once the provider handshake has stored its identifiers.
    pub fn awaiting_payment(&self) -> bool {
        self.state == TransactionState::Pending && self.provider_order_id.is_some()
    }

    /// Records the provider handshake. Identifiers are write-once and the
    /// state is left alone, so a webhook that won the race keeps its verdict.
    pub fn record_handshake(&mut self, provider_order_id: String, payment_token: String) -> bool {
        if self.provider_order_id.is_some() || self.payment_token.is_some() {
            return false;
        }
        self.provider_order_id = Some(provider_order_id);
        self.payment_token = Some(payment_token);
        self.updated_at = Utc::now();
        true
    }

    /// Marks the handshake as failed. Only a still-pending row is touched.
    pub fn record_handshake_failure(&mut self) -> bool {
        if self.state != TransactionState::Pending {
            return false;
        }
        self.state = TransactionState::Failed;
        self.updated_at = Utc::now();
        true
    }

    /// Applies a provider-reported state. Returns false when the state machine
    /// forbids the move; the row is left untouched in that case.
    pub fn apply_provider_state(
        &mut self,
        next: TransactionState,
        provider_transaction_id: &str,
    ) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.provider_transaction_id = Some(provider_transaction_id.to_string());
        self.updated_at = Utc::now();
        true
    }
}

/// `ORD-` followed by six upper-case hex digits taken from a v4 UUID.
pub fn generate_merchant_order_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!(
        "{}{}",
        MERCHANT_ORDER_ID_PREFIX,
        hex[..MERCHANT_ORDER_ID_HEX_LEN].to_uppercase()
    )
}
