use bigdecimal::BigDecimal;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::transaction::generate_merchant_order_id;
use crate::domain::{PreconditionError, Transaction, TransactionFlags, TransactionState};
use crate::ports::{
    ApplyOutcome, CustomerDirectory, DirectoryError, RepositoryError, StateUpdate,
    TransactionNotifier, TransactionRepository,
};
use crate::provider::payloads::amount_to_minor_units;
use crate::provider::{ProviderClient, ProviderError};
use crate::services::unit_of_work::AfterCommit;

const MAX_INSERT_ATTEMPTS: usize = 3;

/// Largest amount the ledger column (`NUMERIC(12, 2)`) holds, in minor units.
const MAX_AMOUNT_CENTS: i64 = 999_999_999_999;

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Provider interaction failed for {merchant_order_id}: {source}")]
    Provider {
        merchant_order_id: String,
        #[source]
        source: ProviderError,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<DirectoryError> for OrchestrationError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Precondition(e) => OrchestrationError::Precondition(e),
            DirectoryError::Repository(e) => OrchestrationError::Repository(e),
        }
    }
}

/// Maps provider flags to a ledger state.
///
/// Order matters: a gateway error overrides everything, refund and void are
/// only reported after an earlier success, and a success without a capture,
/// auth or standalone marker is not a success.
pub fn transaction_current_state(flags: &TransactionFlags) -> TransactionState {
    if flags.error_occured {
        return TransactionState::Error;
    }
    if flags.is_refunded {
        return TransactionState::Refunded;
    }
    if flags.is_voided {
        return TransactionState::Voided;
    }
    if flags.pending {
        return TransactionState::Pending;
    }
    if flags.success {
        if flags.is_capture {
            return TransactionState::Succeeded;
        }
        if flags.is_auth {
            return TransactionState::Authorized;
        }
        if flags.is_standalone_payment {
            return TransactionState::Succeeded;
        }
    }
    TransactionState::Failed
}

/// Sequences ledger writes, the provider handshake and post-commit notifications.
pub struct OrchestrationService {
    ledger: Arc<dyn TransactionRepository>,
    customers: Arc<dyn CustomerDirectory>,
    provider: ProviderClient,
    notifier: Arc<dyn TransactionNotifier>,
}

impl OrchestrationService {
    pub fn new(
        ledger: Arc<dyn TransactionRepository>,
        customers: Arc<dyn CustomerDirectory>,
        provider: ProviderClient,
        notifier: Arc<dyn TransactionNotifier>,
    ) -> Self {
        Self {
            ledger,
            customers,
            provider,
            notifier,
        }
    }

    pub fn provider_circuit_state(&self) -> String {
        self.provider.circuit_state()
    }

    pub async fn get_transaction(&self, id: Uuid) -> Result<Transaction, OrchestrationError> {
        Ok(self.ledger.get_by_id(id).await?)
    }

    /// Checks the amount and the customer, inserts a PENDING row, then runs
    /// the provider handshake against the committed row. A provider failure
    /// marks the row FAILED and is returned to the caller; the row is kept.
    pub async fn create_transaction(
        &self,
        customer_id: Uuid,
        amount: BigDecimal,
    ) -> Result<Transaction, OrchestrationError> {
        let amount = amount.round(2);
        match amount_to_minor_units(&amount) {
            Some(cents) if cents <= 0 => {
                return Err(OrchestrationError::InvalidAmount(format!(
                    "{} must be a positive amount",
                    amount
                )))
            }
            Some(cents) if cents <= MAX_AMOUNT_CENTS => {}
            _ => {
                return Err(OrchestrationError::InvalidAmount(format!(
                    "{} exceeds the maximum of 9999999999.99",
                    amount
                )))
            }
        }

        match self.customers.get_customer(customer_id).await {
            Ok(_) => {}
            Err(RepositoryError::NotFound(_)) => {
                return Err(PreconditionError::CustomerNotFound(customer_id).into())
            }
            Err(e) => return Err(e.into()),
        }

        let tx = self.insert_pending(customer_id, amount).await?;
        tracing::info!(
            merchant_order_id = %tx.merchant_order_id,
            customer_id = %customer_id,
            amount = %tx.amount,
            "Transaction created"
        );

        self.provider_handshake(&tx).await
    }

    async fn insert_pending(
        &self,
        customer_id: Uuid,
        amount: BigDecimal,
    ) -> Result<Transaction, OrchestrationError> {
        let mut tx = Transaction::new(customer_id, amount);
        let mut attempt = 1;
        loop {
            match self.ledger.insert(&tx).await {
                Ok(inserted) => return Ok(inserted),
                Err(RepositoryError::Conflict(reason)) if attempt < MAX_INSERT_ATTEMPTS => {
                    tracing::warn!(
                        merchant_order_id = %tx.merchant_order_id,
                        "Merchant order id collision, regenerating: {}",
                        reason
                    );
                    tx.merchant_order_id = generate_merchant_order_id();
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn provider_handshake(&self, tx: &Transaction) -> Result<Transaction, OrchestrationError> {
        let billing = match self.customers.primary_address_and_currency(tx.customer_id).await {
            Ok(billing) => billing,
            Err(e) => {
                tracing::error!(
                    merchant_order_id = %tx.merchant_order_id,
                    "Cannot bill customer {}: {}",
                    tx.customer_id,
                    e
                );
                return Err(e.into());
            }
        };

        let amount_cents = amount_to_minor_units(&tx.amount).ok_or_else(|| {
            OrchestrationError::InvalidAmount(format!("{} is out of range", tx.amount))
        })?;

        let handshake = async {
            let order_id = self
                .provider
                .create_order(&tx.merchant_order_id, amount_cents, &billing)
                .await?;
            let payment_token = self
                .provider
                .payment_key_token(&order_id, amount_cents, &billing)
                .await?;
            Ok::<_, ProviderError>((order_id, payment_token))
        };

        match handshake.await {
            Ok((order_id, payment_token)) => {
                let updated = self
                    .ledger
                    .apply_provider_handshake(tx.id, &order_id, &payment_token)
                    .await?;
                tracing::info!(
                    merchant_order_id = %updated.merchant_order_id,
                    state = %updated.state,
                    "Transaction updated with provider fields"
                );
                Ok(updated)
            }
            Err(source) => {
                let failed = self.ledger.apply_provider_failure(tx.id).await?;
                tracing::error!(
                    merchant_order_id = %failed.merchant_order_id,
                    state = %failed.state,
                    "Transaction failed during provider interaction: {}",
                    source
                );
                Err(OrchestrationError::Provider {
                    merchant_order_id: failed.merchant_order_id,
                    source,
                })
            }
        }
    }

    /// Computes the state for `flags`, applies it under the row lock and
    /// schedules the state notification once the write has committed.
    pub async fn update_and_notify(
        &self,
        merchant_order_id: &str,
        provider_transaction_id: &str,
        flags: &TransactionFlags,
        event_id: Option<&str>,
    ) -> Result<ApplyOutcome, RepositoryError> {
        let state = transaction_current_state(flags);

        let mut after_commit = AfterCommit::<Transaction>::new();
        let notifier = self.notifier.clone();
        after_commit.on_commit(move |tx| {
            notifier.schedule_transaction_state_notification(tx.id);
        });

        let outcome = match self
            .ledger
            .apply_provider_state(StateUpdate {
                merchant_order_id,
                provider_transaction_id,
                state,
                event_id,
            })
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                after_commit.rolled_back();
                return Err(e);
            }
        };

        match &outcome {
            ApplyOutcome::Applied(tx) => {
                tracing::info!(
                    merchant_order_id,
                    provider_transaction_id,
                    state = %tx.state,
                    "Transaction state updated"
                );
                after_commit.committed(tx);
            }
            ApplyOutcome::Rejected(tx) => {
                tracing::warn!(
                    merchant_order_id,
                    provider_transaction_id,
                    "Ignoring provider state {}: transaction is already {}",
                    state,
                    tx.state
                );
                after_commit.rolled_back();
            }
            ApplyOutcome::Duplicate | ApplyOutcome::UnknownTransaction => {
                after_commit.rolled_back();
            }
        }

        Ok(outcome)
    }

    /// Polls the provider for the transaction's current status and applies it.
    pub async fn reconcile(&self, id: Uuid) -> Result<Transaction, OrchestrationError> {
        let tx = self.ledger.get_by_id(id).await?;

        let lookup = match &tx.provider_transaction_id {
            Some(provider_transaction_id) => {
                self.provider
                    .get_transaction_status(provider_transaction_id)
                    .await
            }
            None => {
                self.provider
                    .inquire_by_merchant_order_id(&tx.merchant_order_id)
                    .await
            }
        };
        let status = lookup.map_err(|source| OrchestrationError::Provider {
            merchant_order_id: tx.merchant_order_id.clone(),
            source,
        })?;

        let provider_transaction_id = status.id.to_string();
        let outcome = self
            .update_and_notify(
                &tx.merchant_order_id,
                &provider_transaction_id,
                &status.flags,
                None,
            )
            .await?;

        match outcome {
            ApplyOutcome::Applied(tx) | ApplyOutcome::Rejected(tx) => Ok(tx),
            ApplyOutcome::Duplicate | ApplyOutcome::UnknownTransaction => {
                Ok(self.ledger.get_by_id(id).await?)
            }
        }
    }
}
