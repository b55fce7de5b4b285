//! Storage and side-effect boundaries used by the services.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{BillingProfile, Customer, PreconditionError, Transaction, TransactionState};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                RepositoryError::Conflict(db.message().to_string())
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some(FOREIGN_KEY_VIOLATION) => {
                RepositoryError::NotFound(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

/// A provider-reported state to apply to the row owning `merchant_order_id`.
#[derive(Debug, Clone)]
pub struct StateUpdate<'a> {
    pub merchant_order_id: &'a str,
    pub provider_transaction_id: &'a str,
    pub state: TransactionState,
    /// Dedupe key, recorded in the same atomic unit as the state change.
    /// `None` for polling reconciliation, which has no delivery to dedupe.
    pub event_id: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub enum ApplyOutcome {
    /// State written and committed.
    Applied(Transaction),
    /// The event id was already recorded; nothing was written.
    Duplicate,
    /// The state machine forbids the move. The event is recorded, the row is unchanged.
    Rejected(Transaction),
    /// No row carries this merchant order id. Nothing was recorded.
    UnknownTransaction,
}

/// The transaction ledger. Every mutating method re-reads the row under an
/// exclusive lock and writes within that same lock.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction>;

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: &str,
    ) -> RepositoryResult<Option<Transaction>>;

    async fn apply_provider_handshake(
        &self,
        id: Uuid,
        provider_order_id: &str,
        payment_token: &str,
    ) -> RepositoryResult<Transaction>;

    async fn apply_provider_failure(&self, id: Uuid) -> RepositoryResult<Transaction>;

    async fn apply_provider_state(&self, update: StateUpdate<'_>) -> RepositoryResult<ApplyOutcome>;

    async fn webhook_event_exists(&self, event_id: &str) -> RepositoryResult<bool>;

    async fn ping(&self) -> RepositoryResult<()>;
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Read-only access to customers and their addresses.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn get_customer(&self, id: Uuid) -> RepositoryResult<Customer>;

    async fn primary_address_and_currency(
        &self,
        customer_id: Uuid,
    ) -> Result<BillingProfile, DirectoryError>;
}

/// One-way hand-off of a committed state change to the mail pipeline.
pub trait TransactionNotifier: Send + Sync {
    fn schedule_transaction_state_notification(&self, transaction_id: Uuid);
}
