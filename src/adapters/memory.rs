//! In-process ledger and customer directory.
//!
//! Each transaction sits behind its own `tokio::sync::Mutex`, which plays the
//! role of the row lock: every mutation takes the record's mutex, works on
//! the current value and releases on return.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{Address, BillingProfile, Customer, PreconditionError, Transaction};
use crate::ports::{
    ApplyOutcome, CustomerDirectory, DirectoryError, RepositoryError, RepositoryResult,
    StateUpdate, TransactionRepository,
};

type Record = Arc<Mutex<Transaction>>;

#[derive(Default)]
pub struct InMemoryLedger {
    rows: RwLock<HashMap<Uuid, Record>>,
    by_merchant_order_id: RwLock<HashMap<String, Uuid>>,
    events: StdMutex<HashSet<String>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, id: Uuid) -> RepositoryResult<Record> {
        self.rows
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    fn record_id_for(&self, merchant_order_id: &str) -> RepositoryResult<Option<Uuid>> {
        Ok(self
            .by_merchant_order_id
            .read()
            .map_err(|_| poisoned())?
            .get(merchant_order_id)
            .copied())
    }

    /// Serializes `mutate` with every other writer of the same record.
    pub async fn with_exclusive_lock<F, R>(&self, id: Uuid, mutate: F) -> RepositoryResult<R>
    where
        F: FnOnce(&mut Transaction) -> R,
    {
        let record = self.record(id)?;
        let mut guard = record.lock().await;
        Ok(mutate(&mut *guard))
    }

    pub fn processed_event_count(&self) -> usize {
        self.events.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Database("in-memory store lock poisoned".to_string())
}

#[async_trait]
impl TransactionRepository for InMemoryLedger {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let mut by_merchant = self.by_merchant_order_id.write().map_err(|_| poisoned())?;
        let mut rows = self.rows.write().map_err(|_| poisoned())?;

        if by_merchant.contains_key(&tx.merchant_order_id) {
            return Err(RepositoryError::Conflict(format!(
                "merchant_order_id {} already exists",
                tx.merchant_order_id
            )));
        }
        if rows.contains_key(&tx.id) {
            return Err(RepositoryError::Conflict(format!("transaction {} already exists", tx.id)));
        }

        by_merchant.insert(tx.merchant_order_id.clone(), tx.id);
        rows.insert(tx.id, Arc::new(Mutex::new(tx.clone())));
        Ok(tx.clone())
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let record = self.record(id)?;
        let row = record.lock().await.clone();
        Ok(row)
    }

    async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        match self.record_id_for(merchant_order_id)? {
            Some(id) => self.get_by_id(id).await.map(Some),
            None => Ok(None),
        }
    }

    async fn apply_provider_handshake(
        &self,
        id: Uuid,
        provider_order_id: &str,
        payment_token: &str,
    ) -> RepositoryResult<Transaction> {
        self.with_exclusive_lock(id, |tx| {
            tx.record_handshake(provider_order_id.to_string(), payment_token.to_string());
            tx.clone()
        })
        .await
    }

    async fn apply_provider_failure(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.with_exclusive_lock(id, |tx| {
            tx.record_handshake_failure();
            tx.clone()
        })
        .await
    }

    async fn apply_provider_state(&self, update: StateUpdate<'_>) -> RepositoryResult<ApplyOutcome> {
        let Some(id) = self.record_id_for(update.merchant_order_id)? else {
            return Ok(ApplyOutcome::UnknownTransaction);
        };

        let record = self.record(id)?;
        let mut row = record.lock().await;

        if let Some(event_id) = update.event_id {
            let mut events = self.events.lock().map_err(|_| poisoned())?;
            if !events.insert(event_id.to_string()) {
                return Ok(ApplyOutcome::Duplicate);
            }
        }

        if row.apply_provider_state(update.state, update.provider_transaction_id) {
            Ok(ApplyOutcome::Applied(row.clone()))
        } else {
            Ok(ApplyOutcome::Rejected(row.clone()))
        }
    }

    async fn webhook_event_exists(&self, event_id: &str) -> RepositoryResult<bool> {
        Ok(self.events.lock().map_err(|_| poisoned())?.contains(event_id))
    }

    async fn ping(&self) -> RepositoryResult<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCustomerDirectory {
    customers: RwLock<HashMap<Uuid, Customer>>,
    addresses: RwLock<Vec<Address>>,
}

impl InMemoryCustomerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer: Customer) {
        if let Ok(mut customers) = self.customers.write() {
            customers.insert(customer.id, customer);
        }
    }

    /// Adds an address; a primary address demotes the customer's previous one.
    pub fn add_address(&self, address: Address) {
        if let Ok(mut addresses) = self.addresses.write() {
            if address.is_primary {
                addresses
                    .iter_mut()
                    .filter(|a| a.customer_id == address.customer_id)
                    .for_each(|a| a.is_primary = false);
            }
            addresses.push(address);
        }
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn get_customer(&self, id: Uuid) -> RepositoryResult<Customer> {
        self.customers
            .read()
            .map_err(|_| poisoned())?
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("customer {}", id)))
    }

    async fn primary_address_and_currency(
        &self,
        customer_id: Uuid,
    ) -> Result<BillingProfile, DirectoryError> {
        let customer = match self.get_customer(customer_id).await {
            Ok(customer) => customer,
            Err(RepositoryError::NotFound(_)) => {
                return Err(PreconditionError::CustomerNotFound(customer_id).into())
            }
            Err(e) => return Err(e.into()),
        };

        let addresses = self.addresses.read().map_err(|_| poisoned())?.clone();
        Ok(BillingProfile::resolve(customer, &addresses)?)
    }
}
