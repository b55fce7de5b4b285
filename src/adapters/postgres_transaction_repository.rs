//! Postgres implementation of TransactionRepository.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use uuid::Uuid;

use crate::domain::{Transaction, TransactionState};
use crate::ports::{
    ApplyOutcome, RepositoryError, RepositoryResult, StateUpdate, TransactionRepository,
};

const SELECT_COLUMNS: &str = r#"
    id, customer_id, merchant_order_id, amount, state,
    provider_order_id, payment_token, provider_transaction_id,
    created_at, updated_at
"#;

/// Postgres-backed transaction ledger.
#[derive(Clone)]
pub struct PostgresTransactionRepository {
    pool: PgPool,
}

enum LockKey<'a> {
    Id(Uuid),
    MerchantOrderId(&'a str),
}

impl PostgresTransactionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `SELECT ... FOR UPDATE` on one row. The lock is held until the
    /// surrounding transaction commits or rolls back.
    async fn lock_row(
        executor: &mut SqlxTransaction<'_, Postgres>,
        key: LockKey<'_>,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = match key {
            LockKey::Id(id) => {
                sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {} FROM transactions WHERE id = $1 FOR UPDATE",
                    SELECT_COLUMNS
                ))
                .bind(id)
                .fetch_optional(&mut **executor)
                .await?
            }
            LockKey::MerchantOrderId(merchant_order_id) => {
                sqlx::query_as::<_, TransactionRow>(&format!(
                    "SELECT {} FROM transactions WHERE merchant_order_id = $1 FOR UPDATE",
                    SELECT_COLUMNS
                ))
                .bind(merchant_order_id)
                .fetch_optional(&mut **executor)
                .await?
            }
        };

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn persist(
        executor: &mut SqlxTransaction<'_, Postgres>,
        tx: &Transaction,
    ) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE transactions
            SET state = $2, provider_order_id = $3, payment_token = $4,
                provider_transaction_id = $5, updated_at = $6
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(tx.id)
        .bind(tx.state.as_str())
        .bind(&tx.provider_order_id)
        .bind(&tx.payment_token)
        .bind(&tx.provider_transaction_id)
        .bind(tx.updated_at)
        .fetch_one(&mut **executor)
        .await?;

        row.into_domain()
    }

    /// Runs `mutate` against the freshly locked row and writes it back only
    /// when `mutate` reports a change.
    pub async fn with_exclusive_lock<F>(&self, id: Uuid, mutate: F) -> RepositoryResult<Transaction>
    where
        F: FnOnce(&mut Transaction) -> bool + Send,
    {
        let mut db_tx = self.pool.begin().await?;

        let mut row = Self::lock_row(&mut db_tx, LockKey::Id(id))
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))?;

        let row = if mutate(&mut row) {
            Self::persist(&mut db_tx, &row).await?
        } else {
            row
        };

        db_tx.commit().await?;
        Ok(row)
    }
}

#[async_trait]
impl TransactionRepository for PostgresTransactionRepository {
    async fn insert(&self, tx: &Transaction) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO transactions (
                id, customer_id, merchant_order_id, amount, state,
                provider_order_id, payment_token, provider_transaction_id,
                created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(tx.id)
        .bind(tx.customer_id)
        .bind(&tx.merchant_order_id)
        .bind(&tx.amount)
        .bind(tx.state.as_str())
        .bind(&tx.provider_order_id)
        .bind(&tx.payment_token)
        .bind(&tx.provider_transaction_id)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .fetch_one(&self.pool)
        .await?;

        row.into_domain()
    }

    async fn get_by_id(&self, id: Uuid) -> RepositoryResult<Transaction> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE id = $1",
            SELECT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", id)))
    }

    async fn find_by_merchant_order_id(
        &self,
        merchant_order_id: &str,
    ) -> RepositoryResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM transactions WHERE merchant_order_id = $1",
            SELECT_COLUMNS
        ))
        .bind(merchant_order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn apply_provider_handshake(
        &self,
        id: Uuid,
        provider_order_id: &str,
        payment_token: &str,
    ) -> RepositoryResult<Transaction> {
        let provider_order_id = provider_order_id.to_string();
        let payment_token = payment_token.to_string();
        self.with_exclusive_lock(id, move |tx| {
            tx.record_handshake(provider_order_id, payment_token)
        })
        .await
    }

    async fn apply_provider_failure(&self, id: Uuid) -> RepositoryResult<Transaction> {
        self.with_exclusive_lock(id, |tx| tx.record_handshake_failure())
            .await
    }

    async fn apply_provider_state(&self, update: StateUpdate<'_>) -> RepositoryResult<ApplyOutcome> {
        let mut db_tx = self.pool.begin().await?;

        let Some(mut row) =
            Self::lock_row(&mut db_tx, LockKey::MerchantOrderId(update.merchant_order_id)).await?
        else {
            db_tx.rollback().await?;
            return Ok(ApplyOutcome::UnknownTransaction);
        };

        if let Some(event_id) = update.event_id {
            let inserted = sqlx::query(
                r#"
                INSERT INTO webhook_events (provider_event_id, merchant_order_id)
                VALUES ($1, $2)
                ON CONFLICT (provider_event_id) DO NOTHING
                "#,
            )
            .bind(event_id)
            .bind(update.merchant_order_id)
            .execute(&mut *db_tx)
            .await?
            .rows_affected();

            if inserted == 0 {
                db_tx.rollback().await?;
                return Ok(ApplyOutcome::Duplicate);
            }
        }

        if !row.apply_provider_state(update.state, update.provider_transaction_id) {
            db_tx.commit().await?;
            return Ok(ApplyOutcome::Rejected(row));
        }

        let row = Self::persist(&mut db_tx, &row).await?;
        db_tx.commit().await?;
        Ok(ApplyOutcome::Applied(row))
    }

    async fn webhook_event_exists(&self, event_id: &str) -> RepositoryResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM webhook_events WHERE provider_event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn ping(&self) -> RepositoryResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    customer_id: Uuid,
    merchant_order_id: String,
    amount: bigdecimal::BigDecimal,
    state: String,
    provider_order_id: Option<String>,
    payment_token: Option<String>,
    provider_transaction_id: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<Transaction> {
        let state = self
            .state
            .parse::<TransactionState>()
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(Transaction {
            id: self.id,
            customer_id: self.customer_id,
            merchant_order_id: self.merchant_order_id,
            amount: self.amount,
            state,
            provider_order_id: self.provider_order_id,
            payment_token: self.payment_token,
            provider_transaction_id: self.provider_transaction_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}
