//! Transaction state mail, delivered off the request path.
//!
//! [`NotificationQueue`] is the [`TransactionNotifier`] handed to the
//! orchestration service. Scheduling only pushes the transaction id onto an
//! unbounded channel; a worker task drains it and delivers each mail on its
//! own task, retrying a bounded number of times with a fixed delay.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::NotificationConfig;
use crate::domain::TransactionState;
use crate::ports::{CustomerDirectory, TransactionNotifier, TransactionRepository};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TransactionStateMail {
    pub to: String,
    pub subject: String,
    pub transaction_id: Uuid,
    pub merchant_order_id: String,
    pub amount: String,
    pub state: TransactionState,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: &TransactionStateMail) -> anyhow::Result<()>;
}

/// Posts mails as JSON to an external mail API.
pub struct HttpMailer {
    client: Client,
    url: String,
}

impl HttpMailer {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, mail: &TransactionStateMail) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(mail)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Logs the mail instead of sending it. Used when no mail API is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &TransactionStateMail) -> anyhow::Result<()> {
        tracing::info!(
            transaction_id = %mail.transaction_id,
            state = %mail.state,
            "Transaction state mail (not sent, no mail API configured)"
        );
        Ok(())
    }
}

struct Delivery {
    ledger: Arc<dyn TransactionRepository>,
    customers: Arc<dyn CustomerDirectory>,
    mailer: Arc<dyn Mailer>,
    config: NotificationConfig,
}

impl Delivery {
    async fn compose(&self, transaction_id: Uuid) -> anyhow::Result<Option<TransactionStateMail>> {
        let tx = self.ledger.get_by_id(transaction_id).await?;
        let customer = self.customers.get_customer(tx.customer_id).await?;

        let Some(to) = customer.email.filter(|e| !e.trim().is_empty()) else {
            return Ok(None);
        };

        Ok(Some(TransactionStateMail {
            to,
            subject: format!("Your payment {} is {}", tx.merchant_order_id, tx.state),
            transaction_id: tx.id,
            merchant_order_id: tx.merchant_order_id,
            amount: tx.amount.to_string(),
            state: tx.state,
        }))
    }

    async fn run(&self, transaction_id: Uuid) {
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            let result = match self.compose(transaction_id).await {
                Ok(Some(mail)) => self.mailer.send(&mail).await,
                Ok(None) => {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        "Customer has no email address, skipping state mail"
                    );
                    return;
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {
                    tracing::info!(transaction_id = %transaction_id, "Transaction state mail sent");
                    return;
                }
                Err(e) if attempt < attempts => {
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        attempt,
                        "Transaction state mail failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        transaction_id = %transaction_id,
                        attempts,
                        "Giving up on transaction state mail: {}",
                        e
                    );
                }
            }
        }
    }
}

/// Handle to the notification worker.
#[derive(Clone)]
pub struct NotificationQueue {
    sender: mpsc::UnboundedSender<Uuid>,
}

impl NotificationQueue {
    /// Spawns the worker and returns the queue together with its join handle.
    /// The worker stops once every queue handle has been dropped.
    pub fn start(
        ledger: Arc<dyn TransactionRepository>,
        customers: Arc<dyn CustomerDirectory>,
        mailer: Arc<dyn Mailer>,
        config: NotificationConfig,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Uuid>();
        let delivery = Arc::new(Delivery {
            ledger,
            customers,
            mailer,
            config,
        });

        let worker = tokio::spawn(async move {
            tracing::info!("Notification worker started");
            while let Some(transaction_id) = receiver.recv().await {
                let delivery = delivery.clone();
                tokio::spawn(async move { delivery.run(transaction_id).await });
            }
            tracing::info!("Notification worker stopped");
        });

        (Self { sender }, worker)
    }
}

impl TransactionNotifier for NotificationQueue {
    fn schedule_transaction_state_notification(&self, transaction_id: Uuid) {
        if self.sender.send(transaction_id).is_err() {
            tracing::error!(
                transaction_id = %transaction_id,
                "Notification worker is gone, state mail dropped"
            );
        } else {
            tracing::debug!(transaction_id = %transaction_id, "Transaction state mail scheduled");
        }
    }
}
