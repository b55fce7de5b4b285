pub mod adapters;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod ports;
pub mod provider;
pub mod services;
pub mod startup;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::adapters::{PostgresCustomerDirectory, PostgresTransactionRepository};
use crate::config::Config;
use crate::ports::{CustomerDirectory, TransactionRepository};
use crate::provider::{InMemoryTokenCache, ProviderClient, RedisTokenCache, TokenCache};
use crate::services::{
    HttpMailer, LogMailer, Mailer, NotificationQueue, OrchestrationService, WebhookService,
};

#[derive(Clone)]
pub struct AppState {
    pub orchestration: Arc<OrchestrationService>,
    pub webhooks: Arc<WebhookService>,
    pub ledger: Arc<dyn TransactionRepository>,
}

impl AppState {
    /// Wires services over the given stores and starts the notification worker.
    pub fn new(
        config: &Config,
        ledger: Arc<dyn TransactionRepository>,
        customers: Arc<dyn CustomerDirectory>,
        token_cache: Arc<dyn TokenCache>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        let (notifier, _worker) = NotificationQueue::start(
            ledger.clone(),
            customers.clone(),
            mailer,
            config.notifications(),
        );

        let provider_config = config.provider();
        let hmac_secret = provider_config.hmac_secret.clone();
        let provider = ProviderClient::new(provider_config, token_cache);

        let orchestration = Arc::new(OrchestrationService::new(
            ledger.clone(),
            customers,
            provider,
            Arc::new(notifier),
        ));
        let webhooks = Arc::new(WebhookService::new(
            ledger.clone(),
            orchestration.clone(),
            hmac_secret,
        ));

        Self {
            orchestration,
            webhooks,
            ledger,
        }
    }
}

/// Production wiring: Postgres stores, Redis token cache when configured,
/// HTTP mailer when a mail API is configured.
pub fn build_state(config: &Config, pool: sqlx::PgPool) -> anyhow::Result<AppState> {
    let ledger: Arc<dyn TransactionRepository> =
        Arc::new(PostgresTransactionRepository::new(pool.clone()));
    let customers: Arc<dyn CustomerDirectory> = Arc::new(PostgresCustomerDirectory::new(pool));

    let token_cache: Arc<dyn TokenCache> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Using Redis token cache");
            Arc::new(RedisTokenCache::new(url)?)
        }
        None => Arc::new(InMemoryTokenCache::new()),
    };

    let mailer: Arc<dyn Mailer> = match &config.mail_api_url {
        Some(url) => Arc::new(HttpMailer::new(url.clone())),
        None => {
            tracing::warn!("MAIL_API_URL is not set, state mails will only be logged");
            Arc::new(LogMailer)
        }
    };

    Ok(AppState::new(config, ledger, customers, token_cache, mailer))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/transactions", post(handlers::transactions::create_transaction))
        .route("/transactions/:id", get(handlers::transactions::get_transaction))
        .route(
            "/transactions/:id/reconcile",
            post(handlers::transactions::reconcile_transaction),
        )
        .route("/webhooks/provider", post(handlers::webhook::provider_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
