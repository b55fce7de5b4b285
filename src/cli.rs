use clap::{Parser, Subcommand};
use uuid::Uuid;

use paygate_core::config::Config;
use paygate_core::AppState;

#[derive(Parser)]
#[command(name = "paygate-core")]
#[command(about = "Paygate Core - card payment orchestration and provider webhook reconciliation", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Transaction management commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Configuration validation
    Config,
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Fetch the provider's status for a transaction and apply it
    Reconcile {
        /// Transaction UUID
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

pub async fn handle_tx_reconcile(state: &AppState, tx_id: Uuid) -> anyhow::Result<()> {
    let tx = state.orchestration.reconcile(tx_id).await?;

    tracing::info!(merchant_order_id = %tx.merchant_order_id, state = %tx.state, "Transaction reconciled");
    println!("✓ Transaction {} ({}) is {}", tx.id, tx.merchant_order_id, tx.state);
    Ok(())
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = paygate_core::db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    paygate_core::db::run_migrations(&pool).await?;

    println!("✓ Database migrations completed");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Provider Base URL: {}", config.provider_base_url);
    println!("  Provider Integration ID: {}", config.provider_integration_id);
    println!("  Provider API Key: ****");
    println!("  Provider HMAC Secret: ****");
    println!(
        "  Token Cache: {}",
        config
            .redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "in-process".to_string())
    );
    println!(
        "  Mail API: {}",
        config.mail_api_url.as_deref().unwrap_or("log only")
    );

    url::Url::parse(&config.provider_base_url)?;

    tracing::info!("Configuration is valid");
    println!("✓ Configuration is valid");

    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user_start = slash_pos + 2;
                let user = &url[user_start..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
