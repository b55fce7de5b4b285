mod cli;

use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, DbCommands, TxCommands};
use paygate_core::config::{Config, LogFormat};
use paygate_core::{build_state, create_app, db, startup};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Tx(TxCommands::Reconcile { tx_id }) => {
            let pool = db::create_pool(&config).await?;
            let state = build_state(&config, pool)?;
            cli::handle_tx_reconcile(&state, tx_id).await
        }
        Commands::Config => cli::handle_config_validate(&config),
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    // Database pool
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let report = startup::validate_environment(&config, &pool).await?;
    report.print();
    if !report.is_valid() {
        anyhow::bail!("Startup validation failed");
    }

    let state = build_state(&config, pool)?;
    tracing::info!(provider = %config.provider_base_url, "Payment provider client initialized");

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
