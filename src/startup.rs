use crate::config::Config;
use anyhow::{Context, Result};
use sqlx::PgPool;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub redis: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.environment && self.database && self.redis
    }

    pub fn print(&self) {
        println!("\n=== Startup Validation Report ===");
        println!("Environment Variables: {}", status(self.environment));
        println!("Database Connectivity: {}", status(self.database));
        println!("Redis Connectivity:    {}", status(self.redis));

        if !self.errors.is_empty() {
            println!("\nErrors:");
            for error in &self.errors {
                println!("  ❌ {}", error);
            }
        }

        println!("\nOverall Status: {}", if self.is_valid() { "✅ PASS" } else { "❌ FAIL" });
        println!("=================================\n");
    }
}

fn status(ok: bool) -> &'static str {
    if ok { "✅ OK" } else { "❌ FAIL" }
}

pub async fn validate_environment(config: &Config, pool: &PgPool) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        redis: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_env_vars(config) {
        report.environment = false;
        report.errors.push(format!("Environment: {}", e));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("Database: {}", e));
    }

    // Redis is optional; only checked when configured
    if let Some(redis_url) = &config.redis_url {
        if let Err(e) = validate_redis(redis_url).await {
            report.redis = false;
            report.errors.push(format!("Redis: {}", e));
        }
    }

    Ok(report)
}

fn validate_env_vars(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.provider_api_key.trim().is_empty() {
        anyhow::bail!("PROVIDER_API_KEY is empty");
    }
    if config.provider_integration_id.trim().is_empty() {
        anyhow::bail!("PROVIDER_INTEGRATION_ID is empty");
    }
    if config.provider_hmac_secret.trim().is_empty() {
        anyhow::bail!("PROVIDER_HMAC_SECRET is empty");
    }
    if config.server_port == 0 {
        anyhow::bail!("SERVER_PORT must be greater than 0");
    }
    if config.provider_timeout_secs == 0 {
        anyhow::bail!("PROVIDER_TIMEOUT_SECS must be greater than 0");
    }

    let base = url::Url::parse(&config.provider_base_url)
        .context("PROVIDER_BASE_URL is not a valid URL")?;
    if !matches!(base.scheme(), "http" | "https") {
        anyhow::bail!("PROVIDER_BASE_URL must use http or https");
    }

    if let Some(mail_api_url) = &config.mail_api_url {
        url::Url::parse(mail_api_url).context("MAIL_API_URL is not a valid URL")?;
    }

    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Failed to connect to database")?;

    // Check if migrations are up to date
    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("Failed to check migrations table")?;

    if applied == 0 {
        anyhow::bail!("No migrations applied");
    }

    Ok(())
}

async fn validate_redis(redis_url: &str) -> Result<()> {
    let client = redis::Client::open(redis_url).context("Invalid Redis URL")?;

    let mut conn = client
        .get_multiplexed_async_connection()
        .await
        .context("Failed to connect to Redis")?;

    redis::cmd("PING")
        .query_async::<_, String>(&mut conn)
        .await
        .context("Redis PING failed")?;

    Ok(())
}
