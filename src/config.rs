use anyhow::Context;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

const DEFAULT_PROVIDER_BASE_URL: &str = "https://accept.paymob.com/api";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub provider_base_url: String,
    pub provider_api_key: String,
    pub provider_integration_id: String,
    pub provider_hmac_secret: String,
    pub provider_timeout_secs: u64,
    pub auth_token_ttl_secs: u64,
    pub redis_url: Option<String>,
    pub mail_api_url: Option<String>,
    pub notification_max_retries: u32,
    pub notification_retry_delay_secs: u64,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Settings handed to the provider client and the webhook verifier.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub integration_id: String,
    pub hmac_secret: String,
    pub timeout: Duration,
    pub auth_token_ttl: Duration,
    pub circuit_breaker_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

fn parse_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    env::var(name).with_context(|| format!("{} is required", name))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok(); // Load .env file if present

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Config {
            server_port: parse_or("SERVER_PORT", 3000)?,
            database_url: required("DATABASE_URL")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5)?,
            provider_base_url: env::var("PROVIDER_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PROVIDER_BASE_URL.to_string()),
            provider_api_key: required("PROVIDER_API_KEY")?,
            provider_integration_id: required("PROVIDER_INTEGRATION_ID")?,
            provider_hmac_secret: required("PROVIDER_HMAC_SECRET")?,
            provider_timeout_secs: parse_or("PROVIDER_TIMEOUT_SECS", 10)?,
            auth_token_ttl_secs: parse_or("AUTH_TOKEN_TTL_SECS", 50 * 60)?,
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            mail_api_url: env::var("MAIL_API_URL").ok().filter(|v| !v.trim().is_empty()),
            notification_max_retries: parse_or("NOTIFICATION_MAX_RETRIES", 3)?,
            notification_retry_delay_secs: parse_or("NOTIFICATION_RETRY_DELAY_SECS", 60)?,
            log_format,
        })
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig {
            base_url: self.provider_base_url.clone(),
            api_key: self.provider_api_key.clone(),
            integration_id: self.provider_integration_id.clone(),
            hmac_secret: self.provider_hmac_secret.clone(),
            timeout: Duration::from_secs(self.provider_timeout_secs),
            auth_token_ttl: Duration::from_secs(self.auth_token_ttl_secs),
            circuit_breaker_threshold: 5,
        }
    }

    pub fn notifications(&self) -> NotificationConfig {
        NotificationConfig {
            max_retries: self.notification_max_retries,
            retry_delay: Duration::from_secs(self.notification_retry_delay_secs),
        }
    }
}
