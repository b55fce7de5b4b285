//! Auth-token caching for the provider client.
//!
//! Refresh races are tolerated: two callers may both miss and both store a
//! fresh token; tokens are interchangeable so the last writer wins.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const AUTH_TOKEN_CACHE_KEY: &str = "provider:auth_token";

#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;

    async fn set(&self, key: &str, value: &str, ttl: Duration);
}

/// Process-local cache with per-entry expiry.
#[derive(Default)]
pub struct InMemoryTokenCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl InMemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            _ => None,
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
    }
}

/// Redis-backed cache shared by every worker process. Redis failures are
/// logged and treated as a cache miss.
#[derive(Clone)]
pub struct RedisTokenCache {
    client: redis::Client,
}

impl RedisTokenCache {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Token cache unavailable: {}", e);
                return None;
            }
        };

        match redis::cmd("GET")
            .arg(key)
            .query_async::<_, Option<String>>(&mut conn)
            .await
        {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!("Token cache read failed: {}", e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) {
        let mut conn = match self.client.get_multiplexed_async_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Token cache unavailable: {}", e);
                return;
            }
        };

        if let Err(e) = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await
        {
            tracing::warn!("Token cache write failed: {}", e);
        }
    }
}
