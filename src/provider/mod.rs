pub mod client;
pub mod payloads;
pub mod token_cache;

pub use client::{ProviderClient, ProviderError, ProviderTransactionStatus};
pub use token_cache::{InMemoryTokenCache, RedisTokenCache, TokenCache};
