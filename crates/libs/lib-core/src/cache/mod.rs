//! # Cache Tier
//!
//! Strategy-keyed Redis cache sitting in front of the durable store (§4.2).
//! `Strategy` fixes the TTL table; [`redis_impl::RedisCache`] is the concrete
//! `redis`-crate implementation.

pub mod redis_impl;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::Result;
use crate::model::types::{Network, PriceRecord};

pub use redis_impl::RedisCache;

/// Which TTL bucket a cached entry belongs to (§4.2). `Cold` and `Archive`
/// records never reach the cache at all — they are served straight from the
/// durable store or the archive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Freshly fetched "current" prices.
    Hot,
    /// Historical, non-interpolated lookups.
    Warm,
    /// Interpolated results — shorter-lived, since better data may arrive.
    Interpolated,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Hot => "hot",
            Strategy::Warm => "warm",
            Strategy::Interpolated => "interpolated",
        }
    }

    /// TTL in seconds for this strategy, from [`Config::cache_ttl`].
    pub fn ttl_secs(&self, config: &Config) -> u64 {
        match self {
            Strategy::Hot => config.cache_ttl.hot_secs,
            Strategy::Warm => config.cache_ttl.warm_secs,
            Strategy::Interpolated => config.cache_ttl.interpolated_secs,
        }
    }
}

/// Cache key for a (token, network, timestamp) lookup: `{appName}:price:{network}:{token}:{timestamp|current}`.
/// `timestamp = None` means "as of now" — the spec's "current" is a cache-key
/// concept only, never a literal value stored in the durable store.
pub fn cache_key(
    app_name: &str,
    token: &str,
    network: Network,
    timestamp: Option<DateTime<Utc>>,
) -> String {
    let token = token.to_ascii_lowercase();
    match timestamp {
        Some(ts) => format!("{app_name}:price:{network}:{token}:{}", ts.to_rfc3339()),
        None => format!("{app_name}:price:{network}:{token}:current"),
    }
}

/// The cache's contract. A cache miss or a cache outage is never a hard
/// failure for a caller — callers fall through to the durable store.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<PriceRecord>>;
    async fn set(&self, key: &str, record: &PriceRecord, strategy: Strategy) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn get_batch(&self, keys: &[String]) -> Result<Vec<Option<PriceRecord>>>;
    /// Whether `key` is present, without fetching or deserializing it.
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Remaining TTL in seconds, or `None` if the key has no expiry or is absent.
    async fn ttl(&self, key: &str) -> Result<Option<i64>>;
    async fn health_check(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn current_key_has_no_timestamp() {
        let key = cache_key("price-oracle", "0xAAbb", Network::Ethereum, None);
        assert_eq!(key, "price-oracle:price:ethereum:0xaabb:current");
    }

    #[test]
    fn historical_key_carries_iso_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let key = cache_key("price-oracle", "0xAAbb", Network::Polygon, Some(ts));
        assert_eq!(key, format!("price-oracle:price:polygon:0xaabb:{}", ts.to_rfc3339()));
    }
}
