//! Redis-backed [`super::Cache`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Cache, Strategy};
use crate::error::Result;
use crate::model::types::PriceRecord;

/// Envelope stored alongside each record so a lazily-expired entry found by a
/// bulk scan can still be recognized as stale even if Redis's own TTL hasn't
/// fired yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedEntry {
    record: PriceRecord,
    cached_at: DateTime<Utc>,
}

pub struct RedisCache {
    connection_manager: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let connection_manager = client.get_connection_manager().await?;
        Ok(Self { connection_manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<PriceRecord>> {
        let mut conn = self.connection_manager.clone();
        let raw: Option<String> = conn.get(key).await?;

        let Some(raw) = raw else {
            debug!("cache miss: {key}");
            return Ok(None);
        };

        match serde_json::from_str::<CachedEntry>(&raw) {
            Ok(entry) => {
                debug!("cache hit: {key}");
                Ok(Some(entry.record))
            }
            Err(err) => {
                warn!("dropping unparseable cache entry {key}: {err}");
                let _: () = conn.del(key).await?;
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, record: &PriceRecord, strategy: Strategy) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let entry = CachedEntry {
            record: record.clone(),
            cached_at: Utc::now(),
        };
        let serialized = serde_json::to_string(&entry)
            .map_err(|e| crate::error::AppError::Internal(e.to_string()))?;

        let ttl = strategy.ttl_secs(crate::config::core_config());
        conn.set_ex::<_, _, ()>(key, serialized, ttl).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    async fn get_batch(&self, keys: &[String]) -> Result<Vec<Option<PriceRecord>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection_manager.clone();
        let raw: Vec<Option<String>> = conn.mget(keys).await?;

        Ok(raw
            .into_iter()
            .map(|v| {
                v.and_then(|s| serde_json::from_str::<CachedEntry>(&s).ok())
                    .map(|entry| entry.record)
            })
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn ttl(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.connection_manager.clone();
        let ttl: i64 = conn.ttl(key).await?;
        // redis TTL: -2 means the key doesn't exist, -1 means no expiry set.
        Ok(if ttl >= 0 { Some(ttl) } else { None })
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.connection_manager.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}
