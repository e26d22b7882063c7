//! # Durable Store
//!
//! The `DurableStore` contract (§4.3): upsert/lookup of [`PriceRecord`]s, daily
//! rollups, the token registry, cache-stats counters, and archival. The trait is
//! the pinned-down contract; [`postgres::PgDurableStore`] is the owned
//! implementation backing it.

pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::types::{CacheStatsBucket, DailyRollup, Network, PriceRecord, TokenEntry};

pub use postgres::{create_pool, DbPool, PgDurableStore};

/// The durable store's contract. Implementations own indices and retention
/// windows; callers never see the underlying table/collection layout.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Upsert by `(token, network, timestamp)`. Also upserts the day's
    /// [`DailyRollup`] when the record is non-interpolated.
    async fn store_price(&self, record: &PriceRecord) -> Result<()>;

    /// Exact match when `timestamp` is given, else the most recent record for
    /// the pair. Only non-interpolated records are considered authoritative
    /// unless `include_interpolated` is set (used by the pipeline's own
    /// interpolation tier to read back what it just wrote).
    async fn get_price(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
        include_interpolated: bool,
    ) -> Result<Option<PriceRecord>>;

    /// Up to `limit/2` records immediately before and `limit/2` immediately
    /// after `target`, merged and sorted ascending by timestamp.
    async fn get_nearest_prices(
        &self,
        token: &str,
        network: Network,
        target: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<PriceRecord>>;

    /// All tokens known to the registry.
    async fn get_all_tokens(&self) -> Result<Vec<TokenEntry>>;

    /// Upsert a [`TokenEntry`] with its discovered creation date.
    async fn add_token(
        &self,
        token: &str,
        network: Network,
        creation_date: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Ascending by timestamp, `start..=end` inclusive.
    async fn get_price_history(
        &self,
        token: &str,
        network: Network,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PriceRecord>>;

    /// Move live records older than `days` to the archive, then delete them
    /// from the live table. Returns the count archived.
    async fn archive_older_than(&self, days: i64) -> Result<u64>;

    /// Increment today's [`CacheStatsBucket`] counter for `op` (one of
    /// "hit"/"miss"/"set"/"delete") and its strategy bucket.
    async fn record_cache_op(&self, op: &str, strategy: Option<&str>) -> Result<()>;

    /// Read today's (or an arbitrary day's) cache stats bucket.
    async fn get_cache_stats(&self, date: chrono::NaiveDate) -> Result<CacheStatsBucket>;

    /// Fetch the rollup for a (token, network, date) triple, if it exists.
    async fn get_daily_rollup(
        &self,
        token: &str,
        network: Network,
        date: chrono::NaiveDate,
    ) -> Result<Option<DailyRollup>>;

    /// Drop cache-stats buckets older than `days`.
    async fn prune_cache_stats(&self, days: i64) -> Result<u64>;

    /// Cheap connectivity probe for `GET /health` (§4.8).
    async fn health_check(&self) -> bool;
}
