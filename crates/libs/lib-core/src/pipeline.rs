//! # Resolution Pipeline
//!
//! `Resolve(token, network, timestamp?)` (§4.1): Cache → Durable Store →
//! Oracle Client → Interpolation Engine → Job Queue, in that order, each tier
//! only consulted when the previous one comes up empty.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::cache::{cache_key, Cache, Strategy};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::interpolation;
use crate::model::store::DurableStore;
use crate::model::types::{Network, PriceRecord};
use crate::oracle::PriceOracle;
use crate::queue::{price_worker::enqueue_deferred_fill, JobQueue};

/// Outcome of [`ResolutionPipeline::resolve`]: either a record, or a
/// "queued" acknowledgement when every synchronous tier declined (§4.1 tier 5).
#[derive(Debug, Clone)]
pub enum Reply {
    Record(PriceRecord),
    Queued { job_id: uuid::Uuid },
}

pub struct ResolutionPipeline {
    cache: Arc<dyn Cache>,
    store: Arc<dyn DurableStore>,
    oracle: Arc<dyn PriceOracle>,
    queue: JobQueue,
    config: Arc<Config>,
}

impl ResolutionPipeline {
    pub fn new(
        cache: Arc<dyn Cache>,
        store: Arc<dyn DurableStore>,
        oracle: Arc<dyn PriceOracle>,
        queue: JobQueue,
        config: Arc<Config>,
    ) -> Self {
        Self {
            cache,
            store,
            oracle,
            queue,
            config,
        }
    }

    pub async fn resolve(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Reply> {
        let key = cache_key(&self.config.app_name, token, network, timestamp);

        // Tier 1: cache hit.
        if let Ok(Some(record)) = self.cache.get(&key).await {
            let _ = self.store.record_cache_op("hit", None).await;
            return Ok(Reply::Record(record));
        }
        let _ = self.store.record_cache_op("miss", None).await;

        // Tier 2: durable store lookup. The pipeline never trusts a stale
        // interpolation over a real store miss-check, so non-interpolated
        // records only here.
        if let Some(record) = self.store.get_price(token, network, timestamp, false).await? {
            let strategy = Strategy::Warm;
            let _ = self.cache.set(&key, &record, strategy).await;
            let _ = self.store.record_cache_op("set", Some(strategy.as_str())).await;
            return Ok(Reply::Record(record));
        }

        // Tier 3: oracle client.
        match self.oracle.get_price_with_retry(token, network, timestamp).await {
            Ok(record) => {
                self.store.store_price(&record).await?;
                let strategy = if timestamp.is_none() { Strategy::Hot } else { Strategy::Warm };
                let _ = self.cache.set(&key, &record, strategy).await;
                let _ = self.store.record_cache_op("set", Some(strategy.as_str())).await;

                let known = self.store.get_all_tokens().await?;
                let is_new = known
                    .iter()
                    .all(|t| !(t.token.eq_ignore_ascii_case(token) && t.network == network));
                if is_new {
                    if let Ok(Some(creation_date)) =
                        self.oracle.get_token_creation_date(token, network).await
                    {
                        let _ = self.store.add_token(token, network, Some(creation_date)).await;
                    } else {
                        let _ = self.store.add_token(token, network, None).await;
                    }
                }

                return Ok(Reply::Record(record));
            }
            Err(AppError::Validation(msg)) => return Err(AppError::Validation(msg)),
            Err(_transient_or_definitive) => {
                // Falls through to interpolation, per §4.1/§7: neither a
                // transient nor a definitive oracle failure is reported to
                // the caller directly.
            }
        }

        // Tier 4: interpolation engine.
        let target = timestamp.unwrap_or_else(Utc::now);
        let neighbors = self
            .store
            .get_nearest_prices(token, network, target, self.config.interpolation.max_data_points)
            .await?;

        match interpolation::interpolate(token, network, target, &neighbors, &self.config.interpolation) {
            Ok(record) => {
                self.store.store_price(&record).await?;
                let _ = self.cache.set(&key, &record, Strategy::Interpolated).await;
                let _ = self.store.record_cache_op("set", Some(Strategy::Interpolated.as_str())).await;
                Ok(Reply::Record(record))
            }
            Err(_declined) => {
                // Tier 5: deferred fill.
                let max_attempts = self.config.queue.price_processing.max_attempts;
                let job_id = enqueue_deferred_fill(&self.queue, token, network, timestamp, max_attempts).await?;
                Ok(Reply::Queued { job_id })
            }
        }
    }
}
