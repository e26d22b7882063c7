//! Worker for the `price-processing` queue (§4.6, tier 1/2/3 fallback).

use std::sync::Arc;

use async_trait::async_trait;

use super::{JobHandler, JobQueue, PricePayload};
use crate::cache::{cache_key, Cache, Strategy};
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::interpolation;
use crate::model::store::DurableStore;
use crate::oracle::PriceOracle;

pub struct PriceWorker {
    store: Arc<dyn DurableStore>,
    cache: Arc<dyn Cache>,
    oracle: Arc<dyn PriceOracle>,
    queue: JobQueue,
    config: Arc<Config>,
}

impl PriceWorker {
    pub fn new(
        store: Arc<dyn DurableStore>,
        cache: Arc<dyn Cache>,
        oracle: Arc<dyn PriceOracle>,
        queue: JobQueue,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            cache,
            oracle,
            queue,
            config,
        }
    }
}

#[async_trait]
impl JobHandler for PriceWorker {
    async fn handle(&self, payload: &serde_json::Value) -> Result<()> {
        let payload: PricePayload = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::Internal(format!("malformed price job payload: {e}")))?;

        // Idempotence: a duplicate enqueue or retry that landed after another
        // worker already filled this slot does no external work (§4.6).
        if self
            .store
            .get_price(&payload.token, payload.network, payload.timestamp, false)
            .await?
            .is_some()
        {
            tracing::debug!(
                token = %payload.token, network = %payload.network,
                "price-processing job skipped, record already present"
            );
            return Ok(());
        }

        match self
            .oracle
            .get_price_with_retry(&payload.token, payload.network, payload.timestamp)
            .await
        {
            Ok(record) => {
                self.store.store_price(&record).await?;
                let key = cache_key(&self.config.app_name, &payload.token, payload.network, payload.timestamp);
                let strategy = if payload.timestamp.is_none() { Strategy::Hot } else { Strategy::Warm };
                let _ = self.cache.set(&key, &record, strategy).await;

                if self
                    .store
                    .get_all_tokens()
                    .await?
                    .iter()
                    .all(|t| !(t.token.eq_ignore_ascii_case(&payload.token) && t.network == payload.network))
                {
                    let creation_date = self
                        .oracle
                        .get_token_creation_date(&payload.token, payload.network)
                        .await
                        .unwrap_or(None);
                    self.store.add_token(&payload.token, payload.network, creation_date).await?;
                }

                Ok(())
            }
            Err(_oracle_transient_or_miss) => {
                let neighbors = self
                    .store
                    .get_nearest_prices(
                        &payload.token,
                        payload.network,
                        payload.timestamp.unwrap_or_else(chrono::Utc::now),
                        self.config.interpolation.max_data_points,
                    )
                    .await?;

                let target = payload.timestamp.unwrap_or_else(chrono::Utc::now);
                match interpolation::interpolate(
                    &payload.token,
                    payload.network,
                    target,
                    &neighbors,
                    &self.config.interpolation,
                ) {
                    Ok(record) => {
                        self.store.store_price(&record).await?;
                        let key = cache_key(&self.config.app_name, &payload.token, payload.network, payload.timestamp);
                        let _ = self.cache.set(&key, &record, Strategy::Interpolated).await;
                        Ok(())
                    }
                    Err(reason) => Err(AppError::InterpolationDeclined(reason.to_string())),
                }
            }
        }
    }
}

/// Convenience used by the pipeline to enqueue a deferred-fill job with the
/// priority rule of §4.6: current-price jobs outrank historical ones.
pub async fn enqueue_deferred_fill(
    queue: &JobQueue,
    token: &str,
    network: crate::model::types::Network,
    timestamp: Option<chrono::DateTime<chrono::Utc>>,
    max_attempts: i32,
) -> Result<uuid::Uuid> {
    let priority = if timestamp.is_none() {
        super::PRIORITY_CURRENT
    } else {
        super::PRIORITY_HISTORICAL
    };
    queue
        .enqueue_price(
            &PricePayload {
                token: token.to_string(),
                network,
                timestamp,
                priority,
            },
            max_attempts,
        )
        .await
}
