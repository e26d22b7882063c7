//! Worker for the `batch-processing` queue — `processBatchHistorical` (§4.6, §4.7).

use std::sync::Arc;

use async_trait::async_trait;
use lib_utils::daily_utc_midnights;

use super::{BatchPayload, JobHandler};
use crate::error::{AppError, Result};
use crate::model::store::DurableStore;
use crate::oracle::PriceOracle;

/// `{processed, errors, skipped}` counts returned by a historical backfill
/// run, mirrored in the spec's batch-processing worker contract.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BatchResult {
    pub processed: usize,
    pub errors: usize,
    pub skipped: usize,
}

pub struct BatchWorker {
    store: Arc<dyn DurableStore>,
    oracle: Arc<dyn PriceOracle>,
}

impl BatchWorker {
    pub fn new(store: Arc<dyn DurableStore>, oracle: Arc<dyn PriceOracle>) -> Self {
        Self { store, oracle }
    }

    /// Generates the daily UTC-midnight series between `start` and `end`
    /// (inclusive), fetches each via the oracle, and upserts whatever isn't
    /// already present.
    pub async fn process_batch_historical(&self, payload: &BatchPayload) -> Result<BatchResult> {
        let series = daily_utc_midnights(payload.start_date, payload.end_date);
        let targets: Vec<_> = series
            .iter()
            .map(|ts| (payload.token.clone(), payload.network))
            .collect();

        let mut result = BatchResult::default();

        for (ts, (token, network)) in series.iter().zip(targets.iter()) {
            if self.store.get_price(token, *network, Some(*ts), false).await?.is_some() {
                result.skipped += 1;
                continue;
            }

            match self.oracle.get_price_with_retry(token, *network, Some(*ts)).await {
                Ok(record) => {
                    self.store.store_price(&record).await?;
                    result.processed += 1;
                }
                Err(e) => {
                    tracing::warn!(token = %token, network = %network, ts = %ts, "batch fetch failed: {e}");
                    result.errors += 1;
                }
            }
        }

        tracing::info!(
            token = %payload.token, network = %payload.network,
            processed = result.processed, errors = result.errors, skipped = result.skipped,
            "historical batch complete"
        );

        Ok(result)
    }
}

#[async_trait]
impl JobHandler for BatchWorker {
    async fn handle(&self, payload: &serde_json::Value) -> Result<()> {
        let payload: BatchPayload = serde_json::from_value(payload.clone())
            .map_err(|e| AppError::Internal(format!("malformed batch job payload: {e}")))?;

        self.process_batch_historical(&payload).await?;
        Ok(())
    }
}
