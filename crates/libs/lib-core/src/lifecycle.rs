//! # Lifecycle Manager
//!
//! Cron-scheduled housekeeping (§4.7): cache cleanup, data archival, cache
//! warming, metrics collection, db optimization, and the daily historical
//! backfill kickoff. Generalizes the teacher's fixed-interval
//! `start_background_refresh` ticker loop to arbitrary cron expressions via
//! the `cron` crate, spawning one `tokio` task per schedule.

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;

use crate::cache::{Cache, Strategy};
use crate::config::Config;
use crate::error::Result;
use crate::model::store::DurableStore;
use crate::oracle::PriceOracle;
use crate::queue::{BatchPayload, JobQueue};

/// Upper bound on how many registered (token, network) pairs `cacheWarming`
/// refreshes per run (§4.7). The spec leaves the warm set's provenance
/// unspecified; the token registry already tracks everything this service
/// has ever served, so the most-recently-registered pairs stand in for
/// "popular" ones.
const WARM_PAIR_LIMIT: usize = 20;

pub struct LifecycleManager {
    store: Arc<dyn DurableStore>,
    cache: Arc<dyn Cache>,
    oracle: Arc<dyn PriceOracle>,
    queue: JobQueue,
    config: Arc<Config>,
}

impl LifecycleManager {
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

    /// Spawn one task per scheduled job. Each task sleeps until its next
    /// cron fire time, runs the task, and loops; `shutdown` stops all of them.
    /// Returns every task's [`tokio::task::JoinHandle`] so the caller can
    /// await a clean drain on shutdown (§5).
    pub fn spawn_all(
        self: Arc<Self>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(6);

        handles.push(self.clone().spawn_scheduled(
            "cacheCleanup",
            &self.config.cron.cache_cleanup.clone(),
            shutdown.clone(),
            |manager| Box::pin(async move { manager.cache_cleanup().await }),
        ));

        handles.push(self.clone().spawn_scheduled(
            "dataArchival",
            &self.config.cron.data_archival.clone(),
            shutdown.clone(),
            |manager| Box::pin(async move { manager.data_archival().await }),
        ));

        if self.config.cron.cache_warming_enabled {
            handles.push(self.clone().spawn_scheduled(
                "cacheWarming",
                &self.config.cron.cache_warming.clone(),
                shutdown.clone(),
                |manager| Box::pin(async move { manager.cache_warming().await }),
            ));
        }

        if self.config.cron.metrics_collection_enabled {
            handles.push(self.clone().spawn_scheduled(
                "metricsCollection",
                &self.config.cron.metrics_collection.clone(),
                shutdown.clone(),
                |manager| Box::pin(async move { manager.metrics_collection().await }),
            ));
        }

        handles.push(self.clone().spawn_scheduled(
            "dbOptimization",
            &self.config.cron.db_optimization.clone(),
            shutdown.clone(),
            |manager| Box::pin(async move { manager.db_optimization().await }),
        ));

        handles.push(self.clone().spawn_scheduled(
            "dailyHistoricalFetch",
            &self.config.cron.daily_historical_fetch.clone(),
            shutdown,
            |manager| Box::pin(async move { manager.daily_historical_fetch().await }),
        ));

        handles
    }

    fn spawn_scheduled<F>(
        self: Arc<Self>,
        name: &'static str,
        expr: &str,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
        task: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: Fn(Arc<Self>) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send>>
            + Send
            + Sync
            + 'static,
    {
        let schedule = match Schedule::from_str(expr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("invalid cron expression for {name} ({expr}): {e}, task disabled");
                return tokio::spawn(async {});
            }
        };

        tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    tracing::error!("{name} cron schedule has no upcoming fire time, stopping");
                    break;
                };
                let now = Utc::now();
                let sleep_for = (next - now).to_std().unwrap_or(std::time::Duration::from_secs(1));

                tokio::select! {
                    _ = tokio::time::sleep(sleep_for) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            tracing::info!("{name} lifecycle task shutting down");
                            return;
                        }
                    }
                }

                if *shutdown.borrow() {
                    return;
                }

                tracing::debug!("running scheduled task {name}");
                if let Err(e) = task(self.clone()).await {
                    tracing::error!("scheduled task {name} failed: {e}");
                }
            }
        });
    }

    /// Hook retained for parity with §4.7; cache expiry already happens via TTL.
    async fn cache_cleanup(&self) -> Result<()> {
        tracing::debug!("cacheCleanup: no-op, TTL governs expiry");
        Ok(())
    }

    async fn data_archival(&self) -> Result<()> {
        let archived = self.store.archive_older_than(self.config.retention.archive_threshold_days).await?;
        tracing::info!("dataArchival: archived {archived} records");
        let pruned = self.store.prune_cache_stats(self.config.retention.cache_stats_days).await?;
        tracing::debug!("dataArchival: pruned {pruned} cache-stats buckets");
        Ok(())
    }

    async fn cache_warming(&self) -> Result<()> {
        let tokens = self.store.get_all_tokens().await?;

        for entry in tokens.into_iter().take(WARM_PAIR_LIMIT) {
            match self
                .oracle
                .get_price_with_retry(&entry.token, entry.network, None)
                .await
            {
                Ok(record) => {
                    let key = crate::cache::cache_key(&self.config.app_name, &entry.token, entry.network, None);
                    let _ = self.cache.set(&key, &record, Strategy::Hot).await;
                }
                Err(e) => tracing::warn!(
                    "cacheWarming failed for {}/{}: {e}",
                    entry.token, entry.network
                ),
            }
        }
        Ok(())
    }

    async fn metrics_collection(&self) -> Result<()> {
        let today = Utc::now().date_naive();
        let bucket = self.store.get_cache_stats(today).await?;
        tracing::info!(
            hit = bucket.hit, miss = bucket.miss, set = bucket.set, delete = bucket.delete,
            "metricsCollection: today's cache stats"
        );
        Ok(())
    }

    /// Reserved hook for store compaction/reindexing.
    async fn db_optimization(&self) -> Result<()> {
        tracing::debug!("dbOptimization: no-op hook");
        Ok(())
    }

    async fn daily_historical_fetch(&self) -> Result<()> {
        let tokens = self.store.get_all_tokens().await?;
        let today = Utc::now();

        for entry in tokens {
            let creation_date = match entry.creation_date {
                Some(d) => d,
                None => {
                    let discovered = self
                        .oracle
                        .get_token_creation_date(&entry.token, entry.network)
                        .await
                        .unwrap_or(None);
                    match discovered {
                        Some(d) => {
                            let _ = self.store.add_token(&entry.token, entry.network, Some(d)).await;
                            d
                        }
                        None => continue,
                    }
                }
            };

            let payload = BatchPayload {
                token: entry.token.clone(),
                network: entry.network,
                start_date: creation_date,
                end_date: today,
                request_id: uuid::Uuid::new_v4(),
            };
            self.queue
                .enqueue_batch(&payload, self.config.queue.batch_processing.max_attempts)
                .await?;
        }

        Ok(())
    }
}
