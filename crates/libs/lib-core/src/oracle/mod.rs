//! # Oracle Client
//!
//! Upstream price discovery (§4.5): a [`PriceOracle`] trait with a production
//! `reqwest`-based implementation ([`alchemy::AlchemyOracleClient`]) and a
//! deterministic test double ([`stub::StubOracleClient`]).

pub mod alchemy;
pub mod stub;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::types::{Network, PriceRecord};

pub use alchemy::AlchemyOracleClient;
pub use stub::StubOracleClient;

/// Upstream price discovery contract. Implementations never interpolate or
/// cache — that is the pipeline's job, not the client's.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Fetch one price. `timestamp = None` asks for the current price.
    async fn get_price(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<PriceRecord>;

    /// [`PriceOracle::get_price`] wrapped in the retry/backoff policy of §4.5:
    /// up to `maxRetries` attempts, `retryDelayMs * attempt` between them,
    /// only for [`crate::error::AppError::OracleTransient`] failures.
    async fn get_price_with_retry(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<PriceRecord> {
        let config = crate::config::core_config();
        let mut attempt = 0u32;
        loop {
            match self.get_price(token, network, timestamp).await {
                Ok(record) => return Ok(record),
                Err(crate::error::AppError::OracleTransient(msg)) => {
                    attempt += 1;
                    if attempt >= config.oracle.max_retries {
                        return Err(crate::error::AppError::OracleTransient(msg));
                    }
                    let delay = 2u64.saturating_pow(attempt) * config.oracle.retry_delay_ms;
                    tracing::debug!(
                        "oracle transient error on attempt {attempt}/{}: {msg}, retrying in {delay}ms",
                        config.oracle.max_retries
                    );
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Earliest-known activity for `token` on `network`, used to bound
    /// historical backfill ranges (§3/§4.7). `None` if it cannot be
    /// determined.
    async fn get_token_creation_date(
        &self,
        token: &str,
        network: Network,
    ) -> Result<Option<DateTime<Utc>>>;

    /// Fetch prices for multiple tokens, chunked by `oracle.batch_size` and
    /// rate-limited to `oracle.rate_limit_per_second` (§4.5). Partial
    /// failures are reported per-token rather than failing the whole batch.
    async fn batch_get_prices(
        &self,
        tokens: &[(String, Network)],
        timestamp: Option<DateTime<Utc>>,
    ) -> Vec<(String, Network, Result<PriceRecord>)> {
        let config = crate::config::core_config();
        let mut results = Vec::with_capacity(tokens.len());

        for chunk in tokens.chunks(config.oracle.batch_size.max(1)) {
            let fetches = chunk
                .iter()
                .map(|(token, network)| self.get_price_with_retry(token, *network, timestamp));
            let chunk_results = futures::future::join_all(fetches).await;
            results.extend(
                chunk
                    .iter()
                    .zip(chunk_results)
                    .map(|((token, network), result)| (token.clone(), *network, result)),
            );

            if config.oracle.rate_limit_per_second > 0 {
                let pause = 1000 / config.oracle.rate_limit_per_second.max(1) as u64;
                tokio::time::sleep(std::time::Duration::from_millis(pause)).await;
            }
        }

        results
    }

    /// Cheap connectivity probe for `GET /health` (§4.8). Default assumes
    /// reachable unless an implementation knows better (e.g. a missing key).
    async fn health_check(&self) -> bool {
        true
    }
}
