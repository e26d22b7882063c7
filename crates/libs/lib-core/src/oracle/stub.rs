//! Deterministic [`super::PriceOracle`] test double — no network I/O.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use super::PriceOracle;
use crate::error::{AppError, Result};
use crate::model::types::{Network, PriceRecord, Provenance, TokenMetadata};

/// Returns canned prices and creation dates fed in via [`StubOracleClient::with_price`]
/// / [`StubOracleClient::with_creation_date`]. Unregistered tokens are a
/// definitive miss, matching how the production client behaves for a token
/// Alchemy has never indexed.
#[derive(Default)]
pub struct StubOracleClient {
    prices: Mutex<HashMap<(String, Network), f64>>,
    creation_dates: Mutex<HashMap<(String, Network), DateTime<Utc>>>,
    transient_failures: Mutex<HashMap<(String, Network), u32>>,
}

impl StubOracleClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(self, token: &str, network: Network, usd: f64) -> Self {
        self.prices
            .lock()
            .unwrap()
            .insert((token.to_ascii_lowercase(), network), usd);
        self
    }

    pub fn with_creation_date(self, token: &str, network: Network, date: DateTime<Utc>) -> Self {
        self.creation_dates
            .lock()
            .unwrap()
            .insert((token.to_ascii_lowercase(), network), date);
        self
    }

    /// Makes the next `count` calls to `get_price` for this pair fail
    /// transiently before succeeding, to exercise the retry path.
    pub fn with_transient_failures(self, token: &str, network: Network, count: u32) -> Self {
        self.transient_failures
            .lock()
            .unwrap()
            .insert((token.to_ascii_lowercase(), network), count);
        self
    }
}

#[async_trait]
impl PriceOracle for StubOracleClient {
    async fn get_price(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<PriceRecord> {
        let key = (token.to_ascii_lowercase(), network);

        {
            let mut failures = self.transient_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(AppError::OracleTransient("stubbed transient failure".to_string()));
                }
            }
        }

        let Some(usd) = self.prices.lock().unwrap().get(&key).copied() else {
            return Err(AppError::OracleDefinitive(format!(
                "no stubbed price for {token} on {network}"
            )));
        };

        let now = timestamp.unwrap_or_else(Utc::now);
        Ok(PriceRecord {
            token: token.to_string(),
            network,
            timestamp: now,
            usd,
            last_updated: now,
            metadata: TokenMetadata::default(),
            provenance: Provenance::FromApi,
            interpolation: None,
        })
    }

    async fn get_token_creation_date(
        &self,
        token: &str,
        network: Network,
    ) -> Result<Option<DateTime<Utc>>> {
        let key = (token.to_ascii_lowercase(), network);
        Ok(self.creation_dates.lock().unwrap().get(&key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unregistered_token_is_a_definitive_miss() {
        let oracle = StubOracleClient::new();
        let err = oracle
            .get_price("0xdead", Network::Ethereum, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OracleDefinitive(_)));
    }

    #[tokio::test]
    async fn registered_token_returns_stubbed_price() {
        let oracle = StubOracleClient::new().with_price("0xabc", Network::Ethereum, 1.5);
        let record = oracle.get_price("0xabc", Network::Ethereum, None).await.unwrap();
        assert_eq!(record.usd, 1.5);
        assert_eq!(record.provenance, Provenance::FromApi);
    }

    #[tokio::test]
    async fn transient_failures_exhaust_then_succeed() {
        let oracle = StubOracleClient::new()
            .with_price("0xabc", Network::Ethereum, 2.0)
            .with_transient_failures("0xabc", Network::Ethereum, 2);

        assert!(oracle.get_price("0xabc", Network::Ethereum, None).await.is_err());
        assert!(oracle.get_price("0xabc", Network::Ethereum, None).await.is_err());
        assert!(oracle.get_price("0xabc", Network::Ethereum, None).await.is_ok());
    }
}
