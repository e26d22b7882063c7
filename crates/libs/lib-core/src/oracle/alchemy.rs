//! Production [`super::PriceOracle`] backed by Alchemy's Token Prices API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::PriceOracle;
use crate::error::{AppError, Result};
use crate::model::types::{Network, PriceRecord, Provenance, TokenMetadata};

const ALCHEMY_PRICES_BASE: &str = "https://api.g.alchemy.com/prices/v1";
const ALCHEMY_DATA_BASE: &str = "https://api.g.alchemy.com/data/v1";

fn alchemy_network_slug(network: Network) -> &'static str {
    match network {
        Network::Ethereum => "eth-mainnet",
        Network::Polygon => "polygon-mainnet",
        Network::Bsc => "bnb-mainnet",
        Network::Avalanche => "avax-mainnet",
        Network::Arbitrum => "arb-mainnet",
        Network::Optimism => "opt-mainnet",
    }
}

#[derive(Debug, Serialize)]
struct PriceByAddressRequest {
    addresses: Vec<AddressQuery>,
}

#[derive(Debug, Serialize)]
struct AddressQuery {
    network: &'static str,
    address: String,
}

#[derive(Debug, Deserialize)]
struct PriceByAddressResponse {
    data: Vec<TokenPriceEntry>,
}

#[derive(Debug, Deserialize)]
struct TokenPriceEntry {
    address: String,
    #[allow(dead_code)]
    network: String,
    prices: Vec<PriceQuote>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PriceQuote {
    currency: String,
    value: String,
    #[serde(rename = "lastUpdatedAt")]
    last_updated_at: String,
}

#[derive(Debug, Deserialize)]
struct AssetTransfersResponse {
    result: AssetTransfersResult,
}

#[derive(Debug, Deserialize)]
struct AssetTransfersResult {
    transfers: Vec<AssetTransfer>,
}

#[derive(Debug, Deserialize)]
struct AssetTransfer {
    #[serde(rename = "metadata")]
    metadata: TransferMetadata,
}

#[derive(Debug, Deserialize)]
struct TransferMetadata {
    #[serde(rename = "blockTimestamp")]
    block_timestamp: String,
}

pub struct AlchemyOracleClient {
    client: reqwest::Client,
    api_key: String,
}

impl AlchemyOracleClient {
    pub fn new(api_key: String, request_timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, api_key }
    }
}

#[async_trait]
impl PriceOracle for AlchemyOracleClient {
    async fn get_price(
        &self,
        token: &str,
        network: Network,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<PriceRecord> {
        if timestamp.is_some() {
            // Alchemy's by-address endpoint only serves the current price; a
            // historical request here means the store and interpolation
            // tiers have already been exhausted, so an honest "no data" is
            // the right signal rather than silently returning the wrong price.
            return Err(AppError::OracleDefinitive(
                "upstream oracle does not serve historical prices".to_string(),
            ));
        }

        let url = format!("{ALCHEMY_PRICES_BASE}/{}/tokens/by-address", self.api_key);
        let body = PriceByAddressRequest {
            addresses: vec![AddressQuery {
                network: alchemy_network_slug(network),
                address: token.to_string(),
            }],
        };

        debug!("requesting price for {token} on {network} from alchemy");

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(AppError::OracleTransient(format!(
                    "alchemy responded with {status}"
                )));
            }
            return Err(AppError::OracleDefinitive(format!(
                "alchemy responded with {status}"
            )));
        }

        let parsed: PriceByAddressResponse = response.json().await?;
        let entry = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::OracleDefinitive(format!("no price data for {token}")))?;

        if let Some(err) = entry.error {
            return Err(AppError::OracleDefinitive(format!(
                "alchemy could not price {token}: {err}"
            )));
        }

        let usd_quote = entry
            .prices
            .into_iter()
            .find(|p| p.currency.eq_ignore_ascii_case("usd"))
            .ok_or_else(|| AppError::OracleDefinitive(format!("no usd quote for {token}")))?;

        let usd: f64 = usd_quote
            .value
            .parse()
            .map_err(|_| AppError::OracleDefinitive("malformed price value".to_string()))?;

        let last_updated = DateTime::parse_from_rfc3339(&usd_quote.last_updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(PriceRecord {
            token: entry.address,
            network,
            timestamp: last_updated,
            usd,
            last_updated,
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
        let url = format!(
            "{ALCHEMY_DATA_BASE}/{}/assets/transfers/by-contract?network={}&contractAddress={token}&maxCount=1&order=asc",
            self.api_key,
            alchemy_network_slug(network),
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            error!(
                "alchemy asset-transfers lookup for {token} failed: {}",
                response.status()
            );
            return Ok(None);
        }

        let parsed: AssetTransfersResponse = match response.json().await {
            Ok(p) => p,
            Err(_) => return Ok(None),
        };

        let Some(first) = parsed.result.transfers.into_iter().next() else {
            return Ok(None);
        };

        let parsed_ts = DateTime::parse_from_rfc3339(&first.metadata.block_timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .ok();

        Ok(parsed_ts)
    }

    async fn health_check(&self) -> bool {
        !self.api_key.is_empty()
    }
}
