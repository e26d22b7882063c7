//! # Domain Types
//!
//! The data model in §3 of the specification: [`PriceRecord`], [`DailyRollup`],
//! [`TokenEntry`], [`CacheStatsBucket`], and [`ArchivedRecord`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A supported blockchain network. The set is closed per §4.1 — an unrecognized
/// network string is a synchronous validation failure, never a silent fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Ethereum,
    Polygon,
    Bsc,
    Avalanche,
    Arbitrum,
    Optimism,
}

impl Network {
    pub const ALL: [Network; 6] = [
        Network::Ethereum,
        Network::Polygon,
        Network::Bsc,
        Network::Avalanche,
        Network::Arbitrum,
        Network::Optimism,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Ethereum => "ethereum",
            Network::Polygon => "polygon",
            Network::Bsc => "bsc",
            Network::Avalanche => "avalanche",
            Network::Arbitrum => "arbitrum",
            Network::Optimism => "optimism",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" => Ok(Network::Ethereum),
            "polygon" => Ok(Network::Polygon),
            "bsc" => Ok(Network::Bsc),
            "avalanche" => Ok(Network::Avalanche),
            "arbitrum" => Ok(Network::Arbitrum),
            "optimism" => Ok(Network::Optimism),
            other => Err(format!("unsupported network: {other}")),
        }
    }
}

/// Which tier produced a [`PriceRecord`]. Exactly one tag is ever set (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Provenance {
    FromCache,
    FromDb,
    FromApi,
    Interpolated,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::FromCache => "fromCache",
            Provenance::FromDb => "fromDB",
            Provenance::FromApi => "fromAPI",
            Provenance::Interpolated => "interpolated",
        }
    }
}

/// Method used by the interpolation engine to synthesize a value (§4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    Linear,
    Extrapolation,
}

/// A minimal (timestamp, usd) pair, used to record which neighbors fed an
/// interpolated result into `dataPointsUsed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub usd: f64,
}

/// Optional token metadata that may accompany a [`PriceRecord`] (§3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<i32>,
    pub total_supply: Option<String>,
    pub logo_uri: Option<String>,
}

/// Interpolation-specific fields, present only when `provenance == Interpolated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpolationDetails {
    pub method: InterpolationMethod,
    pub confidence: f64,
    pub data_points_used: Vec<PricePoint>,
}

/// The unit of storage and the unit of reply (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub token: String,
    pub network: Network,
    pub timestamp: DateTime<Utc>,
    pub usd: f64,
    pub last_updated: DateTime<Utc>,
    pub metadata: TokenMetadata,
    pub provenance: Provenance,
    pub interpolation: Option<InterpolationDetails>,
}

impl PriceRecord {
    /// `usd > 0` and the interpolation/provenance pairing is internally consistent.
    pub fn is_valid(&self) -> bool {
        let provenance_consistent = match self.provenance {
            Provenance::Interpolated => self.interpolation.is_some(),
            _ => self.interpolation.is_none(),
        };
        self.usd > 0.0 && provenance_consistent
    }
}

/// Per-day aggregate over all [`PriceRecord`]s for a (token, network, date) (§3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRollup {
    pub token: String,
    pub network: Network,
    pub date: chrono::NaiveDate,
    pub count: i64,
    pub first_price: f64,
    pub last_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub entries: Vec<RollupEntry>,
}

/// One append-only entry in a [`DailyRollup`]'s observation list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupEntry {
    pub timestamp: DateTime<Utc>,
    pub usd: f64,
    pub source: Provenance,
}

impl DailyRollup {
    /// `minPrice <= lastPrice <= maxPrice` and `count == entries.len()` (§8).
    pub fn is_consistent(&self) -> bool {
        self.min_price <= self.last_price
            && self.last_price <= self.max_price
            && self.count as usize == self.entries.len()
    }
}

/// Discovered token origin, used to bound historical backfill ranges (§3/§4.7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub network: Network,
    pub creation_date: Option<DateTime<Utc>>,
    pub added_at: DateTime<Utc>,
}

/// Per-day cache operation counters (§3/§4.2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsBucket {
    pub date: chrono::NaiveDate,
    pub hit: i64,
    pub miss: i64,
    pub set: i64,
    pub delete: i64,
    pub total: i64,
    pub by_strategy: std::collections::HashMap<String, i64>,
}

/// A [`PriceRecord`] moved out of the live table after exceeding the archive
/// threshold (§3/§4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRecord {
    pub record: PriceRecord,
    pub archived_at: DateTime<Utc>,
    pub compressed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(provenance: Provenance, interpolation: Option<InterpolationDetails>) -> PriceRecord {
        PriceRecord {
            token: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".to_string(),
            network: Network::Ethereum,
            timestamp: Utc::now(),
            usd: 1.0,
            last_updated: Utc::now(),
            metadata: TokenMetadata::default(),
            provenance,
            interpolation,
        }
    }

    #[test]
    fn non_interpolated_record_with_usd_is_valid() {
        assert!(sample_record(Provenance::FromApi, None).is_valid());
    }

    #[test]
    fn interpolated_record_without_details_is_invalid() {
        assert!(!sample_record(Provenance::Interpolated, None).is_valid());
    }

    #[test]
    fn non_positive_usd_is_invalid() {
        let mut record = sample_record(Provenance::FromCache, None);
        record.usd = 0.0;
        assert!(!record.is_valid());
    }

    #[test]
    fn network_round_trips_through_str() {
        for net in Network::ALL {
            let parsed: Network = net.as_str().parse().unwrap();
            assert_eq!(parsed, net);
        }
        assert!("solana".parse::<Network>().is_err());
    }
}
