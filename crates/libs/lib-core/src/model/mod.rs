//! # Domain Model
//!
//! Types (§3) and the durable store abstraction (§4.3) built on top of them.

pub mod store;
pub mod types;

pub use types::{
    ArchivedRecord, CacheStatsBucket, DailyRollup, InterpolationDetails, InterpolationMethod,
    Network, PricePoint, PriceRecord, Provenance, RollupEntry, TokenEntry, TokenMetadata,
};
