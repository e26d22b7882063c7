//! # Interpolation Engine
//!
//! Pure, synchronous synthesis of a price from stored neighbors (§4.4). No
//! I/O: callers supply the neighbor set already fetched from the durable
//! store, and get back either a synthesized [`PriceRecord`] or a decline
//! reason.

use chrono::{DateTime, Utc};

use crate::config::InterpolationConfig;
use crate::model::types::{
    InterpolationDetails, InterpolationMethod, Network, PricePoint, PriceRecord, Provenance,
    TokenMetadata,
};

/// Why the engine declined to synthesize a value.
#[derive(Debug, Clone, PartialEq)]
pub enum DeclineReason {
    InsufficientDataPoints,
    ConfidenceBelowThreshold(f64),
    NonPositiveResult,
}

impl std::fmt::Display for DeclineReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeclineReason::InsufficientDataPoints => write!(f, "fewer than 2 usable neighbors"),
            DeclineReason::ConfidenceBelowThreshold(c) => write!(f, "confidence {c:.3} below threshold"),
            DeclineReason::NonPositiveResult => write!(f, "synthesized price is non-positive"),
        }
    }
}

/// Attempt to synthesize a price for `(token, network, target)` from
/// `neighbors` — the caller's already-fetched candidate set, unfiltered.
pub fn interpolate(
    token: &str,
    network: Network,
    target: DateTime<Utc>,
    neighbors: &[PriceRecord],
    config: &InterpolationConfig,
) -> Result<PriceRecord, DeclineReason> {
    let max_gap = chrono::Duration::milliseconds((config.max_time_gap_hours * 3_600_000.0) as i64);

    let mut usable: Vec<&PriceRecord> = neighbors
        .iter()
        .filter(|r| (r.timestamp - target).abs() <= max_gap)
        .take(config.max_data_points)
        .collect();
    usable.sort_by_key(|r| r.timestamp);

    if usable.len() < 2 {
        return Err(DeclineReason::InsufficientDataPoints);
    }

    let before: Vec<&PriceRecord> = usable.iter().copied().filter(|r| r.timestamp < target).collect();
    let after: Vec<&PriceRecord> = usable.iter().copied().filter(|r| r.timestamp > target).collect();

    let (usd, method, confidence, data_points_used) = if !before.is_empty() && !after.is_empty() {
        let before_point = *before.last().unwrap();
        let after_point = *after.first().unwrap();
        linear(before_point, after_point, target)
    } else if !before.is_empty() {
        // Two most-recent points before target; the later one is the anchor
        // nearest to target.
        let slice = &before[before.len().saturating_sub(2)..];
        if slice.len() < 2 {
            return Err(DeclineReason::InsufficientDataPoints);
        }
        extrapolate(slice[0], slice[1], target, config)
    } else {
        // Two earliest points after target; the first one is the anchor
        // nearest to target. `extrapolate` only uses timestamp differences,
        // so passing the pair with the anchor as `later` still yields the
        // correct signed rate and gap even though it precedes `earlier` here.
        let slice = &after[..after.len().min(2)];
        if slice.len() < 2 {
            return Err(DeclineReason::InsufficientDataPoints);
        }
        extrapolate(slice[1], slice[0], target, config)
    };

    let (usd, method, confidence, data_points_used) = match (usd, method, confidence, data_points_used) {
        (Some(usd), method, confidence, data_points_used) => (usd, method, confidence, data_points_used),
        (None, _, _, _) => return Err(DeclineReason::InsufficientDataPoints),
    };

    if usd <= 0.0 {
        return Err(DeclineReason::NonPositiveResult);
    }
    if confidence < config.min_confidence_threshold {
        return Err(DeclineReason::ConfidenceBelowThreshold(confidence));
    }

    Ok(PriceRecord {
        token: token.to_string(),
        network,
        timestamp: target,
        usd,
        last_updated: Utc::now(),
        metadata: TokenMetadata::default(),
        provenance: Provenance::Interpolated,
        interpolation: Some(InterpolationDetails {
            method,
            confidence,
            data_points_used,
        }),
    })
}

type LinearResult = (Option<f64>, InterpolationMethod, f64, Vec<PricePoint>);

fn linear(before: &PriceRecord, after: &PriceRecord, target: DateTime<Utc>) -> LinearResult {
    let span = (after.timestamp - before.timestamp).num_milliseconds();
    let ratio = if span == 0 {
        0.0
    } else {
        (target - before.timestamp).num_milliseconds() as f64 / span as f64
    };

    let usd = before.usd + (after.usd - before.usd) * ratio;

    let time_confidence = 1.0 - 2.0 * (0.5 - ratio).abs();
    let mean = (before.usd + after.usd) / 2.0;
    let volatility_confidence = if mean == 0.0 {
        0.0
    } else {
        (1.0 - (after.usd - before.usd).abs() / mean).max(0.0)
    };
    let confidence = (time_confidence + volatility_confidence) / 2.0;

    let data_points_used = vec![
        PricePoint {
            timestamp: before.timestamp,
            usd: before.usd,
        },
        PricePoint {
            timestamp: after.timestamp,
            usd: after.usd,
        },
    ];

    (Some(usd), InterpolationMethod::Linear, confidence, data_points_used)
}

/// `earlier`/`later` are the two known points, ordered chronologically, used
/// to extrapolate to `target` which lies outside their span.
fn extrapolate(
    earlier: &PriceRecord,
    later: &PriceRecord,
    target: DateTime<Utc>,
    config: &InterpolationConfig,
) -> LinearResult {
    let time_diff_ms = (later.timestamp - earlier.timestamp).num_milliseconds();
    let data_points_used = vec![
        PricePoint {
            timestamp: earlier.timestamp,
            usd: earlier.usd,
        },
        PricePoint {
            timestamp: later.timestamp,
            usd: later.usd,
        },
    ];

    if time_diff_ms == 0 {
        return (None, InterpolationMethod::Extrapolation, 0.0, data_points_used);
    }

    let rate = (later.usd - earlier.usd) / time_diff_ms as f64;
    let gap_ms = (target - later.timestamp).num_milliseconds() as f64;
    let raw = later.usd + rate * gap_ms;

    let k = config.extrapolation_max_change_percent / 100.0;
    let lower = later.usd * (1.0 - k);
    let upper = later.usd * (1.0 + k);
    let clamped = raw.clamp(lower.min(upper), upper.max(lower)).max(0.0001);

    let distance = (target - later.timestamp).num_milliseconds().unsigned_abs() as f64;
    let span = time_diff_ms.unsigned_abs() as f64;
    let time_confidence = if span == 0.0 {
        0.1
    } else {
        (1.0 - distance / span).max(0.1)
    };

    let mean = (earlier.usd + later.usd) / 2.0;
    let volatility_confidence = if mean == 0.0 {
        0.0
    } else {
        (1.0 - (later.usd - earlier.usd).abs() / mean).max(0.0)
    };

    let confidence = ((time_confidence + volatility_confidence) / 2.0).min(1.0);

    (Some(clamped), InterpolationMethod::Extrapolation, confidence, data_points_used)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn config() -> InterpolationConfig {
        InterpolationConfig {
            max_data_points: 10,
            max_time_gap_hours: 168.0,
            min_confidence_threshold: 0.3,
            extrapolation_max_change_percent: 20.0,
        }
    }

    fn point(hours_offset: i64, usd: f64, base: DateTime<Utc>) -> PriceRecord {
        PriceRecord {
            token: "0xabc".to_string(),
            network: Network::Ethereum,
            timestamp: base + Duration::hours(hours_offset),
            usd,
            last_updated: base,
            metadata: TokenMetadata::default(),
            provenance: Provenance::FromApi,
            interpolation: None,
        }
    }

    #[test]
    fn linear_interpolation_midpoint() {
        let base = Utc::now();
        let before = point(-1, 10.0, base);
        let after = point(1, 20.0, base);
        let result = interpolate("0xabc", Network::Ethereum, base, &[before, after], &config())
            .expect("should interpolate");
        assert!((result.usd - 15.0).abs() < 1e-6);
        assert_eq!(result.provenance, Provenance::Interpolated);
        assert_eq!(
            result.interpolation.unwrap().method,
            InterpolationMethod::Linear
        );
    }

    #[test]
    fn fewer_than_two_neighbors_declines() {
        let base = Utc::now();
        let only = point(-1, 10.0, base);
        let err = interpolate("0xabc", Network::Ethereum, base, &[only], &config()).unwrap_err();
        assert_eq!(err, DeclineReason::InsufficientDataPoints);
    }

    #[test]
    fn out_of_range_neighbors_are_filtered_out() {
        let base = Utc::now();
        let mut cfg = config();
        cfg.max_time_gap_hours = 1.0;
        let before = point(-100, 10.0, base);
        let after = point(100, 20.0, base);
        let err = interpolate("0xabc", Network::Ethereum, base, &[before, after], &cfg).unwrap_err();
        assert_eq!(err, DeclineReason::InsufficientDataPoints);
    }

    #[test]
    fn extrapolation_is_clamped_to_max_change() {
        let base = Utc::now();
        let earlier = point(-2, 10.0, base);
        let later = point(-1, 11.0, base);
        // Target far beyond `later`, rate would blow past the clamp band.
        let target = base + Duration::hours(100);
        let result = interpolate(
            "0xabc",
            Network::Ethereum,
            target,
            &[earlier, later],
            &config(),
        );
        if let Ok(record) = result {
            assert!(record.usd <= 11.0 * 1.2 + 1e-6);
        }
    }

    #[test]
    fn zero_mean_price_gives_zero_volatility_confidence_not_panic() {
        let base = Utc::now();
        let before = point(-1, 0.0, base);
        let after = point(1, 0.0, base);
        // usd <= 0 so this must decline, not panic on division by zero.
        let err = interpolate("0xabc", Network::Ethereum, base, &[before, after], &config());
        assert!(err.is_err());
    }
}
