//! Aggregate gas fee statistics over the priority fee window.
use serde::Serialize;

use crate::types::{FeeRange, Trend};
use crate::window::BlockPriorityFee;

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFeeStats {
    /// Tip at each requested percentile over all pooled tips. `None` when the
    /// window holds no tips, in which case callers fall back to a live oracle.
    pub percentile_priority_fees: Option<[u128; 3]>,
    /// Mean gas-used ratio of the window, in [0, 1]
    pub network_congestion: f64,
    pub latest_priority_fee_range: Option<FeeRange>,
    pub historical_priority_fee_range: Option<FeeRange>,
    pub historical_base_fee_range: Option<FeeRange>,
    pub priority_fee_trend: Trend,
    pub base_fee_trend: Trend,
}

/// Nearest-rank percentile over an ascending slice: the value at
/// `floor((n - 1) * p / 100)`, with `p` clamped to [0, 100].
pub fn percentile(sorted: &[u128], p: f64) -> Option<u128> {
    if sorted.is_empty() {
        return None;
    }
    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let idx = ((sorted.len() - 1) as f64 * p / 100.0).floor() as usize;
    sorted.get(idx.min(sorted.len() - 1)).copied()
}

/// Direction of `samples` (oldest first), comparing the mean of the older
/// half against the newer half. A middle sample goes to the newer half.
pub fn trend(samples: &[f64], deadband: f64) -> Trend {
    if samples.len() < 2 {
        return Trend::Level;
    }
    let (older, newer) = samples.split_at(samples.len() / 2);
    let old = mean(older);
    let new = mean(newer);

    if old == 0.0 {
        return if new > 0.0 { Trend::Up } else { Trend::Level };
    }
    let change = (new - old) / old;
    if change > deadband {
        Trend::Up
    } else if change < -deadband {
        Trend::Down
    } else {
        Trend::Level
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Computes statistics over `records`, ordered oldest to newest.
pub fn calculate(
    records: &[&BlockPriorityFee],
    percentiles: &[f64; 3],
    deadband: f64,
) -> GasFeeStats {
    if records.is_empty() {
        return GasFeeStats::default();
    }

    let mut pooled: Vec<u128> = records.iter().flat_map(|r| r.tips()).collect();
    pooled.sort_unstable();

    let percentile_priority_fees = match (
        percentile(&pooled, percentiles[0]),
        percentile(&pooled, percentiles[1]),
        percentile(&pooled, percentiles[2]),
    ) {
        (Some(low), Some(medium), Some(high)) => Some([low, medium, high]),
        _ => None,
    };

    let ratios: Vec<f64> = records.iter().map(|r| r.gas_used_ratio()).collect();
    let base_fees: Vec<f64> = records.iter().map(|r| r.base_fee() as f64).collect();
    let median_tips: Vec<f64> = records
        .iter()
        .filter_map(|r| r.percentile(50.0))
        .map(|tip| tip as f64)
        .collect();

    GasFeeStats {
        percentile_priority_fees,
        network_congestion: mean(&ratios),
        latest_priority_fee_range: records.last().and_then(|r| FeeRange::of(r.tips())),
        historical_priority_fee_range: FeeRange::of(pooled.iter().copied()),
        historical_base_fee_range: FeeRange::of(records.iter().map(|r| r.base_fee())),
        priority_fee_trend: trend(&median_tips, deadband),
        base_fee_trend: trend(&base_fees, deadband),
    }
}
