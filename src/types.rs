use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

use crate::config::{CONGESTION_HIGH_THRESHOLD, CONGESTION_LOW_THRESHOLD};

/// Whether a transaction was executed in the block it is listed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Executed,
    /// Listed but not executed here, e.g. already executed in an earlier
    /// block or rejected on nonce mismatch.
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochTransaction {
    pub hash: B256,
    /// Block the transaction was executed in, if any
    pub block_hash: Option<B256>,
    pub status: Option<ExecutionStatus>,
    pub max_priority_fee_per_gas: Option<u128>,
    pub max_fee_per_gas: Option<u128>,
    pub gas_price: Option<u128>,
}

impl EpochTransaction {
    pub fn is_executed_in(&self, block_hash: B256) -> bool {
        self.block_hash == Some(block_hash) && self.status == Some(ExecutionStatus::Executed)
    }

    /// Tip paid above `base_fee`: the explicit priority fee when present,
    /// otherwise max fee (or legacy gas price) minus base fee, floored at zero.
    pub fn priority_fee(&self, base_fee: u128) -> u128 {
        if let Some(tip) = self.max_priority_fee_per_gas {
            return tip;
        }
        self.max_fee_per_gas
            .or(self.gas_price)
            .unwrap_or_default()
            .saturating_sub(base_fee)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochBlock {
    pub number: u64,
    pub epoch_number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub base_fee_per_gas: u128,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub transactions: Vec<EpochTransaction>,
}

impl EpochBlock {
    pub fn gas_used_ratio(&self) -> f64 {
        if self.gas_limit == 0 {
            return 0.0;
        }
        self.gas_used as f64 / self.gas_limit as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: B256,
    pub base_fee_per_gas: u128,
}

/// Inclusive min/max of a set of fee values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeRange {
    pub min: u128,
    pub max: u128,
}

impl FeeRange {
    pub fn of(values: impl IntoIterator<Item = u128>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| match acc {
            None => Some(FeeRange { min: v, max: v }),
            Some(r) => Some(FeeRange {
                min: r.min.min(v),
                max: r.max.max(v),
            }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    #[default]
    Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

impl CongestionLevel {
    pub fn from_score(score: f64) -> Self {
        if score < CONGESTION_LOW_THRESHOLD {
            CongestionLevel::Low
        } else if score < CONGESTION_HIGH_THRESHOLD {
            CongestionLevel::Medium
        } else {
            CongestionLevel::High
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasFeeEstimation {
    pub suggested_max_priority_fee_per_gas: u128,
    pub suggested_max_fee_per_gas: u128,
}

impl GasFeeEstimation {
    pub fn new(base_fee: u128, priority_fee: u128) -> Self {
        Self {
            suggested_max_priority_fee_per_gas: priority_fee,
            suggested_max_fee_per_gas: base_fee.saturating_add(priority_fee),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestedGasFees {
    pub low: GasFeeEstimation,
    pub medium: GasFeeEstimation,
    pub high: GasFeeEstimation,
    pub estimated_base_fee: u128,
    pub network_congestion: f64,
    pub latest_priority_fee_range: Option<FeeRange>,
    pub historical_priority_fee_range: Option<FeeRange>,
    pub historical_base_fee_range: Option<FeeRange>,
    pub priority_fee_trend: Trend,
    pub base_fee_trend: Trend,
}

impl SuggestedGasFees {
    pub fn congestion_level(&self) -> CongestionLevel {
        CongestionLevel::from_score(self.network_congestion)
    }
}
