//! Configuration parameters for the gas station
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Max number of epochs whose block hashes are kept for reorg detection
pub const MAX_CACHED_BLOCK_HASH_EPOCHS: usize = 100;

/// Default number of blocks kept in the priority fee window
pub const DEFAULT_HISTORICAL_PEEK_COUNT: usize = 100;

/// Default low/medium/high percentiles (0..=100) of observed tips
pub const DEFAULT_PERCENTILES: [f64; 3] = [10.0, 50.0, 90.0];

/// Relative change between window halves below which a trend is considered level
pub const DEFAULT_TREND_DEADBAND: f64 = 0.05;

/// Sync cadence while more epochs remain behind the chain tip
pub const DEFAULT_CATCH_UP_INTERVAL: Duration = Duration::from_millis(50);

/// Sync cadence once caught up, and after any failed attempt
pub const DEFAULT_NORMAL_INTERVAL: Duration = Duration::from_secs(1);

/// How often the cluster membership is reloaded
pub const DEFAULT_CLUSTER_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// How often the dashboard asks the station for a fresh suggestion
pub const SUGGEST_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Number of newest window records shown on the dashboard
pub const DASHBOARD_RECENT_BLOCKS: usize = 20;

// ========================= CONGESTION =========================
/// Mean gas-used ratio below which the network counts as lightly loaded
pub const CONGESTION_LOW_THRESHOLD: f64 = 0.5;
/// Mean gas-used ratio at or above which the network counts as congested
pub const CONGESTION_HIGH_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncIntervals {
    pub catch_up_ms: u64,
    pub normal_ms: u64,
    pub cluster_refresh_secs: u64,
}

impl Default for SyncIntervals {
    fn default() -> Self {
        Self {
            catch_up_ms: DEFAULT_CATCH_UP_INTERVAL.as_millis() as u64,
            normal_ms: DEFAULT_NORMAL_INTERVAL.as_millis() as u64,
            cluster_refresh_secs: DEFAULT_CLUSTER_REFRESH_INTERVAL.as_secs(),
        }
    }
}

impl SyncIntervals {
    pub fn catch_up(&self) -> Duration {
        Duration::from_millis(self.catch_up_ms)
    }

    pub fn normal(&self) -> Duration {
        Duration::from_millis(self.normal_ms)
    }

    pub fn cluster_refresh(&self) -> Duration {
        Duration::from_secs(self.cluster_refresh_secs)
    }
}

/// Gas station settings, loaded once and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GasStationConfig {
    /// Whether the gas station runs at all
    pub enabled: bool,
    /// Window capacity, and how many epochs behind the tip the first sync starts
    pub historical_peek_count: usize,
    /// Ascending low/medium/high percentiles used for tip estimation
    pub percentiles: [f64; 3],
    pub trend_deadband: f64,
    pub intervals: SyncIntervals,
}

impl Default for GasStationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            historical_peek_count: DEFAULT_HISTORICAL_PEEK_COUNT,
            percentiles: DEFAULT_PERCENTILES,
            trend_deadband: DEFAULT_TREND_DEADBAND,
            intervals: SyncIntervals::default(),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("historical peek count must be positive")]
    ZeroPeekCount,

    #[error("percentile {0} out of range [0, 100]")]
    PercentileOutOfRange(f64),

    #[error("percentiles must be ascending: {0:?}")]
    PercentilesNotAscending([f64; 3]),

    #[error("invalid trend deadband: {0}")]
    InvalidDeadband(f64),

    #[error("sync intervals must be non-zero")]
    ZeroInterval,
}

impl GasStationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.historical_peek_count == 0 {
            return Err(ConfigError::ZeroPeekCount);
        }

        for p in self.percentiles {
            if !(0.0..=100.0).contains(&p) {
                return Err(ConfigError::PercentileOutOfRange(p));
            }
        }
        if self.percentiles.windows(2).any(|w| w[0] > w[1]) {
            return Err(ConfigError::PercentilesNotAscending(self.percentiles));
        }

        if !self.trend_deadband.is_finite() || self.trend_deadband < 0.0 {
            return Err(ConfigError::InvalidDeadband(self.trend_deadband));
        }

        let iv = &self.intervals;
        if iv.catch_up_ms == 0 || iv.normal_ms == 0 || iv.cluster_refresh_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }
}
