//! Gas fee estimation from a reorg-aware window of recent blocks, synced
//! from a failover cluster of full nodes.

pub mod client;
pub mod config;
pub mod error;
pub mod history;
pub mod monitor;
pub mod station;
pub mod stats;
pub mod status;
pub mod sync;
pub mod telemetry;
pub mod types;
pub mod ui;
pub mod window;

#[cfg(test)]
mod testing;

pub use client::{
    ClusterProvider, EpochClient, FileCluster, PreferredClient, RpcEpochClient, StaticCluster,
};
pub use config::GasStationConfig;
pub use error::{ClientError, ClusterError, ErrorKind, SuggestError, SyncError};
pub use station::GasStation;
pub use status::StationStatus;
pub use types::SuggestedGasFees;
