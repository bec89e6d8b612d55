use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;

use crate::error::{ErrorKind, SyncError};

/// Availability of the gas station as seen by query callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StationStatus {
    Ok,
    ClientUnavailable,
    SyncFailed(String),
}

impl StationStatus {
    pub fn is_operational(&self) -> bool {
        matches!(self, StationStatus::Ok)
    }

    /// Status implied by the outcome of one sync attempt. Protocol-level
    /// errors keep the station operational.
    pub fn from_sync_result<T>(result: &Result<T, SyncError>) -> Self {
        match result {
            Ok(_) => StationStatus::Ok,
            Err(SyncError::ClusterUnavailable) => StationStatus::ClientUnavailable,
            Err(e) if e.kind() == ErrorKind::Protocol => StationStatus::Ok,
            Err(e) => StationStatus::SyncFailed(e.to_string()),
        }
    }
}

impl fmt::Display for StationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationStatus::Ok => write!(f, "ok"),
            StationStatus::ClientUnavailable => write!(f, "no full node client available"),
            StationStatus::SyncFailed(err) => write!(f, "last sync failed: {}", err),
        }
    }
}

/// Lock-free status cell. The sync task stores, any query path loads.
#[derive(Debug)]
pub struct StatusCell(ArcSwap<StationStatus>);

impl StatusCell {
    pub fn new(status: StationStatus) -> Self {
        Self(ArcSwap::from_pointee(status))
    }

    pub fn load(&self) -> Arc<StationStatus> {
        self.0.load_full()
    }

    pub fn store(&self, status: StationStatus) {
        self.0.store(Arc::new(status));
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new(StationStatus::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;

    #[test]
    fn status_from_sync_result() {
        let ok: Result<(), SyncError> = Ok(());
        assert_eq!(StationStatus::from_sync_result(&ok), StationStatus::Ok);

        let empty: Result<(), _> = Err(SyncError::ClusterUnavailable);
        assert_eq!(
            StationStatus::from_sync_result(&empty),
            StationStatus::ClientUnavailable
        );

        let rpc: Result<(), _> = Err(SyncError::Client(ClientError::Rpc {
            code: -32000,
            message: "epoch not found".into(),
        }));
        assert_eq!(StationStatus::from_sync_result(&rpc), StationStatus::Ok);

        let down: Result<(), _> = Err(SyncError::Client(ClientError::Transport(
            "connection refused".into(),
        )));
        assert_eq!(
            StationStatus::from_sync_result(&down),
            StationStatus::SyncFailed("transport error: connection refused".into())
        );
    }

    #[test]
    fn cell_swaps_status() {
        let cell = StatusCell::default();
        assert!(cell.load().is_operational());
        cell.store(StationStatus::ClientUnavailable);
        assert_eq!(*cell.load(), StationStatus::ClientUnavailable);
    }
}
