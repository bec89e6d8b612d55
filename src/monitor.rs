//! Periodic polling of the gas station for display.
use std::sync::Arc;
use std::time::Instant;

use crate::client::{EpochClient, PreferredClient};
use crate::config::DASHBOARD_RECENT_BLOCKS;
use crate::error::SuggestError;
use crate::station::GasStation;
use crate::status::StationStatus;
use crate::types::SuggestedGasFees;
use crate::window::BlockPriorityFee;

#[derive(Debug, Clone)]
pub struct StationSnapshot {
    pub node_url: String,
    pub status: StationStatus,
    pub suggestion: Option<SuggestedGasFees>,
    pub error: Option<String>,
    pub recent_blocks: Vec<BlockPriorityFee>,
    pub window_len: usize,
    pub window_capacity: usize,
    pub last_updated: Instant,
    pub last_successful: Option<Instant>,
}

impl StationSnapshot {
    fn new(node_url: String) -> Self {
        Self {
            node_url,
            status: StationStatus::Ok,
            suggestion: None,
            error: None,
            recent_blocks: Vec::new(),
            window_len: 0,
            window_capacity: 0,
            last_updated: Instant::now(),
            last_successful: None,
        }
    }
}

/// Polls suggestions through whichever member the sync task prefers.
pub struct StationMonitor<C> {
    station: GasStation,
    preferred: Arc<PreferredClient<C>>,
    snapshot: StationSnapshot,
}

impl<C: EpochClient> StationMonitor<C> {
    pub fn new(station: GasStation, preferred: Arc<PreferredClient<C>>) -> Self {
        let node_url = preferred
            .load()
            .map(|client| client.node_url().to_string())
            .unwrap_or_default();
        Self {
            station,
            preferred,
            snapshot: StationSnapshot::new(node_url),
        }
    }

    pub async fn refresh(&mut self) -> &StationSnapshot {
        let result = match self.preferred.load() {
            Some(client) => {
                self.snapshot.node_url = client.node_url().to_string();
                self.station.suggest(client.as_ref()).await
            }
            None => Err(SuggestError::Unavailable(StationStatus::ClientUnavailable)),
        };

        let snap = &mut self.snapshot;
        snap.status = (*self.station.status()).clone();
        snap.last_updated = Instant::now();
        match result {
            Ok(fees) => {
                snap.suggestion = Some(fees);
                snap.error = None;
                snap.last_successful = Some(snap.last_updated);
            }
            Err(err) => {
                // keep the last good suggestion on screen
                snap.error = Some(err.to_string());
            }
        }

        snap.recent_blocks = self.station.recent_blocks(DASHBOARD_RECENT_BLOCKS);
        snap.window_len = self.station.window_len();
        snap.window_capacity = self.station.window_capacity();
        &self.snapshot
    }

    pub fn snapshot(&self) -> &StationSnapshot {
        &self.snapshot
    }
}
