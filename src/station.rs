//! Query surface for gas fee suggestions.
use eyre::{WrapErr, eyre};
use rand::Rng;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::client::{ClusterProvider, EpochClient, PreferredClient};
use crate::config::GasStationConfig;
use crate::error::SuggestError;
use crate::stats::GasFeeStats;
use crate::status::{StationStatus, StatusCell};
use crate::sync::SyncEngine;
use crate::types::{GasFeeEstimation, SuggestedGasFees};
use crate::window::{BlockPriorityFee, PriorityFeeWindow};

/// Read-only handle onto the fee window and station status. The background
/// sync task is aborted when the handle is dropped.
pub struct GasStation {
    config: GasStationConfig,
    window: Arc<PriorityFeeWindow>,
    status: Arc<StatusCell>,
    task: Option<JoinHandle<()>>,
}

impl GasStation {
    /// Handle over existing state without a background task of its own.
    pub fn new(
        config: GasStationConfig,
        window: Arc<PriorityFeeWindow>,
        status: Arc<StatusCell>,
    ) -> Self {
        Self {
            config,
            window,
            status,
            task: None,
        }
    }

    /// Bootstrap from the cluster and spawn the sync task. Returns `None` when
    /// the station is disabled. The sync task keeps `preferred` pointed at the
    /// member it last synced through.
    pub async fn start<P: ClusterProvider>(
        config: GasStationConfig,
        provider: P,
        preferred: Arc<PreferredClient<P::Client>>,
    ) -> eyre::Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        config.validate()?;

        let clients = provider
            .cluster()
            .await
            .wrap_err("failed to get fullnode cluster")?;
        if clients.is_empty() {
            return Err(eyre!("no full node client available"));
        }

        let cli_index = rand::thread_rng().gen_range(0..clients.len());
        let latest_epoch = clients[cli_index]
            .latest_epoch_number()
            .await
            .wrap_err("failed to get latest epoch number")?;
        let from_epoch = latest_epoch.saturating_sub(config.historical_peek_count as u64);

        info!(
            node_url = clients[cli_index].node_url(),
            latest_epoch,
            from_epoch,
            members = clients.len(),
            "Gas station starting"
        );

        let window = Arc::new(PriorityFeeWindow::new(config.historical_peek_count));
        let status = Arc::new(StatusCell::default());
        let engine = SyncEngine::new(
            config.clone(),
            provider,
            clients,
            cli_index,
            from_epoch,
            Arc::clone(&window),
            Arc::clone(&status),
        )
        .with_preferred(preferred);
        let task = tokio::spawn(engine.run());

        let mut station = Self::new(config, window, status);
        station.task = Some(task);
        Ok(Some(station))
    }

    pub fn config(&self) -> &GasStationConfig {
        &self.config
    }

    pub fn status(&self) -> Arc<StationStatus> {
        self.status.load()
    }

    pub fn stats(&self) -> GasFeeStats {
        self.window
            .calculate(&self.config.percentiles, self.config.trend_deadband)
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    pub fn window_capacity(&self) -> usize {
        self.window.capacity()
    }

    /// Newest window records, newest first.
    pub fn recent_blocks(&self, limit: usize) -> Vec<BlockPriorityFee> {
        self.window.recent(limit)
    }

    /// Low/medium/high fee suggestions. Fails without touching `client` when
    /// the station is not operational.
    pub async fn suggest<C: EpochClient + ?Sized>(
        &self,
        client: &C,
    ) -> Result<SuggestedGasFees, SuggestError> {
        let status = self.status.load();
        if !status.is_operational() {
            return Err(SuggestError::Unavailable((*status).clone()));
        }

        let latest_block = client.latest_block_summary().await?;
        let base_fee = latest_block.base_fee_per_gas;
        let stats = self.stats();

        let priority_fees = match stats.percentile_priority_fees {
            Some(fees) => fees,
            // no estimation made yet, use the node's own suggestion
            None => [client.max_priority_fee_per_gas().await?; 3],
        };

        Ok(SuggestedGasFees {
            low: GasFeeEstimation::new(base_fee, priority_fees[0]),
            medium: GasFeeEstimation::new(base_fee, priority_fees[1]),
            high: GasFeeEstimation::new(base_fee, priority_fees[2]),
            estimated_base_fee: base_fee,
            network_congestion: stats.network_congestion,
            latest_priority_fee_range: stats.latest_priority_fee_range,
            historical_priority_fee_range: stats.historical_priority_fee_range,
            historical_base_fee_range: stats.historical_base_fee_range,
            priority_fee_trend: stats.priority_fee_trend,
            base_fee_trend: stats.base_fee_trend,
        })
    }
}

impl Drop for GasStation {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
