//! Background synchronization of the priority fee window with a full node cluster.
use alloy_primitives::B256;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::client::{ClusterProvider, EpochClient, PreferredClient};
use crate::config::GasStationConfig;
use crate::error::{ClusterError, ErrorKind, SyncError};
use crate::history::EpochHashHistory;
use crate::status::{StationStatus, StatusCell};
use crate::telemetry::ErrorTolerantLogger;
use crate::types::EpochBlock;
use crate::window::{BlockPriorityFee, PriorityFeeWindow, TxnPriorityFee};

/// Result of a successful sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Cursor is past the latest confirmed epoch
    CaughtUp,
    /// One epoch was ingested
    Advanced,
    /// Last ingested epoch was rolled back
    Reorged,
}

impl SyncOutcome {
    pub fn is_complete(self) -> bool {
        matches!(self, SyncOutcome::CaughtUp)
    }
}

pub struct SyncEngine<P: ClusterProvider> {
    config: GasStationConfig,
    provider: P,
    clients: Vec<Arc<P::Client>>,
    /// Index of the preferred client
    cli_index: usize,
    preferred: Arc<PreferredClient<P::Client>>,
    start_epoch: u64,
    /// Next epoch to sync
    from_epoch: u64,
    history: EpochHashHistory,
    window: Arc<PriorityFeeWindow>,
    status: Arc<StatusCell>,
}

impl<P: ClusterProvider> SyncEngine<P> {
    pub fn new(
        config: GasStationConfig,
        provider: P,
        clients: Vec<Arc<P::Client>>,
        cli_index: usize,
        from_epoch: u64,
        window: Arc<PriorityFeeWindow>,
        status: Arc<StatusCell>,
    ) -> Self {
        let preferred = match clients.get(cli_index) {
            Some(client) => PreferredClient::new(Arc::clone(client)),
            None => PreferredClient::empty(),
        };
        Self {
            config,
            provider,
            clients,
            cli_index,
            preferred: Arc::new(preferred),
            start_epoch: from_epoch,
            from_epoch,
            history: EpochHashHistory::default(),
            window,
            status,
        }
    }

    pub fn from_epoch(&self) -> u64 {
        self.from_epoch
    }

    pub fn cli_index(&self) -> usize {
        self.cli_index
    }

    /// Publish the preferred member through `cell` from now on.
    pub fn with_preferred(mut self, cell: Arc<PreferredClient<P::Client>>) -> Self {
        if let Some(client) = self.preferred.load() {
            cell.store(client);
        }
        self.preferred = cell;
        self
    }

    pub fn preferred(&self) -> Arc<PreferredClient<P::Client>> {
        Arc::clone(&self.preferred)
    }

    fn prefer(&mut self, idx: usize) {
        self.cli_index = idx;
        self.preferred.store(Arc::clone(&self.clients[idx]));
    }

    /// Sync and cluster refresh on their own timers, never concurrently.
    pub async fn run(mut self) {
        let intervals = self.config.intervals.clone();
        let sync_timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sync_timer);

        let refresh_every = intervals.cluster_refresh();
        let mut refresh_timer =
            tokio::time::interval_at(Instant::now() + refresh_every, refresh_every);

        let mut et_logger = ErrorTolerantLogger::default();
        loop {
            tokio::select! {
                () = &mut sync_timer => {
                    let result = self.sync().await;
                    et_logger.log(&result, "Gas station sync error");

                    let status = StationStatus::from_sync_result(&result);
                    debug!(
                        status = %status,
                        from_epoch = self.from_epoch,
                        clients = self.clients.len(),
                        "Gas station sync attempt finished"
                    );
                    self.status.store(status);

                    let delay = match result {
                        Ok(outcome) if !outcome.is_complete() => intervals.catch_up(),
                        _ => intervals.normal(),
                    };
                    sync_timer.as_mut().reset(Instant::now() + delay);
                }
                _ = refresh_timer.tick() => {
                    if let Err(err) = self.refresh_cluster().await {
                        error!(error = %err, "Gas station cluster refresh error");
                    }
                }
            }
        }
    }

    /// One sync attempt, failing over across the cluster starting from the
    /// preferred client. Each client is tried at most once.
    pub async fn sync(&mut self) -> Result<SyncOutcome, SyncError> {
        if self.clients.is_empty() {
            return Err(SyncError::ClusterUnavailable);
        }

        self.cli_index %= self.clients.len();
        let mut idx = self.cli_index;
        loop {
            let client = Arc::clone(&self.clients[idx]);
            let result = self.try_sync(client.as_ref()).await;

            match &result {
                Ok(_) => {
                    self.prefer(idx);
                    return result;
                }
                Err(err) => {
                    debug!(
                        cli_index = idx,
                        node_url = client.node_url(),
                        error = %err,
                        "Gas station sync once error"
                    );
                    if err.kind() == ErrorKind::Protocol {
                        self.prefer(idx);
                        return result;
                    }
                }
            }

            idx = (idx + 1) % self.clients.len();
            if idx == self.cli_index {
                return result;
            }
        }
    }

    async fn try_sync(&mut self, client: &P::Client) -> Result<SyncOutcome, SyncError> {
        debug!(
            from_epoch = self.from_epoch,
            node_url = client.node_url(),
            "Gas station syncing once"
        );

        let latest_epoch = client.latest_epoch_number().await?;
        if self.from_epoch > latest_epoch {
            return Ok(SyncOutcome::CaughtUp);
        }

        let epoch = self.from_epoch;
        let pivot_block = client.pivot_block(epoch).await?;

        if let Some(prev_pivot) = self.history.prev_pivot_hash() {
            if prev_pivot != pivot_block.parent_hash {
                debug!(
                    prev_pivot = %prev_pivot,
                    pivot_hash = %pivot_block.hash,
                    pivot_parent_hash = %pivot_block.parent_hash,
                    "Gas station detected reorg"
                );
                self.handle_reorg();
                return Ok(SyncOutcome::Reorged);
            }
        }

        let (block_hashes, blocks) = self.fetch_blocks(client, epoch, pivot_block).await?;
        for block in &blocks {
            self.handle_block(block);
        }

        self.history.push(block_hashes);
        self.from_epoch += 1;
        Ok(SyncOutcome::Advanced)
    }

    async fn fetch_blocks(
        &self,
        client: &P::Client,
        epoch: u64,
        pivot_block: EpochBlock,
    ) -> Result<(Vec<B256>, Vec<EpochBlock>), SyncError> {
        let block_hashes = client.epoch_block_hashes(epoch).await?;

        let Some(&pivot_hash) = block_hashes.last() else {
            return Err(SyncError::EmptyEpoch(epoch));
        };
        if pivot_hash != pivot_block.hash {
            return Err(SyncError::PivotSwitched {
                epoch,
                expected: pivot_block.hash,
                actual: pivot_hash,
            });
        }

        let mut blocks = Vec::with_capacity(block_hashes.len());
        for hash in &block_hashes[..block_hashes.len() - 1] {
            let block = client
                .block_with_pivot_assumption(*hash, pivot_block.hash, epoch)
                .await?;
            blocks.push(block);
        }
        blocks.push(pivot_block);

        Ok((block_hashes, blocks))
    }

    /// Drop the last synced epoch from history and window, and step the
    /// cursor back so it is fetched again.
    fn handle_reorg(&mut self) {
        let block_hashes = self.history.pop().unwrap_or_default();
        let removed = self.window.remove(&block_hashes);
        self.from_epoch = self.from_epoch.saturating_sub(1).max(self.start_epoch);

        info!(
            block_hashes = ?block_hashes,
            removed,
            from_epoch = self.from_epoch,
            "Gas station removed blocks due to reorg"
        );
    }

    fn handle_block(&self, block: &EpochBlock) {
        let mut block_fee = BlockPriorityFee::new(
            block.number,
            block.hash,
            block.base_fee_per_gas,
            block.gas_used_ratio(),
        );

        let txn_tips: Vec<TxnPriorityFee> = block
            .transactions
            .iter()
            .filter(|txn| txn.is_executed_in(block.hash))
            .map(|txn| {
                let tip = txn.priority_fee(block.base_fee_per_gas);
                debug!(
                    txn_hash = %txn.hash,
                    tip,
                    max_priority_fee_per_gas = ?txn.max_priority_fee_per_gas,
                    max_fee_per_gas = ?txn.max_fee_per_gas,
                    gas_price = ?txn.gas_price,
                    base_fee_per_gas = block.base_fee_per_gas,
                    "Gas station calculated txn priority fee"
                );
                TxnPriorityFee {
                    hash: txn.hash,
                    tip,
                }
            })
            .collect();

        debug!(
            number = block.number,
            hash = %block.hash,
            exec_txn_count = txn_tips.len(),
            "Gas station pushing block"
        );

        block_fee.append(txn_tips);
        self.window.push(block_fee);
    }

    /// Replace the cluster membership. The preferred index is re-bounded on
    /// the next sync.
    pub async fn refresh_cluster(&mut self) -> Result<(), ClusterError> {
        let clients = self.provider.cluster().await?;
        debug!(count = clients.len(), "Gas station refreshed cluster nodes");
        self.clients = clients;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::testing::{MockChain, MockClient, SharedCluster, block, block_hash, tip_tx};
    use crate::types::{EpochTransaction, ExecutionStatus};

    fn engine(
        members: Vec<Arc<MockClient>>,
        from_epoch: u64,
        capacity: usize,
    ) -> (SyncEngine<SharedCluster>, Arc<PriorityFeeWindow>) {
        let window = Arc::new(PriorityFeeWindow::new(capacity));
        let engine = SyncEngine::new(
            GasStationConfig::default(),
            SharedCluster::new(members.clone()),
            members,
            0,
            from_epoch,
            Arc::clone(&window),
            Arc::new(StatusCell::default()),
        );
        (engine, window)
    }

    fn transport(msg: &str) -> ClientError {
        ClientError::Transport(msg.to_string())
    }

    #[tokio::test]
    async fn syncs_epochs_until_caught_up() {
        let client = Arc::new(MockClient::new("a", MockChain::linear(1, 3, 10, &[1, 2])));
        let (mut engine, window) = engine(vec![client], 1, 10);

        for expected in 2..=4 {
            assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
            assert_eq!(engine.from_epoch(), expected);
        }
        assert_eq!(engine.sync().await, Ok(SyncOutcome::CaughtUp));
        assert_eq!(engine.from_epoch(), 4);
        assert_eq!(window.len(), 3);
        assert_eq!(engine.history.len(), 3);
    }

    #[tokio::test]
    async fn ingests_all_blocks_of_an_epoch() {
        let mut chain = MockChain::linear(1, 1, 10, &[]);
        let (h0, h1) = (block_hash(1, 0, 0), block_hash(1, 1, 0));
        let mut side = block(1, h0, block_hash(0, 0, 0), 10, &[4]);
        side.transactions.push(skipped_tx(h0));
        let pivot = block(1, h1, block_hash(0, 0, 0), 10, &[8]);
        chain.epochs.insert(1, vec![side, pivot]);

        let client = Arc::new(MockClient::new("a", chain));
        let (mut engine, window) = engine(vec![client], 1, 10);

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(window.len(), 2);
        assert_eq!(engine.history.prev_pivot_hash(), Some(h1));

        // the skipped transaction contributes no tip
        let stats = window.calculate(&[0.0, 50.0, 100.0], 0.05);
        assert_eq!(stats.percentile_priority_fees, Some([4, 4, 8]));
    }

    fn skipped_tx(block: B256) -> EpochTransaction {
        let mut tx = tip_tx(block, 0xEE, 1_000);
        tx.status = Some(ExecutionStatus::Skipped);
        tx
    }

    #[tokio::test]
    async fn reorg_rolls_back_last_epoch() {
        let pivot_aa = B256::repeat_byte(0xAA);
        let side = B256::repeat_byte(0xA1);
        let mut chain = MockChain::linear(100, 100, 10, &[1]);
        chain.latest = 120;
        chain.epochs.insert(
            100,
            vec![block(100, B256::repeat_byte(0xCC), B256::repeat_byte(0xBB), 10, &[1])],
        );
        let client = Arc::new(MockClient::new("a", chain));
        let (mut engine, window) = engine(vec![client], 90, 10);

        engine.from_epoch = 100;
        engine.history.push(vec![B256::repeat_byte(0x01)]);
        engine.history.push(vec![side, pivot_aa]);
        window.push(BlockPriorityFee::new(98, B256::repeat_byte(0x01), 10, 0.5));
        window.push(BlockPriorityFee::new(99, side, 10, 0.5));
        window.push(BlockPriorityFee::new(99, pivot_aa, 10, 0.5));

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Reorged));
        assert_eq!(engine.from_epoch(), 99);
        assert_eq!(engine.history.len(), 1);
        assert_eq!(window.len(), 1);
        assert!(window.contains(&B256::repeat_byte(0x01)));
        assert!(!window.contains(&B256::repeat_byte(0xCC)));
    }

    #[tokio::test]
    async fn reorg_refetches_corrected_epoch() {
        let client = Arc::new(MockClient::new("a", MockChain::linear(1, 2, 10, &[1])));
        let (mut engine, window) = engine(vec![Arc::clone(&client)], 1, 10);
        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));

        // epoch 2 is replaced by a fork and epoch 3 builds on it
        {
            let mut chain = client.chain.lock();
            let fork2 = block_hash(2, 0, 1);
            chain.latest = 3;
            chain.epochs.insert(2, vec![block(2, fork2, block_hash(1, 0, 0), 10, &[5])]);
            chain.epochs.insert(3, vec![block(3, block_hash(3, 0, 1), fork2, 10, &[5])]);
        }

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Reorged));
        assert_eq!(engine.from_epoch(), 2);
        assert_eq!(window.len(), 1);
        assert!(!window.contains(&block_hash(2, 0, 0)));

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.sync().await, Ok(SyncOutcome::CaughtUp));
        assert!(window.contains(&block_hash(2, 0, 1)));
        assert!(window.contains(&block_hash(3, 0, 1)));
        assert_eq!(window.len(), 3);
    }

    #[tokio::test]
    async fn reorg_never_rewinds_past_start_epoch() {
        let mut chain = MockChain::linear(5, 5, 10, &[1]);
        let orphan = block(5, block_hash(5, 0, 0), B256::repeat_byte(0xBB), 10, &[]);
        chain.epochs.insert(5, vec![orphan]);
        let client = Arc::new(MockClient::new("a", chain));
        let (mut engine, _window) = engine(vec![client], 5, 10);
        engine.history.push(vec![B256::repeat_byte(0xAA)]);

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Reorged));
        assert_eq!(engine.from_epoch(), 5);
        assert!(engine.history.is_empty());
    }

    #[tokio::test]
    async fn pivot_switch_abandons_epoch() {
        let mut chain = MockChain::linear(1, 1, 10, &[1]);
        chain.hash_overrides.insert(1, vec![B256::repeat_byte(0x77)]);
        let client = Arc::new(MockClient::new("a", chain));
        let (mut engine, window) = engine(vec![client], 1, 10);

        let err = engine.sync().await.unwrap_err();
        assert!(matches!(err, SyncError::PivotSwitched { epoch: 1, .. }));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(engine.from_epoch(), 1);
        assert!(window.is_empty());
        assert!(engine.history.is_empty());
    }

    #[tokio::test]
    async fn empty_epoch_is_retried() {
        let mut chain = MockChain::linear(1, 1, 10, &[1]);
        chain.hash_overrides.insert(1, vec![]);
        let client = Arc::new(MockClient::new("a", chain));
        let (mut engine, window) = engine(vec![Arc::clone(&client)], 1, 10);

        let result = engine.sync().await;
        assert_eq!(result, Err(SyncError::EmptyEpoch(1)));
        assert!(matches!(
            StationStatus::from_sync_result(&result),
            StationStatus::SyncFailed(_)
        ));
        assert_eq!(engine.from_epoch(), 1);
        assert!(window.is_empty());
        assert!(engine.history.is_empty());

        client.chain.lock().hash_overrides.clear();
        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.from_epoch(), 2);
    }

    #[tokio::test]
    async fn fails_over_to_next_member() {
        let a = Arc::new(MockClient::failing("a", transport("refused")));
        let b = Arc::new(MockClient::failing("b", transport("timeout")));
        let c = Arc::new(MockClient::new("c", MockChain::linear(1, 5, 10, &[1])));
        let members = vec![Arc::clone(&a), Arc::clone(&b), Arc::clone(&c)];
        let (engine, _window) = engine(members, 1, 10);
        let preferred = Arc::new(PreferredClient::empty());
        let mut engine = engine.with_preferred(Arc::clone(&preferred));
        assert!(Arc::ptr_eq(&preferred.load().unwrap(), &a));

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.cli_index(), 2);
        assert_eq!((a.calls(), b.calls()), (1, 1));
        assert!(Arc::ptr_eq(&preferred.load().unwrap(), &c));
        assert!(Arc::ptr_eq(&engine.preferred(), &preferred));

        // member 0 recovers but the next attempt starts from member 2
        a.chain.lock().failure = None;
        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.cli_index(), 2);
        assert_eq!(a.calls(), 1);
    }

    #[tokio::test]
    async fn gives_up_after_one_pass() {
        let members: Vec<_> = ["a", "b", "c"]
            .iter()
            .map(|u| Arc::new(MockClient::failing(u, transport("down"))))
            .collect();
        let (mut engine, _window) = engine(members.clone(), 1, 10);
        engine.cli_index = 1;

        let err = engine.sync().await.unwrap_err();
        assert_eq!(err, SyncError::Client(transport("down")));
        assert_eq!(engine.cli_index(), 1);
        assert!(members.iter().all(|m| m.calls() == 1));
    }

    #[tokio::test]
    async fn protocol_error_stops_failover() {
        let rpc = ClientError::Rpc {
            code: -32602,
            message: "invalid epoch".into(),
        };
        let a = Arc::new(MockClient::failing("a", transport("down")));
        let b = Arc::new(MockClient::failing("b", rpc.clone()));
        let c = Arc::new(MockClient::new("c", MockChain::linear(1, 5, 10, &[1])));
        let (mut engine, _window) = engine(vec![a, b, Arc::clone(&c)], 1, 10);

        let result = engine.sync().await;
        assert_eq!(result, Err(SyncError::Client(rpc)));
        assert_eq!(StationStatus::from_sync_result(&result), StationStatus::Ok);
        assert_eq!(engine.cli_index(), 1);
        assert_eq!(engine.preferred().load().unwrap().node_url(), "b");
        assert_eq!(c.calls(), 0);
        assert_eq!(engine.from_epoch(), 1);
    }

    #[tokio::test]
    async fn empty_cluster_is_unavailable() {
        let (mut engine, _window) = engine(vec![], 1, 10);
        let result = engine.sync().await;
        assert_eq!(result, Err(SyncError::ClusterUnavailable));
        assert_eq!(
            StationStatus::from_sync_result(&result),
            StationStatus::ClientUnavailable
        );
    }

    #[tokio::test]
    async fn refresh_replaces_membership() {
        let (mut engine, _window) = engine(vec![], 1, 10);
        engine.cli_index = 4;

        let fresh = Arc::new(MockClient::new("fresh", MockChain::linear(1, 1, 10, &[1])));
        *engine.provider.members.lock() = vec![Arc::clone(&fresh)];
        engine.refresh_cluster().await.unwrap();

        assert_eq!(engine.sync().await, Ok(SyncOutcome::Advanced));
        assert_eq!(engine.cli_index(), 0);
        assert!(fresh.calls() > 0);

        *engine.provider.fail.lock() = true;
        assert!(engine.refresh_cluster().await.is_err());
        assert_eq!(engine.clients.len(), 1);
    }

    #[tokio::test]
    async fn run_loop_fills_window_and_reports_status() {
        let client = Arc::new(MockClient::new("a", MockChain::linear(1, 6, 10, &[3])));
        let window = Arc::new(PriorityFeeWindow::new(4));
        let status = Arc::new(StatusCell::new(StationStatus::ClientUnavailable));
        let engine = SyncEngine::new(
            GasStationConfig::default(),
            SharedCluster::new(vec![Arc::clone(&client)]),
            vec![client],
            0,
            1,
            Arc::clone(&window),
            Arc::clone(&status),
        );
        let task = tokio::spawn(engine.run());

        let deadline = Instant::now() + Duration::from_secs(5);
        let newest = |w: &PriorityFeeWindow| w.recent(1).first().map(|r| r.number());
        while newest(&window) != Some(6) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        task.abort();

        assert_eq!(newest(&window), Some(6));
        assert_eq!(window.len(), 4);
        assert!(status.load().is_operational());
    }
}
