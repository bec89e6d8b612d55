//! Scripted in-memory chain and cluster for engine and station tests.
use alloy_primitives::B256;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::client::{ClusterProvider, EpochClient};
use crate::error::{ClientError, ClusterError};
use crate::types::{BlockSummary, EpochBlock, EpochTransaction, ExecutionStatus};

/// Hash of block `idx` in `epoch` on fork `fork`.
pub fn block_hash(epoch: u64, idx: u8, fork: u8) -> B256 {
    let mut b = [0u8; 32];
    b[..8].copy_from_slice(&epoch.to_be_bytes());
    b[8] = idx;
    b[31] = fork;
    B256::from(b)
}

pub fn tip_tx(block: B256, n: u8, tip: u128) -> EpochTransaction {
    EpochTransaction {
        hash: B256::repeat_byte(n),
        block_hash: Some(block),
        status: Some(ExecutionStatus::Executed),
        max_priority_fee_per_gas: Some(tip),
        max_fee_per_gas: None,
        gas_price: None,
    }
}

pub fn block(epoch: u64, hash: B256, parent: B256, base_fee: u128, tips: &[u128]) -> EpochBlock {
    EpochBlock {
        number: epoch,
        epoch_number: epoch,
        hash,
        parent_hash: parent,
        base_fee_per_gas: base_fee,
        gas_used: 15_000_000,
        gas_limit: 30_000_000,
        transactions: tips
            .iter()
            .enumerate()
            .map(|(i, tip)| tip_tx(hash, i as u8, *tip))
            .collect(),
    }
}

#[derive(Debug, Default)]
pub struct MockChain {
    pub latest: u64,
    /// Blocks per epoch, pivot last
    pub epochs: HashMap<u64, Vec<EpochBlock>>,
    /// Replaces the reported hash list of an epoch
    pub hash_overrides: HashMap<u64, Vec<B256>>,
    /// When set, every call fails with this error
    pub failure: Option<ClientError>,
    pub oracle_fee: u128,
    pub base_fee: u128,
}

impl MockChain {
    /// One single-block epoch per number in `from..=to`, each linked to the
    /// previous, all with the same base fee and tips.
    pub fn linear(from: u64, to: u64, base_fee: u128, tips: &[u128]) -> Self {
        let mut chain = MockChain {
            latest: to,
            oracle_fee: 7,
            base_fee,
            ..Default::default()
        };
        for epoch in from..=to {
            let parent = block_hash(epoch.saturating_sub(1), 0, 0);
            let b = block(epoch, block_hash(epoch, 0, 0), parent, base_fee, tips);
            chain.epochs.insert(epoch, vec![b]);
        }
        chain
    }

    fn check(&self) -> Result<(), ClientError> {
        match &self.failure {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
pub struct MockClient {
    url: String,
    pub chain: Mutex<MockChain>,
    calls: AtomicUsize,
}

impl MockClient {
    pub fn new(url: &str, chain: MockChain) -> Self {
        Self {
            url: url.to_string(),
            chain: Mutex::new(chain),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(url: &str, err: ClientError) -> Self {
        Self::new(
            url,
            MockChain {
                failure: Some(err),
                ..Default::default()
            },
        )
    }

    /// Number of upstream calls served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<parking_lot::MutexGuard<'_, MockChain>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let chain = self.chain.lock();
        chain.check()?;
        Ok(chain)
    }
}

fn missing(what: impl ToString) -> ClientError {
    ClientError::MissingBlock(what.to_string())
}

#[async_trait]
impl EpochClient for MockClient {
    fn node_url(&self) -> &str {
        &self.url
    }

    async fn latest_epoch_number(&self) -> Result<u64, ClientError> {
        Ok(self.enter()?.latest)
    }

    async fn pivot_block(&self, epoch: u64) -> Result<EpochBlock, ClientError> {
        let chain = self.enter()?;
        chain
            .epochs
            .get(&epoch)
            .and_then(|blocks| blocks.last().cloned())
            .ok_or_else(|| missing(epoch))
    }

    async fn epoch_block_hashes(&self, epoch: u64) -> Result<Vec<B256>, ClientError> {
        let chain = self.enter()?;
        if let Some(hashes) = chain.hash_overrides.get(&epoch) {
            return Ok(hashes.clone());
        }
        chain
            .epochs
            .get(&epoch)
            .map(|blocks| blocks.iter().map(|b| b.hash).collect())
            .ok_or_else(|| missing(epoch))
    }

    async fn block_with_pivot_assumption(
        &self,
        hash: B256,
        _pivot: B256,
        epoch: u64,
    ) -> Result<EpochBlock, ClientError> {
        let chain = self.enter()?;
        chain
            .epochs
            .get(&epoch)
            .and_then(|blocks| blocks.iter().find(|b| b.hash == hash).cloned())
            .ok_or_else(|| missing(hash))
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128, ClientError> {
        Ok(self.enter()?.oracle_fee)
    }

    async fn latest_block_summary(&self) -> Result<BlockSummary, ClientError> {
        let chain = self.enter()?;
        Ok(BlockSummary {
            number: chain.latest,
            hash: block_hash(chain.latest, 0, 0),
            base_fee_per_gas: chain.base_fee,
        })
    }
}

/// Cluster whose membership tests can swap at will.
#[derive(Debug, Default)]
pub struct SharedCluster {
    pub members: Mutex<Vec<Arc<MockClient>>>,
    pub fail: Mutex<bool>,
}

impl SharedCluster {
    pub fn new(members: Vec<Arc<MockClient>>) -> Self {
        Self {
            members: Mutex::new(members),
            fail: Mutex::new(false),
        }
    }
}

#[async_trait]
impl ClusterProvider for SharedCluster {
    type Client = MockClient;

    async fn cluster(&self) -> Result<Vec<Arc<MockClient>>, ClusterError> {
        if *self.fail.lock() {
            return Err(ClusterError::Read {
                path: "cluster.json".into(),
                source: std::io::Error::other("unavailable"),
            });
        }
        Ok(self.members.lock().clone())
    }
}
