use alloy::eips::BlockNumberOrTag;
use alloy::network::TransactionResponse;
use alloy::rpc::types::{Block, Transaction};
use alloy::transports::TransportError;
use alloy_consensus::Transaction as ConsensusTx;
use alloy_primitives::B256;
use alloy_provider::{Provider as ProviderTrait, RootProvider as AlloyProvider};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use url::Url;

use crate::error::{ClientError, ClusterError};
use crate::types::{BlockSummary, EpochBlock, EpochTransaction, ExecutionStatus};

/// Upstream full node as seen by the gas station.
#[async_trait]
pub trait EpochClient: Send + Sync + 'static {
    fn node_url(&self) -> &str;

    /// Latest confirmed epoch number.
    async fn latest_epoch_number(&self) -> Result<u64, ClientError>;

    /// Pivot block of `epoch`, with full transactions.
    async fn pivot_block(&self, epoch: u64) -> Result<EpochBlock, ClientError>;

    /// Hashes of all blocks in `epoch`, ordered, pivot last.
    async fn epoch_block_hashes(&self, epoch: u64) -> Result<Vec<B256>, ClientError>;

    /// Non-pivot block by hash, read consistently with `pivot` at `epoch`.
    async fn block_with_pivot_assumption(
        &self,
        hash: B256,
        pivot: B256,
        epoch: u64,
    ) -> Result<EpochBlock, ClientError>;

    /// Live priority fee suggested by the node.
    async fn max_priority_fee_per_gas(&self) -> Result<u128, ClientError>;

    /// Summary of the block at the latest confirmed epoch.
    async fn latest_block_summary(&self) -> Result<BlockSummary, ClientError>;
}

/// Source of the current full node cluster.
#[async_trait]
pub trait ClusterProvider: Send + Sync + 'static {
    type Client: EpochClient;

    async fn cluster(&self) -> Result<Vec<Arc<Self::Client>>, ClusterError>;
}

/// Cluster member the sync task currently prefers, shared with query callers.
#[derive(Debug)]
pub struct PreferredClient<C>(ArcSwapOption<C>);

impl<C> PreferredClient<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self(ArcSwapOption::new(Some(client)))
    }

    pub fn empty() -> Self {
        Self(ArcSwapOption::empty())
    }

    pub fn load(&self) -> Option<Arc<C>> {
        self.0.load_full()
    }

    pub fn store(&self, client: Arc<C>) {
        self.0.store(Some(client));
    }
}

impl<C> Default for PreferredClient<C> {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        match err.as_error_resp() {
            Some(payload) => ClientError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            None => ClientError::Transport(err.to_string()),
        }
    }
}

/// EVM JSON-RPC node. Every epoch holds exactly one block, which is its pivot.
pub struct RpcEpochClient {
    url: String,
    provider: AlloyProvider,
}

impl RpcEpochClient {
    pub fn new(rpc_url: &str) -> Result<Self, ClusterError> {
        let url = Url::parse(rpc_url).map_err(|source| ClusterError::InvalidUrl {
            url: rpc_url.to_string(),
            source,
        })?;
        let provider = AlloyProvider::new_http(url);
        Ok(Self {
            url: rpc_url.to_string(),
            provider,
        })
    }

    async fn block_by_number(&self, tag: BlockNumberOrTag) -> Result<Block, ClientError> {
        self.provider
            .get_block_by_number(tag)
            .full()
            .await?
            .ok_or_else(|| ClientError::MissingBlock(tag.to_string()))
    }
}

impl std::fmt::Debug for RpcEpochClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcEpochClient").field("url", &self.url).finish()
    }
}

fn convert_transaction(tx: &Transaction) -> EpochTransaction {
    // Legacy and access-list transactions only carry a gas price.
    let gas_price = ConsensusTx::gas_price(tx);
    EpochTransaction {
        hash: TransactionResponse::tx_hash(tx),
        block_hash: tx.block_hash,
        // inclusion implies execution on EVM chains
        status: tx.block_hash.map(|_| ExecutionStatus::Executed),
        max_priority_fee_per_gas: ConsensusTx::max_priority_fee_per_gas(tx),
        max_fee_per_gas: gas_price.is_none().then(|| ConsensusTx::max_fee_per_gas(tx)),
        gas_price,
    }
}

fn convert_block(block: &Block) -> EpochBlock {
    EpochBlock {
        number: block.header.number,
        epoch_number: block.header.number,
        hash: block.header.hash,
        parent_hash: block.header.parent_hash,
        base_fee_per_gas: block.header.base_fee_per_gas.map(u128::from).unwrap_or_default(),
        gas_used: block.header.gas_used,
        gas_limit: block.header.gas_limit,
        transactions: block.transactions.txns().map(convert_transaction).collect(),
    }
}

#[async_trait]
impl EpochClient for RpcEpochClient {
    fn node_url(&self) -> &str {
        &self.url
    }

    async fn latest_epoch_number(&self) -> Result<u64, ClientError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn pivot_block(&self, epoch: u64) -> Result<EpochBlock, ClientError> {
        let block = self.block_by_number(BlockNumberOrTag::Number(epoch)).await?;
        Ok(convert_block(&block))
    }

    async fn epoch_block_hashes(&self, epoch: u64) -> Result<Vec<B256>, ClientError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(epoch))
            .await?
            .ok_or_else(|| ClientError::MissingBlock(epoch.to_string()))?;
        Ok(vec![block.header.hash])
    }

    async fn block_with_pivot_assumption(
        &self,
        hash: B256,
        pivot: B256,
        epoch: u64,
    ) -> Result<EpochBlock, ClientError> {
        let block = self
            .provider
            .get_block_by_hash(hash)
            .full()
            .await?
            .ok_or_else(|| ClientError::MissingBlock(hash.to_string()))?;

        if block.header.number != epoch {
            return Err(ClientError::InconsistentRead(format!(
                "block {} is at {}, assumed epoch {} with pivot {}",
                hash, block.header.number, epoch, pivot
            )));
        }
        Ok(convert_block(&block))
    }

    async fn max_priority_fee_per_gas(&self) -> Result<u128, ClientError> {
        Ok(self.provider.get_max_priority_fee_per_gas().await?)
    }

    async fn latest_block_summary(&self) -> Result<BlockSummary, ClientError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await?
            .ok_or_else(|| ClientError::MissingBlock("latest".to_string()))?;
        Ok(BlockSummary {
            number: block.header.number,
            hash: block.header.hash,
            base_fee_per_gas: block.header.base_fee_per_gas.map(u128::from).unwrap_or_default(),
        })
    }
}

/// Fixed cluster handed over at construction.
#[derive(Debug)]
pub struct StaticCluster<C> {
    clients: Vec<Arc<C>>,
}

impl<C> StaticCluster<C> {
    pub fn new(clients: Vec<Arc<C>>) -> Self {
        Self { clients }
    }
}

impl StaticCluster<RpcEpochClient> {
    pub fn from_urls<S: AsRef<str>>(urls: &[S]) -> Result<Self, ClusterError> {
        let clients = urls
            .iter()
            .map(|u| RpcEpochClient::new(u.as_ref()).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(clients))
    }
}

#[async_trait]
impl<C: EpochClient> ClusterProvider for StaticCluster<C> {
    type Client = C;

    async fn cluster(&self) -> Result<Vec<Arc<C>>, ClusterError> {
        Ok(self.clients.clone())
    }
}

/// Cluster listed as a JSON array of node URLs in a file, re-read on every
/// refresh so membership can change at runtime.
#[derive(Debug, Clone)]
pub struct FileCluster {
    path: PathBuf,
}

impl FileCluster {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub async fn urls(&self) -> Result<Vec<String>, ClusterError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| ClusterError::Read {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&raw).map_err(|source| ClusterError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

#[async_trait]
impl ClusterProvider for FileCluster {
    type Client = RpcEpochClient;

    async fn cluster(&self) -> Result<Vec<Arc<RpcEpochClient>>, ClusterError> {
        let urls = self.urls().await?;
        let cluster = StaticCluster::from_urls(&urls)?;
        Ok(cluster.clients)
    }
}
