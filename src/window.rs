//! Bounded window of recent block priority fees.
use alloy_primitives::B256;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::stats::{self, GasFeeStats};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxnPriorityFee {
    pub hash: B256,
    pub tip: u128,
}

/// Priority fee record of a single block. Tips are kept in ascending order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPriorityFee {
    number: u64,
    hash: B256,
    base_fee: u128,
    gas_used_ratio: f64,
    txn_tips: Vec<TxnPriorityFee>,
}

impl BlockPriorityFee {
    pub fn new(number: u64, hash: B256, base_fee: u128, gas_used_ratio: f64) -> Self {
        Self {
            number,
            hash,
            base_fee,
            gas_used_ratio,
            txn_tips: Vec::new(),
        }
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn hash(&self) -> B256 {
        self.hash
    }

    pub fn base_fee(&self) -> u128 {
        self.base_fee
    }

    pub fn gas_used_ratio(&self) -> f64 {
        self.gas_used_ratio
    }

    pub fn txn_tips(&self) -> &[TxnPriorityFee] {
        &self.txn_tips
    }

    pub fn tips(&self) -> impl Iterator<Item = u128> + '_ {
        self.txn_tips.iter().map(|t| t.tip)
    }

    pub fn append(&mut self, tips: impl IntoIterator<Item = TxnPriorityFee>) {
        self.txn_tips.extend(tips);
        self.txn_tips.sort_by_key(|t| t.tip);
    }

    /// Tip at percentile `p` of this block alone.
    pub fn percentile(&self, p: f64) -> Option<u128> {
        let sorted: Vec<u128> = self.tips().collect();
        stats::percentile(&sorted, p)
    }
}

#[derive(Debug)]
struct WindowInner {
    capacity: usize,
    next_seq: u64,
    /// Records keyed by insertion sequence, oldest first
    records: BTreeMap<u64, BlockPriorityFee>,
    seq_by_hash: HashMap<B256, u64>,
}

impl WindowInner {
    fn remove_hash(&mut self, hash: &B256) -> Option<BlockPriorityFee> {
        let seq = self.seq_by_hash.remove(hash)?;
        self.records.remove(&seq)
    }
}

/// Fixed-capacity, insertion-ordered cache of block fee records. Every
/// operation holds the lock for its whole duration, so readers never see a
/// partial insert or eviction.
#[derive(Debug)]
pub struct PriorityFeeWindow {
    inner: Mutex<WindowInner>,
}

impl PriorityFeeWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(WindowInner {
                capacity,
                next_seq: 0,
                records: BTreeMap::new(),
                seq_by_hash: HashMap::with_capacity(capacity),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert at the newest end, evicting the oldest records past capacity.
    /// A record with an already-known hash replaces the old one.
    pub fn push(&self, record: BlockPriorityFee) {
        let mut inner = self.inner.lock();
        inner.remove_hash(&record.hash);

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.seq_by_hash.insert(record.hash, seq);
        inner.records.insert(seq, record);

        while inner.records.len() > inner.capacity {
            match inner.records.pop_first() {
                Some((_, evicted)) => {
                    inner.seq_by_hash.remove(&evicted.hash);
                }
                None => break,
            }
        }
    }

    /// Remove every record whose hash is in `hashes`, wherever it sits.
    /// Returns the number of records removed.
    pub fn remove<'a>(&self, hashes: impl IntoIterator<Item = &'a B256>) -> usize {
        let wanted: HashSet<&B256> = hashes.into_iter().collect();
        let mut inner = self.inner.lock();
        wanted
            .into_iter()
            .filter(|hash| inner.remove_hash(hash).is_some())
            .count()
    }

    pub fn contains(&self, hash: &B256) -> bool {
        self.inner.lock().seq_by_hash.contains_key(hash)
    }

    /// Up to `limit` records, newest first.
    pub fn recent(&self, limit: usize) -> Vec<BlockPriorityFee> {
        let inner = self.inner.lock();
        inner.records.values().rev().take(limit).cloned().collect()
    }

    pub fn calculate(&self, percentiles: &[f64; 3], trend_deadband: f64) -> GasFeeStats {
        let inner = self.inner.lock();
        let records: Vec<&BlockPriorityFee> = inner.records.values().collect();
        stats::calculate(&records, percentiles, trend_deadband)
    }
}
