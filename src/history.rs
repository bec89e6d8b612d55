//! Per-epoch block hash history used to detect reorgs.
use alloy_primitives::B256;
use std::collections::VecDeque;

use crate::config::MAX_CACHED_BLOCK_HASH_EPOCHS;

/// Ring of block-hash lists, one per synced epoch, oldest at the front.
/// The last hash of each list is that epoch's pivot block.
#[derive(Debug, Clone)]
pub struct EpochHashHistory {
    epochs: VecDeque<Vec<B256>>,
    capacity: usize,
}

impl Default for EpochHashHistory {
    fn default() -> Self {
        Self::with_capacity(MAX_CACHED_BLOCK_HASH_EPOCHS)
    }
}

impl EpochHashHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            epochs: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Record a newly synced epoch, evicting the oldest one past capacity.
    pub fn push(&mut self, block_hashes: Vec<B256>) {
        self.epochs.push_back(block_hashes);
        while self.epochs.len() > self.capacity {
            self.epochs.pop_front();
        }
    }

    /// Remove and return the most recently synced epoch.
    pub fn pop(&mut self) -> Option<Vec<B256>> {
        self.epochs.pop_back()
    }

    /// Pivot hash of the most recently synced epoch.
    pub fn prev_pivot_hash(&self) -> Option<B256> {
        self.epochs.back().and_then(|hashes| hashes.last().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(b: u8) -> B256 {
        B256::repeat_byte(b)
    }

    #[test]
    fn tracks_latest_pivot() {
        let mut history = EpochHashHistory::default();
        assert_eq!(history.prev_pivot_hash(), None);

        history.push(vec![h(1), h(2)]);
        history.push(vec![h(3)]);
        assert_eq!(history.prev_pivot_hash(), Some(h(3)));

        assert_eq!(history.pop(), Some(vec![h(3)]));
        assert_eq!(history.prev_pivot_hash(), Some(h(2)));
    }

    #[test]
    fn evicts_oldest_over_capacity() {
        let mut history = EpochHashHistory::with_capacity(2);
        history.push(vec![h(1)]);
        history.push(vec![h(2)]);
        history.push(vec![h(3)]);
        assert_eq!(history.len(), 2);

        assert_eq!(history.pop(), Some(vec![h(3)]));
        assert_eq!(history.pop(), Some(vec![h(2)]));
        assert_eq!(history.pop(), None);
    }
}
