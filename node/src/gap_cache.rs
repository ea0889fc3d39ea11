//! Gap cache.
//!
//! Blocks that arrived with a missing dependency wait in `unchecked`; this
//! cache additionally tallies votes seen for them. Once enough weight backs
//! a block we cannot connect, the local chain is probably behind and a
//! bootstrap attempt is scheduled.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use raze_ledger::{Block, Vote};
use raze_types::{Account, Amount, BlockHash, Network};

use crate::node::Node;

/// Entry capacity; the oldest entry is evicted first.
const MAX_ENTRIES: usize = 256;
/// Entries older than this are purged.
const ENTRY_LIFETIME: Duration = Duration::from_secs(10);

struct GapEntry {
    arrival: Instant,
    votes: HashMap<Account, Arc<Vote>>,
}

#[derive(Default)]
struct GapState {
    entries: HashMap<BlockHash, GapEntry>,
    order: VecDeque<BlockHash>,
}

/// Vote-weighted cache of unconnectable blocks.
pub struct GapCache {
    node: Weak<Node>,
    state: Mutex<GapState>,
}

impl GapCache {
    pub fn new(node: Weak<Node>) -> Self {
        Self {
            node,
            state: Mutex::new(GapState::default()),
        }
    }

    /// Track a gapped block, refreshing its arrival time when re-seen.
    pub fn add(&self, block: &Arc<Block>) {
        let hash = block.hash();
        let mut state = self.state.lock().expect("gap cache poisoned");
        match state.entries.get_mut(&hash) {
            Some(entry) => entry.arrival = Instant::now(),
            None => {
                state.entries.insert(
                    hash,
                    GapEntry {
                        arrival: Instant::now(),
                        votes: HashMap::new(),
                    },
                );
                state.order.push_back(hash);
                if state.order.len() > MAX_ENTRIES {
                    if let Some(oldest) = state.order.pop_front() {
                        state.entries.remove(&oldest);
                    }
                }
            }
        }
    }

    /// A processed block is no longer a gap.
    pub fn erase(&self, hash: &BlockHash) {
        let mut state = self.state.lock().expect("gap cache poisoned");
        if state.entries.remove(hash).is_some() {
            state.order.retain(|entry| entry != hash);
        }
    }

    /// Accumulate an observed vote. When the tallied weight for a tracked
    /// block passes the bootstrap threshold, schedule a check: if the block
    /// is still missing after the delay, start bootstrapping.
    pub fn vote(&self, vote: &Arc<Vote>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let hash = vote.block.hash();
        let tallied = {
            let mut state = self.state.lock().expect("gap cache poisoned");
            let Some(entry) = state.entries.get_mut(&hash) else {
                return;
            };
            entry.votes.insert(vote.account, vote.clone());
            let txn = match node.store.tx_begin_read() {
                Ok(txn) => txn,
                Err(_) => return,
            };
            node.ledger
                .winner(&txn, &entry.votes)
                .ok()
                .flatten()
                .map(|(weight, _)| weight)
                .unwrap_or(Amount::ZERO)
        };

        let threshold = match self.bootstrap_threshold(&node) {
            Some(threshold) => threshold,
            None => return,
        };
        if tallied > threshold {
            let delay = if node.config.network == Network::Test {
                Duration::from_millis(5)
            } else {
                Duration::from_secs(5)
            };
            let node_w = Weak::clone(&self.node);
            node.alarm.add(Instant::now() + delay, move || {
                let Some(node) = node_w.upgrade() else {
                    return;
                };
                let missing = node
                    .store
                    .tx_begin_read()
                    .and_then(|txn| node.store.block_exists(&txn, &hash))
                    .map(|exists| !exists)
                    .unwrap_or(false);
                if missing {
                    if !node.bootstrap.in_progress() {
                        tracing::info!(block = %hash, "missing block confirmed by vote weight");
                    }
                    node.bootstrap.bootstrap();
                }
            });
        }
    }

    /// `supply / 256 * bootstrap_fraction_numerator`.
    fn bootstrap_threshold(&self, node: &Arc<Node>) -> Option<Amount> {
        let txn = node.store.tx_begin_read().ok()?;
        let supply = node.ledger.supply(&txn).ok()?;
        Some(Amount::new(
            supply.raw() / 256 * node.config.bootstrap_fraction_numerator as u128,
        ))
    }

    /// Drop entries older than the lifetime window.
    pub fn purge_old(&self) {
        let cutoff = Instant::now() - ENTRY_LIFETIME;
        let mut state = self.state.lock().expect("gap cache poisoned");
        let expired: Vec<BlockHash> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.arrival < cutoff)
            .map(|(hash, _)| *hash)
            .collect();
        for hash in &expired {
            state.entries.remove(hash);
        }
        if !expired.is_empty() {
            state.order.retain(|hash| !expired.contains(hash));
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("gap cache poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_ledger::SendBlock;
    use raze_types::Signature;

    fn cache() -> GapCache {
        GapCache::new(Weak::new())
    }

    fn block(previous: u8) -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([previous; 32]),
            destination: Account::new([2; 32]),
            balance: Amount::new(1),
            signature: Signature([3; 64]),
            work: 0,
        }))
    }

    #[test]
    fn add_and_erase() {
        let cache = cache();
        let b = block(1);
        cache.add(&b);
        assert_eq!(cache.len(), 1);
        cache.add(&b);
        assert_eq!(cache.len(), 1);
        cache.erase(&b.hash());
        assert!(cache.is_empty());
    }

    #[test]
    fn capacity_evicts_oldest_not_newest() {
        let cache = cache();
        let mut blocks = Vec::new();
        for i in 0..=MAX_ENTRIES {
            let b = block((i % 251) as u8);
            // Vary the destination too so every hash is distinct.
            let b = match &*b {
                Block::Send(send) => {
                    let mut send = send.clone();
                    send.balance = Amount::new(i as u128);
                    Arc::new(Block::Send(send))
                }
                _ => unreachable!(),
            };
            cache.add(&b);
            blocks.push(b);
        }
        assert_eq!(cache.len(), MAX_ENTRIES);
        // The first inserted entry was evicted; the newest survives.
        let mut state = cache.state.lock().unwrap();
        assert!(!state.entries.contains_key(&blocks[0].hash()));
        assert!(state.entries.contains_key(&blocks[MAX_ENTRIES].hash()));
        state.entries.clear();
    }

    #[test]
    fn purge_removes_only_expired() {
        let cache = cache();
        let b = block(1);
        cache.add(&b);
        {
            let mut state = cache.state.lock().unwrap();
            state.entries.get_mut(&b.hash()).unwrap().arrival =
                Instant::now() - ENTRY_LIFETIME - Duration::from_secs(1);
        }
        let fresh = block(2);
        cache.add(&fresh);
        cache.purge_old();
        assert_eq!(cache.len(), 1);
        assert!(cache.state.lock().unwrap().entries.contains_key(&fresh.hash()));
    }
}
