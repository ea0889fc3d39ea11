//! Bootstrap seam.
//!
//! The bulk-pull subsystem fetches whole chains over TCP and lives outside
//! this crate. The node still needs somewhere to aim its "we are behind"
//! signals: gap-cache threshold hits, lonely elections and forks on
//! non-gossip blocks all land here, where they select a target peer and are
//! queued for the puller.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};

use raze_ledger::Block;

use crate::node::Node;

/// Forks retained for the puller; older ones are displaced first.
const MAX_PENDING_FORKS: usize = 64;

pub struct BootstrapInitiator {
    node: Weak<Node>,
    attempts: AtomicU64,
    pending_forks: Mutex<VecDeque<std::sync::Arc<Block>>>,
}

impl BootstrapInitiator {
    pub fn new(node: Weak<Node>) -> Self {
        Self {
            node,
            attempts: AtomicU64::new(0),
            pending_forks: Mutex::new(VecDeque::new()),
        }
    }

    /// Select a bootstrap-capable peer and record the attempt for the
    /// external puller.
    pub fn bootstrap(&self) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        self.attempts.fetch_add(1, Ordering::Relaxed);
        match node.peers.bootstrap_peer() {
            Some(endpoint) => {
                tracing::info!(peer = %endpoint, "bootstrap attempt queued");
            }
            None => {
                tracing::debug!("bootstrap requested with no eligible peers");
            }
        }
    }

    /// The puller is never raced by the gossip path; queueing is enough.
    pub fn in_progress(&self) -> bool {
        false
    }

    /// Hand a fork that did not arrive over gossip to the puller so the
    /// competing chain can be fetched and resolved.
    pub fn process_fork(&self, block: std::sync::Arc<Block>) {
        let mut forks = self.pending_forks.lock().expect("bootstrap poisoned");
        if forks.len() >= MAX_PENDING_FORKS {
            forks.pop_front();
        }
        tracing::debug!(root = %block.root(), "fork queued for bootstrap resolution");
        forks.push_back(block);
        drop(forks);
        self.bootstrap();
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Forks waiting for the external puller.
    pub fn pending_fork_count(&self) -> usize {
        self.pending_forks.lock().expect("bootstrap poisoned").len()
    }

    pub fn stop(&self) {
        self.pending_forks.lock().expect("bootstrap poisoned").clear();
    }
}
