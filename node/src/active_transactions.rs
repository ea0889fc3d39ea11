//! Per-root elections.
//!
//! Every disputed root gets an election collecting one vote per
//! representative. Votes re-tally on arrival; quorum confirms immediately,
//! otherwise the periodic announcement loop republishes the current winner
//! and forces a cutoff after a bounded number of rounds. One mutex covers
//! the whole conflict table.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use raze_ledger::{Block, Vote};
use raze_types::{Account, Amount, BlockHash};

use crate::block_processor::BlockProcessorItem;
use crate::node::Node;

/// Time between announcement rounds.
pub const ANNOUNCE_INTERVAL: Duration = Duration::from_secs(16);
/// Rounds a root is announced before the forced cutoff.
pub const CONTIGUOUS_ANNOUNCEMENTS: u32 = 4;
/// Roots serviced per round; the remainder restarts from zero announcements.
pub const ANNOUNCEMENTS_PER_INTERVAL: usize = 20;

/// Invoked once per election with the winner and whether the tally cleared
/// the minimum threshold.
pub type ConfirmationAction = Arc<dyn Fn(Arc<Block>, bool) + Send + Sync>;

/// Voting state for a single root.
pub struct Election {
    pub root: BlockHash,
    votes: HashMap<Account, Arc<Vote>>,
    last_winner: Arc<Block>,
    last_republish: Instant,
    confirmed: bool,
    confirmation_action: ConfirmationAction,
}

impl Election {
    fn new(node: &Arc<Node>, block: Arc<Block>, confirmation_action: ConfirmationAction) -> Self {
        let mut election = Self {
            root: block.root(),
            votes: HashMap::new(),
            last_winner: block,
            last_republish: Instant::now(),
            confirmed: false,
            confirmation_action,
        };
        election.compute_own_votes(node);
        election
    }

    /// Seed the tally with this node's own representative votes.
    fn compute_own_votes(&mut self, node: &Arc<Node>) {
        if !node.config.enable_voting {
            return;
        }
        let representatives = {
            let Ok(txn) = node.store.tx_begin_read() else {
                return;
            };
            node.wallets.representatives(&txn, &node.ledger)
        };
        if representatives.is_empty() {
            return;
        }
        let Ok(mut txn) = node.store.tx_begin_write() else {
            return;
        };
        for keypair in &representatives {
            match node
                .ledger
                .vote_generate(&mut txn, keypair, self.last_winner.clone())
            {
                Ok(vote) => {
                    self.votes.insert(keypair.public, vote);
                }
                Err(error) => tracing::error!(%error, "own vote generation failed"),
            }
        }
        if let Err(error) = txn.commit() {
            tracing::error!(%error, "own vote commit failed");
        }
    }

    pub fn last_winner(&self) -> &Arc<Block> {
        &self.last_winner
    }

    pub fn vote_count(&self) -> usize {
        self.votes.len()
    }

    /// Absorb a validated vote; a stale sequence for a rep already counted
    /// never displaces the fresher one.
    fn vote(&mut self, node: &Arc<Node>, vote: Arc<Vote>) {
        node.network.republish_vote(self.last_republish, &vote);
        self.last_republish = Instant::now();
        match self.votes.get(&vote.account) {
            Some(existing) if existing.sequence >= vote.sequence => {}
            _ => {
                self.votes.insert(vote.account, vote);
            }
        }
        self.confirm_if_quorum(node);
    }

    fn thresholds(&self, node: &Arc<Node>) -> Option<(Amount, Amount)> {
        let txn = node.store.tx_begin_read().ok()?;
        let supply = node.ledger.supply(&txn).ok()?;
        Some((
            Amount::new(supply.raw() / 2),
            Amount::new(supply.raw() / 16),
        ))
    }

    fn tally(&self, node: &Arc<Node>) -> Vec<(Amount, Arc<Block>)> {
        let Ok(txn) = node.store.tx_begin_read() else {
            return Vec::new();
        };
        node.ledger.tally(&txn, &self.votes).unwrap_or_default()
    }

    fn have_quorum(&self, node: &Arc<Node>) -> bool {
        let Some((quorum_threshold, _)) = self.thresholds(node) else {
            return false;
        };
        self.tally(node)
            .first()
            .map(|(weight, _)| *weight > quorum_threshold)
            .unwrap_or(false)
    }

    fn confirm_if_quorum(&mut self, node: &Arc<Node>) {
        if self.have_quorum(node) {
            self.confirm_once(node);
        }
    }

    /// Settle the election. Observationally a no-op after the first call.
    fn confirm_once(&mut self, node: &Arc<Node>) {
        if self.confirmed {
            return;
        }
        self.confirmed = true;

        let tally = self.tally(node);
        let minimum_threshold = self
            .thresholds(node)
            .map(|(_, minimum)| minimum)
            .unwrap_or(Amount::ZERO);
        let mut exceeded_minimum = false;
        if let Some((winner_weight, winner)) = tally.first() {
            exceeded_minimum = *winner_weight > minimum_threshold;
            if winner.hash() != self.last_winner.hash() {
                if exceeded_minimum {
                    // Overwrite the losing chain with the network's choice.
                    node.block_processor
                        .add(BlockProcessorItem::forced(winner.clone()));
                    self.last_winner = winner.clone();
                } else {
                    // Too little weight to flip the ledger; we are probably
                    // partitioned from the network.
                    tracing::info!(block = %self.last_winner.hash(), "retaining block");
                }
            }
        }

        let winner = self.last_winner.clone();
        let action = Arc::clone(&self.confirmation_action);
        let node_l = Arc::clone(node);
        node.background(move || {
            node_l.process_confirmed(&winner);
            action(winner, exceeded_minimum);
        });
    }

    /// Forced settlement at the end of the announcement window.
    fn confirm_cutoff(&mut self, node: &Arc<Node>) {
        if node.config.log_detail.vote {
            tracing::debug!(root = %self.root, "election cutoff");
            for (account, vote) in &self.votes {
                tracing::debug!(rep = %account, block = %vote.block.hash(), "tallied vote");
            }
        }
        self.confirm_once(node);
    }
}

struct ConflictInfo {
    election: Election,
    announcements: u32,
}

#[derive(Default)]
struct ActiveState {
    roots: HashMap<BlockHash, ConflictInfo>,
    /// Insertion order; announcement rounds walk it front to back.
    order: VecDeque<BlockHash>,
}

/// The conflict table and announcement loop.
pub struct ActiveTransactions {
    node: Weak<Node>,
    state: Mutex<ActiveState>,
}

impl ActiveTransactions {
    pub fn new(node: Weak<Node>) -> Self {
        Self {
            node,
            state: Mutex::new(ActiveState::default()),
        }
    }

    /// Open an election for the block's root. Returns `true` when one
    /// already existed.
    pub fn start(&self, block: Arc<Block>, confirmation_action: ConfirmationAction) -> bool {
        let Some(node) = self.node.upgrade() else {
            return true;
        };
        let root = block.root();
        let mut state = self.state.lock().expect("active poisoned");
        if state.roots.contains_key(&root) {
            return true;
        }
        let election = Election::new(&node, block, confirmation_action);
        state.roots.insert(
            root,
            ConflictInfo {
                election,
                announcements: 0,
            },
        );
        state.order.push_back(root);
        false
    }

    /// Route a validated vote to the election over its block's root.
    pub fn vote(&self, vote: Arc<Vote>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let root = vote.block.root();
        let mut state = self.state.lock().expect("active poisoned");
        if let Some(info) = state.roots.get_mut(&root) {
            info.election.vote(&node, vote);
        }
    }

    /// Whether a conflict over the block's root is being worked.
    pub fn active(&self, block: &Block) -> bool {
        self.state
            .lock()
            .expect("active poisoned")
            .roots
            .contains_key(&block.root())
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("active poisoned").roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One announcement round; reschedules itself.
    pub fn announce_votes(&self) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let mut inactive: Vec<BlockHash> = Vec::new();
        {
            let mut state = self.state.lock().expect("active poisoned");
            let order: Vec<BlockHash> = state.order.iter().copied().collect();
            let mut announced = 0usize;
            for root in order {
                let Some(info) = state.roots.get_mut(&root) else {
                    continue;
                };
                if announced < ANNOUNCEMENTS_PER_INTERVAL {
                    let winner = info.election.last_winner.clone();
                    let node_l = Arc::clone(&node);
                    node.background(move || node_l.network.republish_block(&winner));
                    if info.announcements >= CONTIGUOUS_ANNOUNCEMENTS - 1 {
                        // The confirmation window for this fork is over.
                        info.election.confirm_cutoff(&node);
                        inactive.push(root);
                    } else {
                        info.announcements += 1;
                        // A round passed and nobody but us voted: we are
                        // probably missing the competing chain.
                        if info.announcements > 1 && info.election.votes.len() <= 1 {
                            node.bootstrap.bootstrap();
                        }
                    }
                    announced += 1;
                } else {
                    // Rate limit against fork floods: everything beyond the
                    // per-round quota starts over.
                    info.announcements = 0;
                }
            }
            for root in &inactive {
                state.roots.remove(root);
                state.order.retain(|entry| entry != root);
            }
        }
        let node_w = Weak::clone(&self.node);
        node.alarm.add(Instant::now() + ANNOUNCE_INTERVAL, move || {
            if let Some(node) = node_w.upgrade() {
                node.active.announce_votes();
            }
        });
    }

    pub fn stop(&self) {
        let mut state = self.state.lock().expect("active poisoned");
        state.roots.clear();
        state.order.clear();
    }
}
