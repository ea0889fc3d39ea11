//! Block ingestion pipeline.
//!
//! A single consumer thread serializes all ledger mutations. Each drain
//! batch runs under one write transaction bounded by a wall-clock cutoff so
//! the write lock is released regularly; accepted blocks fan out to
//! observers after the batch commits. Children waiting in `unchecked` are
//! pushed to the front of the working queue, unwinding dependency chains in
//! the same batch where their dependency landed.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

use heed::RwTxn;

use raze_ledger::Block;
use raze_types::BlockHash;
use raze_work::work_value;

use crate::ledger::{ProcessResult, ProcessReturn};
use crate::node::Node;

/// How long one batch may hold the write transaction.
const BATCH_CUTOFF: Duration = Duration::from_millis(500);

/// One queued submission.
#[derive(Clone)]
pub struct BlockProcessorItem {
    pub block: Arc<Block>,
    pub force: bool,
}

impl BlockProcessorItem {
    pub fn new(block: Arc<Block>) -> Self {
        Self {
            block,
            force: false,
        }
    }

    /// Forced items roll back a competing chain before application; this is
    /// how elections overwrite a losing fork.
    pub fn forced(block: Arc<Block>) -> Self {
        Self { block, force: true }
    }
}

struct ProcessorState {
    blocks: VecDeque<BlockProcessorItem>,
    stopped: bool,
    idle: bool,
}

/// Serializer of all ledger mutations.
pub struct BlockProcessor {
    node: Weak<Node>,
    state: Mutex<ProcessorState>,
    condition: Condvar,
}

impl BlockProcessor {
    pub fn new(node: Weak<Node>) -> Self {
        Self {
            node,
            state: Mutex::new(ProcessorState {
                blocks: VecDeque::new(),
                stopped: false,
                idle: true,
            }),
            condition: Condvar::new(),
        }
    }

    /// Enqueue a block for processing.
    pub fn add(&self, item: BlockProcessorItem) {
        let mut state = self.state.lock().expect("block processor poisoned");
        state.blocks.push_back(item);
        self.condition.notify_all();
    }

    /// Stop draining; the consumer loop exits after the current batch.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("block processor poisoned");
        state.stopped = true;
        self.condition.notify_all();
    }

    /// Block until the queue is empty and the consumer is idle.
    pub fn flush(&self) {
        let mut state = self.state.lock().expect("block processor poisoned");
        while !state.stopped && (!state.blocks.is_empty() || !state.idle) {
            state = self.condition.wait(state).expect("block processor poisoned");
        }
    }

    /// Consumer loop; runs on its own thread for the node's lifetime.
    pub fn process_blocks(&self) {
        let mut state = self.state.lock().expect("block processor poisoned");
        while !state.stopped {
            if state.blocks.is_empty() {
                state.idle = true;
                self.condition.notify_all();
                state = self.condition.wait(state).expect("block processor poisoned");
                state.idle = false;
                continue;
            }
            let mut draining = VecDeque::new();
            std::mem::swap(&mut draining, &mut state.blocks);
            drop(state);
            self.process_receive_many(&mut draining);
            // Let other writers at the store between batches.
            std::thread::yield_now();
            state = self.state.lock().expect("block processor poisoned");
        }
    }

    /// Drain `blocks_processing`, batching store mutations under write
    /// transactions bounded by [`BATCH_CUTOFF`].
    pub fn process_receive_many(&self, blocks_processing: &mut VecDeque<BlockProcessorItem>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        while !blocks_processing.is_empty() {
            let mut progress: Vec<(Arc<Block>, ProcessReturn)> = Vec::new();
            {
                let mut txn = match node.store.tx_begin_write() {
                    Ok(txn) => txn,
                    Err(error) => {
                        tracing::error!(%error, "block batch could not open a write transaction");
                        return;
                    }
                };
                let cutoff = Instant::now() + BATCH_CUTOFF;
                while let Some(item) = blocks_processing.pop_front() {
                    if item.force {
                        self.roll_back_competitor(&node, &mut txn, &item.block);
                    }
                    let hash = item.block.hash();
                    match self.process_receive_one(&node, &mut txn, &item.block) {
                        Ok(result) => {
                            match result.code {
                                ProcessResult::Progress => {
                                    progress.push((item.block.clone(), result));
                                    self.unwind_dependents(&node, &mut txn, &hash, blocks_processing);
                                }
                                ProcessResult::Old => {
                                    self.unwind_dependents(&node, &mut txn, &hash, blocks_processing);
                                }
                                _ => {}
                            }
                        }
                        Err(error) => {
                            tracing::error!(block = %hash, %error, "store failure while processing block");
                        }
                    }
                    if Instant::now() >= cutoff {
                        break;
                    }
                }
                if let Err(error) = txn.commit() {
                    tracing::error!(%error, "block batch commit failed");
                    return;
                }
            }
            for (block, result) in &progress {
                node.observers.blocks(block, &result.account, &result.amount);
                if !result.amount.is_zero() {
                    node.observers.account_balance(&result.account, false);
                    if !result.pending_account.is_zero() {
                        node.observers.account_balance(&result.pending_account, true);
                    }
                }
            }
        }
    }

    /// Forced path: if a different block occupies this root, roll it back.
    fn roll_back_competitor(&self, node: &Arc<Node>, txn: &mut RwTxn, block: &Arc<Block>) {
        let successor = match node.ledger.successor(txn, &block.root()) {
            Ok(successor) => successor,
            Err(error) => {
                tracing::error!(%error, "successor lookup failed");
                return;
            }
        };
        if let Some(existing) = successor {
            if existing.hash() != block.hash() {
                tracing::info!(
                    losing = %existing.hash(),
                    winning = %block.hash(),
                    "rolling back and replacing"
                );
                if let Err(error) = node.ledger.rollback(txn, existing.hash()) {
                    tracing::error!(%error, "rollback failed");
                }
            }
        }
    }

    /// Pull children waiting on `hash` out of `unchecked` and put them at
    /// the front of the working queue.
    fn unwind_dependents(
        &self,
        node: &Arc<Node>,
        txn: &mut RwTxn,
        hash: &BlockHash,
        blocks_processing: &mut VecDeque<BlockProcessorItem>,
    ) {
        let children = match node.store.unchecked_get(txn, hash) {
            Ok(children) => children,
            Err(error) => {
                tracing::error!(%error, "unchecked lookup failed");
                return;
            }
        };
        for child in children {
            if let Err(error) = node.store.unchecked_del(txn, hash, &child.hash()) {
                tracing::error!(%error, "unchecked delete failed");
            }
            blocks_processing.push_front(BlockProcessorItem::new(Arc::new(child)));
        }
        node.gap_cache.erase(hash);
    }

    fn process_receive_one(
        &self,
        node: &Arc<Node>,
        txn: &mut RwTxn,
        block: &Arc<Block>,
    ) -> Result<ProcessReturn, raze_store::StoreError> {
        let result = node.ledger.process(txn, block)?;
        let hash = block.hash();
        match result.code {
            ProcessResult::Progress => {
                if node.config.log_detail.ledger {
                    tracing::debug!(block = %hash, "processing block");
                }
            }
            ProcessResult::GapPrevious => {
                if node.config.log_detail.ledger {
                    tracing::debug!(block = %hash, "gap previous");
                }
                node.store.unchecked_put(txn, &block.previous(), block)?;
                node.gap_cache.add(block);
            }
            ProcessResult::GapSource => {
                if node.config.log_detail.ledger {
                    tracing::debug!(block = %hash, "gap source");
                }
                let source = block.source().unwrap_or(BlockHash::ZERO);
                node.store.unchecked_put(txn, &source, block)?;
                node.gap_cache.add(block);
            }
            ProcessResult::Old => {
                self.replace_by_work(node, txn, block)?;
                if node.config.log_detail.ledger_duplicate {
                    tracing::debug!(block = %hash, "old block");
                }
            }
            ProcessResult::Fork => {
                if !node.block_arrival.recent(&hash) {
                    // Forks that didn't arrive over gossip go to bootstrap
                    // so the competing chain can be pulled.
                    node.bootstrap.process_fork(block.clone());
                }
                if node.config.log_detail.ledger {
                    tracing::debug!(block = %hash, root = %block.root(), "fork");
                }
            }
            ProcessResult::BadSignature
            | ProcessResult::NegativeSpend
            | ProcessResult::Unreceivable
            | ProcessResult::NotReceiveFromSend
            | ProcessResult::AccountMismatch => {
                if node.config.log_detail.ledger {
                    tracing::debug!(block = %hash, code = ?result.code, "block rejected");
                }
            }
            ProcessResult::OpenedBurnAccount => {
                tracing::warn!(block = %hash, "rejecting open block for burn account");
            }
        }
        Ok(result)
    }

    /// An already-stored block can be replaced in place by a submission
    /// with higher work value and a valid signature; the successor pointer
    /// is preserved.
    fn replace_by_work(
        &self,
        node: &Arc<Node>,
        txn: &mut RwTxn,
        block: &Arc<Block>,
    ) -> Result<(), raze_store::StoreError> {
        let hash = block.hash();
        let root = block.root();
        let Some(existing) = node.store.block_get(txn, &hash)? else {
            // Rolled back between queueing and draining, possibly.
            return Ok(());
        };
        if work_value(&root, block.work()) <= work_value(&root, existing.work()) {
            return Ok(());
        }
        let Some(account) = node.ledger.account(txn, &hash)? else {
            return Ok(());
        };
        if !raze_crypto::validate_message(&account, hash.as_bytes(), block.signature()) {
            return Ok(());
        }
        let successor = node
            .store
            .block_successor(txn, &hash)?
            .unwrap_or(BlockHash::ZERO);
        node.store.block_put(txn, &hash, block, successor, account)?;
        tracing::info!(block = %hash, "replaced block with higher work value");
        Ok(())
    }
}
