//! Vote intake.
//!
//! Validates observed confirm_ack votes against the ledger's sequence
//! records and fans accepted votes out to the observers (elections, gap
//! cache, rep crawler). Replay handling stays in the network layer, which
//! may answer the sender with the superseding stored vote.

use std::sync::{Arc, Weak};

use raze_ledger::Vote;
use raze_types::Endpoint;

use crate::ledger::{VoteCode, VoteResult};
use crate::node::Node;

pub struct VoteProcessor {
    node: Weak<Node>,
}

impl VoteProcessor {
    pub fn new(node: Weak<Node>) -> Self {
        Self { node }
    }

    /// Validate one observed vote. Returns the effective result (the stored
    /// superseding vote on replay), or `None` during shutdown.
    pub fn vote(&self, vote: Arc<Vote>, endpoint: &Endpoint) -> Option<VoteResult> {
        let node = self.node.upgrade()?;
        let result = {
            let txn = match node.store.tx_begin_read() {
                Ok(txn) => txn,
                Err(error) => {
                    tracing::error!(%error, "vote validation could not open a read transaction");
                    return None;
                }
            };
            node.ledger.vote_validate(&txn, vote.clone())
        };
        if node.config.log_detail.vote {
            tracing::debug!(
                account = %vote.account,
                sequence = vote.sequence,
                block = %vote.block.hash(),
                status = ?result.code,
                "vote processed"
            );
        }
        match result.code {
            VoteCode::Vote | VoteCode::Vote2 => {
                node.observers.vote(&result.vote, result.code, endpoint);
            }
            VoteCode::Replay | VoteCode::Invalid => {}
        }
        Some(result)
    }
}
