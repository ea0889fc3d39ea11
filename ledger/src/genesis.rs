//! Genesis block construction.
//!
//! The genesis account opens its own chain with a self-referential open
//! block; its balance is the entire raw supply. On the dev/test network the
//! genesis key is derived from a well-known all-zero seed so every node
//! computes an identical chain head.

use std::sync::Arc;

use raze_crypto::{keypair_from_seed, sign_message};
use raze_types::KeyPair;

use crate::block::{Block, OpenBlock};

/// Well-known seed for the deterministic dev/test genesis keypair.
pub const DEV_GENESIS_SEED: [u8; 32] = [0u8; 32];

/// The dev-network genesis keypair and its open block.
pub fn dev_genesis() -> (KeyPair, Arc<Block>) {
    let keypair = keypair_from_seed(&DEV_GENESIS_SEED);
    let mut open = Block::Open(OpenBlock {
        source: keypair.public.into(),
        representative: keypair.public,
        account: keypair.public,
        signature: raze_types::Signature::ZERO,
        work: 0,
    });
    let hash = open.hash();
    open.set_signature(sign_message(&keypair.private, hash.as_bytes()));
    (keypair, Arc::new(open))
}
