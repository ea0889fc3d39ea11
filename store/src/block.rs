//! `blocks` table.
//!
//! Row: `type(1) ‖ block-wire-encoding ‖ successor(32) ‖ account(32)`.
//! Successor and owning account are store-side metadata: the successor
//! chains each block to the next one in its account chain (and is preserved
//! when a block is replaced in place by one with higher work); the account
//! makes chain ownership an O(1) lookup.

use heed::{RoTxn, RwTxn};
use rand::Rng;

use raze_ledger::{Block, BlockType};
use raze_types::{Account, BlockHash};

use crate::environment::Store;
use crate::error::StoreError;

fn decode_row(raw: &[u8]) -> Result<(Block, BlockHash, Account), StoreError> {
    if raw.is_empty() {
        return Err(StoreError::Corrupt("empty block row".into()));
    }
    let block_type = BlockType::from_u8(raw[0])
        .ok_or_else(|| StoreError::Corrupt(format!("block row type byte {}", raw[0])))?;
    let (block, used) = Block::deserialize(block_type, &raw[1..])?;
    let rest = &raw[1 + used..];
    if rest.len() != 64 {
        return Err(StoreError::Corrupt("block row sideband length".into()));
    }
    let successor = BlockHash::new(rest[0..32].try_into().expect("length checked"));
    let account = Account::new(rest[32..64].try_into().expect("length checked"));
    Ok((block, successor, account))
}

impl Store {
    pub fn block_put(
        &self,
        txn: &mut RwTxn,
        hash: &BlockHash,
        block: &Block,
        successor: BlockHash,
        account: Account,
    ) -> Result<(), StoreError> {
        let mut row = Vec::with_capacity(1 + block.block_type().serialized_size() + 64);
        row.push(block.block_type() as u8);
        block.serialize(&mut row);
        row.extend_from_slice(successor.as_bytes());
        row.extend_from_slice(account.as_bytes());
        self.blocks.put(txn, hash.as_bytes(), &row)?;
        Ok(())
    }

    pub fn block_get(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Block>, StoreError> {
        match self.blocks.get(txn, hash.as_bytes())? {
            Some(raw) => Ok(Some(decode_row(raw)?.0)),
            None => Ok(None),
        }
    }

    /// The next block in the owning chain, or zero at the head.
    pub fn block_successor(
        &self,
        txn: &RoTxn,
        hash: &BlockHash,
    ) -> Result<Option<BlockHash>, StoreError> {
        match self.blocks.get(txn, hash.as_bytes())? {
            Some(raw) => Ok(Some(decode_row(raw)?.1)),
            None => Ok(None),
        }
    }

    /// The account whose chain contains this block.
    pub fn block_account(
        &self,
        txn: &RoTxn,
        hash: &BlockHash,
    ) -> Result<Option<Account>, StoreError> {
        match self.blocks.get(txn, hash.as_bytes())? {
            Some(raw) => Ok(Some(decode_row(raw)?.2)),
            None => Ok(None),
        }
    }

    pub fn block_successor_set(
        &self,
        txn: &mut RwTxn,
        hash: &BlockHash,
        successor: BlockHash,
    ) -> Result<(), StoreError> {
        let raw = self
            .blocks
            .get(txn, hash.as_bytes())?
            .ok_or_else(|| StoreError::Corrupt(format!("successor update for missing {hash}")))?;
        let (block, _, account) = decode_row(raw)?;
        self.block_put(txn, hash, &block, successor, account)
    }

    pub fn block_exists(&self, txn: &RoTxn, hash: &BlockHash) -> Result<bool, StoreError> {
        Ok(self.blocks.get(txn, hash.as_bytes())?.is_some())
    }

    pub fn block_del(&self, txn: &mut RwTxn, hash: &BlockHash) -> Result<(), StoreError> {
        self.blocks.delete(txn, hash.as_bytes())?;
        Ok(())
    }

    pub fn block_count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.blocks.len(txn)?)
    }

    /// Uniformly random stored block, used by the rep crawler's probes.
    pub fn block_random(&self, txn: &RoTxn) -> Result<Option<Block>, StoreError> {
        let count = self.blocks.len(txn)?;
        if count == 0 {
            return Ok(None);
        }
        let index = rand::thread_rng().gen_range(0..count) as usize;
        match self.blocks.iter(txn)?.nth(index) {
            Some(entry) => {
                let (_, raw) = entry?;
                Ok(Some(decode_row(raw)?.0))
            }
            None => Ok(None),
        }
    }
}
