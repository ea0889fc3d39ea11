//! `unchecked` table: blocks waiting on a missing dependency.
//!
//! Key: `dependency(32) ‖ child_hash(32)`; row: `type(1) ‖ block encoding`.
//! Several children may wait on the same dependency; the composite key keeps
//! them distinct while a range scan over the dependency prefix drains them
//! together.

use heed::{RoTxn, RwTxn};

use raze_ledger::{Block, BlockType};
use raze_types::BlockHash;

use crate::environment::Store;
use crate::error::StoreError;

fn unchecked_key(dependency: &BlockHash, child: &BlockHash) -> [u8; 64] {
    let mut key = [0u8; 64];
    key[0..32].copy_from_slice(dependency.as_bytes());
    key[32..64].copy_from_slice(child.as_bytes());
    key
}

fn decode_row(raw: &[u8]) -> Result<Block, StoreError> {
    if raw.is_empty() {
        return Err(StoreError::Corrupt("empty unchecked row".into()));
    }
    let block_type = BlockType::from_u8(raw[0])
        .ok_or_else(|| StoreError::Corrupt(format!("unchecked row type byte {}", raw[0])))?;
    let (block, used) = Block::deserialize(block_type, &raw[1..])?;
    if 1 + used != raw.len() {
        return Err(StoreError::Corrupt("unchecked row trailing bytes".into()));
    }
    Ok(block)
}

impl Store {
    pub fn unchecked_put(
        &self,
        txn: &mut RwTxn,
        dependency: &BlockHash,
        block: &Block,
    ) -> Result<(), StoreError> {
        let mut row = Vec::with_capacity(1 + block.block_type().serialized_size());
        row.push(block.block_type() as u8);
        block.serialize(&mut row);
        self.unchecked
            .put(txn, &unchecked_key(dependency, &block.hash()), &row)?;
        Ok(())
    }

    /// All blocks waiting on `dependency`.
    pub fn unchecked_get(
        &self,
        txn: &RoTxn,
        dependency: &BlockHash,
    ) -> Result<Vec<Block>, StoreError> {
        let lower = unchecked_key(dependency, &BlockHash::ZERO);
        let upper = unchecked_key(dependency, &BlockHash::new([0xFF; 32]));
        let mut children = Vec::new();
        let range = (
            std::ops::Bound::Included(lower.as_slice()),
            std::ops::Bound::Included(upper.as_slice()),
        );
        for entry in self.unchecked.range(txn, &range)? {
            let (_, raw) = entry?;
            children.push(decode_row(raw)?);
        }
        Ok(children)
    }

    pub fn unchecked_del(
        &self,
        txn: &mut RwTxn,
        dependency: &BlockHash,
        child: &BlockHash,
    ) -> Result<(), StoreError> {
        self.unchecked.delete(txn, &unchecked_key(dependency, child))?;
        Ok(())
    }

    pub fn unchecked_count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.unchecked.len(txn)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_ledger::ReceiveBlock;
    use raze_types::Signature;

    fn sample_block(previous: u8) -> Block {
        Block::Receive(ReceiveBlock {
            previous: BlockHash::new([previous; 32]),
            source: BlockHash::new([0xAA; 32]),
            signature: Signature([1; 64]),
            work: 3,
        })
    }

    #[test]
    fn children_drain_by_dependency() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 32).unwrap();
        let dependency = BlockHash::new([0xCC; 32]);
        let a = sample_block(1);
        let b = sample_block(2);

        let mut wtxn = store.tx_begin_write().unwrap();
        store.unchecked_put(&mut wtxn, &dependency, &a).unwrap();
        store.unchecked_put(&mut wtxn, &dependency, &b).unwrap();
        store
            .unchecked_put(&mut wtxn, &BlockHash::new([0xDD; 32]), &sample_block(3))
            .unwrap();
        wtxn.commit().unwrap();

        let txn = store.tx_begin_read().unwrap();
        let children = store.unchecked_get(&txn, &dependency).unwrap();
        assert_eq!(children.len(), 2);
        assert!(children.contains(&a));
        assert!(children.contains(&b));
        assert_eq!(store.unchecked_count(&txn).unwrap(), 3);
    }

    #[test]
    fn delete_is_per_child() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 32).unwrap();
        let dependency = BlockHash::new([0xCC; 32]);
        let a = sample_block(1);
        let b = sample_block(2);

        let mut wtxn = store.tx_begin_write().unwrap();
        store.unchecked_put(&mut wtxn, &dependency, &a).unwrap();
        store.unchecked_put(&mut wtxn, &dependency, &b).unwrap();
        store.unchecked_del(&mut wtxn, &dependency, &a.hash()).unwrap();
        wtxn.commit().unwrap();

        let txn = store.tx_begin_read().unwrap();
        let children = store.unchecked_get(&txn, &dependency).unwrap();
        assert_eq!(children, vec![b]);
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 32).unwrap();
        let dependency = BlockHash::new([0xCC; 32]);
        let a = sample_block(1);

        let mut wtxn = store.tx_begin_write().unwrap();
        store.unchecked_put(&mut wtxn, &dependency, &a).unwrap();
        store.unchecked_put(&mut wtxn, &dependency, &a).unwrap();
        wtxn.commit().unwrap();

        let txn = store.tx_begin_read().unwrap();
        assert_eq!(store.unchecked_count(&txn).unwrap(), 1);
    }
}
