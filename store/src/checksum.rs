//! `checksum` table: rolling XOR of account frontier hashes.
//!
//! Updated incrementally by the ledger whenever an account head changes;
//! two stores holding the same set of frontiers hold the same checksum.

use heed::{RoTxn, RwTxn};

use raze_types::BlockHash;

use crate::environment::Store;
use crate::error::StoreError;

const CHECKSUM_KEY: [u8; 8] = [0u8; 8];

impl Store {
    pub fn checksum_get(&self, txn: &RoTxn) -> Result<BlockHash, StoreError> {
        match self.checksum.get(txn, &CHECKSUM_KEY)? {
            Some(raw) => {
                let bytes: [u8; 32] = raw
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("checksum row length".into()))?;
                Ok(BlockHash::new(bytes))
            }
            None => Ok(BlockHash::ZERO),
        }
    }

    pub fn checksum_put(&self, txn: &mut RwTxn, checksum: BlockHash) -> Result<(), StoreError> {
        self.checksum.put(txn, &CHECKSUM_KEY, checksum.as_bytes())?;
        Ok(())
    }

    /// XOR a frontier hash into the running checksum. Applying the same hash
    /// twice removes it again.
    pub fn checksum_xor(&self, txn: &mut RwTxn, hash: &BlockHash) -> Result<(), StoreError> {
        let current = self.checksum_get(txn)?;
        let mut mixed = [0u8; 32];
        for (i, byte) in mixed.iter_mut().enumerate() {
            *byte = current.as_bytes()[i] ^ hash.as_bytes()[i];
        }
        self.checksum_put(txn, BlockHash::new(mixed))
    }
}
