//! `vote` table: highest known vote per representative.
//!
//! The row is the full vote wire encoding; the account key is duplicated
//! inside the row so a loaded vote can be re-sent verbatim (sequence-replay
//! assistance).

use heed::{RoTxn, RwTxn};

use raze_ledger::Vote;
use raze_types::Account;

use crate::environment::Store;
use crate::error::StoreError;

impl Store {
    pub fn vote_get(&self, txn: &RoTxn, account: &Account) -> Result<Option<Vote>, StoreError> {
        match self.vote.get(txn, account.as_bytes())? {
            Some(raw) => {
                let (vote, used) = Vote::deserialize(raw)?;
                if used != raw.len() {
                    return Err(StoreError::Corrupt("vote row trailing bytes".into()));
                }
                Ok(Some(vote))
            }
            None => Ok(None),
        }
    }

    pub fn vote_put(&self, txn: &mut RwTxn, vote: &Vote) -> Result<(), StoreError> {
        self.vote.put(txn, vote.account.as_bytes(), &vote.to_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::generate_keypair;
    use raze_ledger::{Block, SendBlock};
    use raze_types::{Amount, BlockHash, Signature};
    use std::sync::Arc;

    #[test]
    fn vote_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 32).unwrap();
        let kp = generate_keypair();
        let block = Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([1; 32]),
            destination: Account::new([2; 32]),
            balance: Amount::new(3),
            signature: Signature([4; 64]),
            work: 5,
        }));
        let vote = Vote::new(kp.public, &kp.private, 17, block);

        let mut wtxn = store.tx_begin_write().unwrap();
        store.vote_put(&mut wtxn, &vote).unwrap();
        wtxn.commit().unwrap();

        let txn = store.tx_begin_read().unwrap();
        let loaded = store.vote_get(&txn, &kp.public).unwrap().unwrap();
        assert_eq!(loaded.sequence, 17);
        assert_eq!(loaded.to_bytes(), vote.to_bytes());
        assert!(loaded.validate());
    }

    #[test]
    fn missing_vote_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), 32).unwrap();
        let txn = store.tx_begin_read().unwrap();
        assert!(store.vote_get(&txn, &Account::new([6; 32])).unwrap().is_none());
    }
}
