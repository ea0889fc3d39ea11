//! `pending` table: receivable sends.
//!
//! Key: `destination(32) ‖ send_hash(32)`; row: `source(32) ‖ amount(16 BE)`.
//! Created when a send is applied, consumed by the destination's
//! receive/open block.

use heed::{RoTxn, RwTxn};

use raze_types::{Account, Amount, BlockHash};

use crate::environment::Store;
use crate::error::StoreError;

/// Identifies one receivable send for one destination.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingKey {
    pub destination: Account,
    pub hash: BlockHash,
}

impl PendingKey {
    pub fn new(destination: Account, hash: BlockHash) -> Self {
        Self { destination, hash }
    }

    fn to_bytes(self) -> [u8; 64] {
        let mut key = [0u8; 64];
        key[0..32].copy_from_slice(self.destination.as_bytes());
        key[32..64].copy_from_slice(self.hash.as_bytes());
        key
    }
}

/// Who sent the funds and how much.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingInfo {
    pub source: Account,
    pub amount: Amount,
}

impl PendingInfo {
    fn to_bytes(self) -> [u8; 48] {
        let mut row = [0u8; 48];
        row[0..32].copy_from_slice(self.source.as_bytes());
        row[32..48].copy_from_slice(&self.amount.to_be_bytes());
        row
    }

    fn from_bytes(raw: &[u8]) -> Result<Self, StoreError> {
        if raw.len() != 48 {
            return Err(StoreError::Corrupt("pending row length".into()));
        }
        Ok(Self {
            source: Account::new(raw[0..32].try_into().expect("length checked")),
            amount: Amount::from_be_bytes(raw[32..48].try_into().expect("length checked")),
        })
    }
}

impl Store {
    pub fn pending_put(
        &self,
        txn: &mut RwTxn,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StoreError> {
        self.pending.put(txn, &key.to_bytes(), &info.to_bytes())?;
        Ok(())
    }

    pub fn pending_get(
        &self,
        txn: &RoTxn,
        key: &PendingKey,
    ) -> Result<Option<PendingInfo>, StoreError> {
        match self.pending.get(txn, &key.to_bytes())? {
            Some(raw) => Ok(Some(PendingInfo::from_bytes(raw)?)),
            None => Ok(None),
        }
    }

    pub fn pending_del(&self, txn: &mut RwTxn, key: &PendingKey) -> Result<(), StoreError> {
        self.pending.delete(txn, &key.to_bytes())?;
        Ok(())
    }

    pub fn pending_exists(&self, txn: &RoTxn, key: &PendingKey) -> Result<bool, StoreError> {
        Ok(self.pending.get(txn, &key.to_bytes())?.is_some())
    }

    /// Sum of all receivable amounts for one destination (prefix scan).
    pub fn pending_total(&self, txn: &RoTxn, destination: &Account) -> Result<Amount, StoreError> {
        let lower = PendingKey::new(*destination, BlockHash::ZERO).to_bytes();
        let upper = PendingKey::new(*destination, BlockHash::new([0xFF; 32])).to_bytes();
        let mut total = Amount::ZERO;
        let range = (
            std::ops::Bound::Included(lower.as_slice()),
            std::ops::Bound::Included(upper.as_slice()),
        );
        for entry in self.pending.range(txn, &range)? {
            let (_, raw) = entry?;
            total = total.saturating_add(PendingInfo::from_bytes(raw)?.amount);
        }
        Ok(total)
    }
}
