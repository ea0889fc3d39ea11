//! `accounts` table: per-account chain state.
//!
//! Row: `head(32) ‖ representative(32) ‖ open_block(32) ‖ balance(16 BE)
//! ‖ modified(8 LE) ‖ block_count(8 LE)`.

use heed::{RoTxn, RwTxn};

use raze_types::{Account, Amount, BlockHash};

use crate::environment::Store;
use crate::error::StoreError;

const ROW_LEN: usize = 32 + 32 + 32 + 16 + 8 + 8;

/// Chain state of one account.
///
/// Invariant: `head` is reachable from `open_block` by following `previous`
/// pointers, and `block_count` is the length of that chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    pub head: BlockHash,
    pub representative: Account,
    pub open_block: BlockHash,
    pub balance: Amount,
    /// Unix seconds of the last head change.
    pub modified: u64,
    pub block_count: u64,
}

impl AccountInfo {
    fn to_bytes(&self) -> [u8; ROW_LEN] {
        let mut row = [0u8; ROW_LEN];
        row[0..32].copy_from_slice(self.head.as_bytes());
        row[32..64].copy_from_slice(self.representative.as_bytes());
        row[64..96].copy_from_slice(self.open_block.as_bytes());
        row[96..112].copy_from_slice(&self.balance.to_be_bytes());
        row[112..120].copy_from_slice(&self.modified.to_le_bytes());
        row[120..128].copy_from_slice(&self.block_count.to_le_bytes());
        row
    }

    fn from_bytes(raw: &[u8]) -> Result<Self, StoreError> {
        if raw.len() != ROW_LEN {
            return Err(StoreError::Corrupt("account row length".into()));
        }
        Ok(Self {
            head: BlockHash::new(raw[0..32].try_into().expect("length checked")),
            representative: Account::new(raw[32..64].try_into().expect("length checked")),
            open_block: BlockHash::new(raw[64..96].try_into().expect("length checked")),
            balance: Amount::from_be_bytes(raw[96..112].try_into().expect("length checked")),
            modified: u64::from_le_bytes(raw[112..120].try_into().expect("length checked")),
            block_count: u64::from_le_bytes(raw[120..128].try_into().expect("length checked")),
        })
    }
}

impl Store {
    pub fn account_get(
        &self,
        txn: &RoTxn,
        account: &Account,
    ) -> Result<Option<AccountInfo>, StoreError> {
        match self.accounts.get(txn, account.as_bytes())? {
            Some(raw) => Ok(Some(AccountInfo::from_bytes(raw)?)),
            None => Ok(None),
        }
    }

    pub fn account_put(
        &self,
        txn: &mut RwTxn,
        account: &Account,
        info: &AccountInfo,
    ) -> Result<(), StoreError> {
        self.accounts.put(txn, account.as_bytes(), &info.to_bytes())?;
        Ok(())
    }

    pub fn account_del(&self, txn: &mut RwTxn, account: &Account) -> Result<(), StoreError> {
        self.accounts.delete(txn, account.as_bytes())?;
        Ok(())
    }

    pub fn account_count(&self, txn: &RoTxn) -> Result<u64, StoreError> {
        Ok(self.accounts.len(txn)?)
    }

    /// Whether any account exists (an empty table means a freshly created
    /// store that still needs its genesis block).
    pub fn accounts_empty(&self, txn: &RoTxn) -> Result<bool, StoreError> {
        Ok(self.accounts.len(txn)? == 0)
    }
}
