//! `representation` table: voting weight per representative.
//!
//! Row: `weight(16 BE)`. Weight is the sum of balances of the accounts
//! delegating to the representative; rows at zero are deleted.

use heed::{RoTxn, RwTxn};

use raze_types::{Account, Amount};

use crate::environment::Store;
use crate::error::StoreError;

impl Store {
    pub fn representation_get(&self, txn: &RoTxn, account: &Account) -> Result<Amount, StoreError> {
        match self.representation.get(txn, account.as_bytes())? {
            Some(raw) => {
                let bytes: [u8; 16] = raw
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("representation row length".into()))?;
                Ok(Amount::from_be_bytes(bytes))
            }
            None => Ok(Amount::ZERO),
        }
    }

    pub fn representation_put(
        &self,
        txn: &mut RwTxn,
        account: &Account,
        weight: Amount,
    ) -> Result<(), StoreError> {
        if weight.is_zero() {
            self.representation.delete(txn, account.as_bytes())?;
        } else {
            self.representation.put(txn, account.as_bytes(), &weight.to_be_bytes())?;
        }
        Ok(())
    }
}
