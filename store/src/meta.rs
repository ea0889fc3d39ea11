//! `meta` table: schema versioning.

use heed::{RoTxn, RwTxn};

use crate::environment::Store;
use crate::error::StoreError;

const VERSION_KEY: &[u8] = b"version";

impl Store {
    pub fn version_get(&self, txn: &RoTxn) -> Result<Option<u64>, StoreError> {
        match self.meta.get(txn, VERSION_KEY)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw
                    .try_into()
                    .map_err(|_| StoreError::Corrupt("meta version row".into()))?;
                Ok(Some(u64::from_le_bytes(bytes)))
            }
            None => Ok(None),
        }
    }

    pub fn version_put(&self, txn: &mut RwTxn, version: u64) -> Result<(), StoreError> {
        self.meta.put(txn, VERSION_KEY, &version.to_le_bytes())?;
        Ok(())
    }
}
