//! LMDB environment setup.

use std::path::Path;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn, RwTxn};

use crate::error::StoreError;

/// Default LMDB map size: 4 GiB.
const DEFAULT_MAP_SIZE: usize = 4 << 30;

/// Current on-disk schema version.
pub(crate) const SCHEMA_VERSION: u64 = 1;

/// Wraps the LMDB environment and all database handles.
///
/// Table layouts are fixed-width field concatenations; see the per-table
/// modules for the exact row formats.
pub struct Store {
    pub(crate) env: Env,
    pub(crate) accounts: Database<Bytes, Bytes>,
    pub(crate) blocks: Database<Bytes, Bytes>,
    pub(crate) pending: Database<Bytes, Bytes>,
    pub(crate) representation: Database<Bytes, Bytes>,
    pub(crate) unchecked: Database<Bytes, Bytes>,
    pub(crate) checksum: Database<Bytes, Bytes>,
    pub(crate) vote: Database<Bytes, Bytes>,
    pub(crate) meta: Database<Bytes, Bytes>,
}

impl Store {
    /// Open or create the store at `path`.
    ///
    /// Fails (and the node refuses to start) when the environment cannot be
    /// created or the schema version is newer than this build understands.
    pub fn open(path: &Path, max_dbs: u32) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .max_dbs(max_dbs)
                .map_size(DEFAULT_MAP_SIZE)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let accounts = env.create_database(&mut wtxn, Some("accounts"))?;
        let blocks = env.create_database(&mut wtxn, Some("blocks"))?;
        let pending = env.create_database(&mut wtxn, Some("pending"))?;
        let representation = env.create_database(&mut wtxn, Some("representation"))?;
        let unchecked = env.create_database(&mut wtxn, Some("unchecked"))?;
        let checksum = env.create_database(&mut wtxn, Some("checksum"))?;
        let vote = env.create_database(&mut wtxn, Some("vote"))?;
        let meta = env.create_database(&mut wtxn, Some("meta"))?;

        wtxn.commit()?;

        let store = Self {
            env,
            accounts,
            blocks,
            pending,
            representation,
            unchecked,
            checksum,
            vote,
            meta,
        };

        let mut wtxn = store.tx_begin_write()?;
        match store.version_get(&wtxn)? {
            None => store.version_put(&mut wtxn, SCHEMA_VERSION)?,
            Some(version) if version > SCHEMA_VERSION => {
                return Err(StoreError::Corrupt(format!(
                    "store schema version {version} is newer than supported {SCHEMA_VERSION}"
                )))
            }
            Some(_) => {}
        }
        wtxn.commit()?;

        Ok(store)
    }

    /// Begin a read transaction. Many may coexist.
    pub fn tx_begin_read(&self) -> Result<RoTxn<'_>, StoreError> {
        Ok(self.env.read_txn()?)
    }

    /// Begin the write transaction. LMDB serializes writers; callers hold
    /// this only for a bounded batch.
    pub fn tx_begin_write(&self) -> Result<RwTxn<'_>, StoreError> {
        Ok(self.env.write_txn()?)
    }

    /// Force an fsync of the memory map. Called by the periodic flush loop
    /// and during shutdown.
    pub fn flush(&self) -> Result<(), StoreError> {
        Ok(self.env.force_sync()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), 32).unwrap();
            let txn = store.tx_begin_read().unwrap();
            assert_eq!(store.version_get(&txn).unwrap(), Some(SCHEMA_VERSION));
        }
        let store = Store::open(dir.path(), 32).unwrap();
        let txn = store.tx_begin_read().unwrap();
        assert_eq!(store.version_get(&txn).unwrap(), Some(SCHEMA_VERSION));
    }

    #[test]
    fn future_schema_version_refused() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path(), 32).unwrap();
            let mut wtxn = store.tx_begin_write().unwrap();
            store.version_put(&mut wtxn, SCHEMA_VERSION + 1).unwrap();
            wtxn.commit().unwrap();
        }
        assert!(Store::open(dir.path(), 32).is_err());
    }
}
