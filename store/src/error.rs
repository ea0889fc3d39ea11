//! Store errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("lmdb failure: {0}")]
    Lmdb(#[from] heed::Error),
    #[error("environment setup failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<raze_ledger::CodecError> for StoreError {
    fn from(err: raze_ledger::CodecError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
