//! Node errors.
//!
//! Only construction-time failures surface here; runtime errors from remote
//! peers are counted and logged where they occur, never propagated.

use thiserror::Error;

use raze_store::StoreError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("lmdb failure: {0}")]
    Lmdb(#[from] heed::Error),
}
