//! LMDB persistence for the block lattice.
//!
//! One [`Store`] owns the environment and all named databases. Transactions
//! are created by the caller and passed explicitly through every method:
//! readers may overlap freely, the single write transaction is held only by
//! the block processor and the wallet (disjoint keyspaces).

mod account;
mod block;
mod checksum;
mod environment;
mod error;
mod meta;
mod pending;
mod representation;
mod unchecked;
mod vote;

pub use account::AccountInfo;
pub use environment::Store;
pub use error::StoreError;
pub use pending::{PendingInfo, PendingKey};
