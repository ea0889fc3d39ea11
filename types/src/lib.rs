//! Fundamental types for the raze block lattice.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: accounts, block hashes, amounts, keys, signatures, network
//! identifiers and endpoint helpers.

pub mod account;
pub mod amount;
pub mod endpoint;
pub mod hash;
pub mod keys;
pub mod network;

pub use account::Account;
pub use amount::Amount;
pub use endpoint::Endpoint;
pub use hash::BlockHash;
pub use keys::{KeyPair, PrivateKey, Signature};
pub use network::Network;
