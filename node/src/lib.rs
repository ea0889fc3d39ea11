//! The raze node: block propagation and conflict resolution over UDP gossip.
//!
//! A [`node::Node`] wires together the subsystems in dependency order,
//! alarm, peer container, network, gap cache, block arrival set, block
//! processor, active transactions, vote processor, rep crawler and
//! distributed work, around the shared [`ledger::Ledger`] and LMDB store.

pub mod active_transactions;
pub mod alarm;
pub mod arrival;
pub mod block_processor;
pub mod bootstrap;
pub mod config;
pub mod distributed_work;
pub mod error;
pub mod gap_cache;
pub mod ledger;
pub mod logging;
pub mod network;
pub mod node;
pub mod observers;
pub mod peers;
pub mod rep_crawler;
pub mod stats;
pub mod vote_processor;
pub mod wallet;

pub use config::NodeConfig;
pub use error::NodeError;
pub use ledger::{Ledger, ProcessResult, VoteCode};
pub use node::{build_runtime, Node};
