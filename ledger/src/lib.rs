//! Block-lattice data types.
//!
//! Each account owns an independent chain of blocks; the four block kinds
//! (send, receive, open, change) and the representative vote are defined
//! here together with their canonical binary codecs and Blake2b digests.

pub mod block;
pub mod error;
pub mod genesis;
pub mod vote;

pub use block::{Block, BlockType, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock};
pub use error::CodecError;
pub use genesis::dev_genesis;
pub use vote::Vote;
