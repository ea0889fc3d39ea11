//! Codec errors.

use thiserror::Error;

/// Failure while decoding a block or vote from its binary form.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("unknown block type {0}")]
    UnknownBlockType(u8),
}
