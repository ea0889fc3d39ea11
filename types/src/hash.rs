//! Block hash type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte Blake2b block digest.
///
/// Also doubles as the key type for election roots: for an open block the
/// root is the account's public key bytes, otherwise the `previous` hash.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHash([u8; 32]);

impl BlockHash {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from a 64-character upper- or lower-case hex string.
    pub fn decode_hex(s: &str) -> Option<Self> {
        let bytes = crate::account::decode_hex_32(s)?;
        Some(Self(bytes))
    }
}

impl From<crate::account::Account> for BlockHash {
    fn from(account: crate::account::Account) -> Self {
        Self(*account.as_bytes())
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash(")?;
        for b in &self.0[..4] {
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}
