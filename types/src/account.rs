//! Account identifiers.
//!
//! An account *is* its Ed25519 public key. The all-zero key is the burn
//! account: funds sent there are provably unspendable and excluded from the
//! circulating supply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte account public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Account([u8; 32]);

impl Account {
    /// The burn account.
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

    /// Parse from a 64-character hex string.
    pub fn decode_hex(s: &str) -> Option<Self> {
        decode_hex_32(s).map(Self)
    }
}

impl From<crate::hash::BlockHash> for Account {
    fn from(hash: crate::hash::BlockHash) -> Self {
        Self(*hash.as_bytes())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account(")?;
        for b in &self.0[..4] {
            write!(f, "{:02X}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

/// Decode a 64-character hex string into 32 bytes.
pub(crate) fn decode_hex_32(s: &str) -> Option<[u8; 32]> {
    if s.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let text = std::str::from_utf8(chunk).ok()?;
        out[i] = u8::from_str_radix(text, 16).ok()?;
    }
    Some(out)
}
