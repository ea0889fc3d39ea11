//! Network identifiers.

use serde::{Deserialize, Serialize};

/// Which raze network a node participates in.
///
/// The network byte appears in every wire message header; messages from a
/// different network are dropped during parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Local test network. Loopback peers allowed, minimal work threshold.
    Test,
    /// Public beta network.
    Beta,
    /// Production network.
    Live,
}

impl Network {
    /// Byte placed in the message header after the magic.
    pub fn id_byte(self) -> u8 {
        match self {
            Network::Test => b'A',
            Network::Beta => b'B',
            Network::Live => b'C',
        }
    }

    pub fn from_id_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A' => Some(Network::Test),
            b'B' => Some(Network::Beta),
            b'C' => Some(Network::Live),
            _ => None,
        }
    }

    /// Default UDP peering port.
    pub fn default_port(self) -> u16 {
        match self {
            Network::Test => 44000,
            Network::Beta => 54000,
            Network::Live => 7075,
        }
    }
}
