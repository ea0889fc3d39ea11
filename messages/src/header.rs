//! Message header.

use raze_ledger::BlockType;
use raze_types::Network;

/// Leading byte of every datagram.
pub const MAGIC: u8 = b'R';
/// Highest protocol version this build speaks.
pub const VERSION_MAX: u8 = 6;
/// Version stamped on outgoing messages.
pub const VERSION_USING: u8 = 6;
/// Oldest version still accepted from peers.
pub const VERSION_MIN: u8 = 4;

/// Bits 8–11 of extensions carry the block type for block-bearing messages.
const BLOCK_TYPE_MASK: u16 = 0x0f00;

/// All message type codes. Types 6–9 belong to the TCP bootstrap protocol
/// and never appear on the gossip socket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Invalid = 0,
    NotAType = 1,
    Keepalive = 2,
    Publish = 3,
    ConfirmReq = 4,
    ConfirmAck = 5,
    BulkPull = 6,
    BulkPush = 7,
    FrontierReq = 8,
    BulkPullBlocks = 9,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(MessageType::Invalid),
            1 => Some(MessageType::NotAType),
            2 => Some(MessageType::Keepalive),
            3 => Some(MessageType::Publish),
            4 => Some(MessageType::ConfirmReq),
            5 => Some(MessageType::ConfirmAck),
            6 => Some(MessageType::BulkPull),
            7 => Some(MessageType::BulkPush),
            8 => Some(MessageType::FrontierReq),
            9 => Some(MessageType::BulkPullBlocks),
            _ => None,
        }
    }
}

/// The eight-byte header on every message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub network: Network,
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: MessageType,
    pub extensions: u16,
}

impl MessageHeader {
    pub const LEN: usize = 8;

    pub fn new(network: Network, message_type: MessageType) -> Self {
        Self {
            network,
            version_max: VERSION_MAX,
            version_using: VERSION_USING,
            version_min: VERSION_MIN,
            message_type,
            extensions: 0,
        }
    }

    pub fn block_type(&self) -> Option<BlockType> {
        BlockType::from_u8(((self.extensions & BLOCK_TYPE_MASK) >> 8) as u8)
    }

    pub fn set_block_type(&mut self, block_type: BlockType) {
        self.extensions =
            (self.extensions & !BLOCK_TYPE_MASK) | (((block_type as u8) as u16) << 8);
    }

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let ext = self.extensions.to_le_bytes();
        [
            MAGIC,
            self.network.id_byte(),
            self.version_max,
            self.version_using,
            self.version_min,
            self.message_type as u8,
            ext[0],
            ext[1],
        ]
    }

    /// Decode a header; structural errors only, semantic screening (network,
    /// version) is the parser's job.
    pub fn from_bytes(bytes: &[u8]) -> Option<(Self, &[u8])> {
        if bytes.len() < Self::LEN || bytes[0] != MAGIC {
            return None;
        }
        let network = Network::from_id_byte(bytes[1])?;
        let message_type = MessageType::from_u8(bytes[5])?;
        Some((
            Self {
                network,
                version_max: bytes[2],
                version_using: bytes[3],
                version_min: bytes[4],
                message_type,
                extensions: u16::from_le_bytes([bytes[6], bytes[7]]),
            },
            &bytes[Self::LEN..],
        ))
    }
}
