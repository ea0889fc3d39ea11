//! Wire codec for node-to-node UDP messages.
//!
//! Every datagram starts with the eight-byte header
//! `{magic 'R', network, version_max, version_using, version_min, type,
//! extensions:u16le}`. For publish and confirm_req the contained block's
//! type travels in extensions bits 8–11; confirm_ack votes self-describe
//! their block type in the vote body.

pub mod header;
pub mod parser;

pub use header::{MessageHeader, MessageType, VERSION_MAX, VERSION_MIN, VERSION_USING};
pub use parser::{MessageParser, ParseError};

use std::net::Ipv6Addr;
use std::sync::Arc;

use raze_ledger::{Block, Vote};
use raze_types::{Endpoint, Network};

/// Endpoints carried per keepalive.
pub const KEEPALIVE_PEERS: usize = 8;

/// A parsed node-to-node message.
#[derive(Clone, Debug)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Publish),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
}

/// Peer-list exchange. Unused slots stay at the unspecified endpoint.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    pub peers: [Endpoint; KEEPALIVE_PEERS],
}

impl Default for Keepalive {
    fn default() -> Self {
        Self {
            peers: [Endpoint::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0); KEEPALIVE_PEERS],
        }
    }
}

impl Keepalive {
    pub fn serialize(&self, network: Network) -> Vec<u8> {
        let mut out = MessageHeader::new(network, MessageType::Keepalive).to_bytes().to_vec();
        for peer in &self.peers {
            out.extend_from_slice(&peer.ip().octets());
            out.extend_from_slice(&peer.port().to_le_bytes());
        }
        out
    }
}

/// Flood a block.
#[derive(Clone, Debug)]
pub struct Publish {
    pub block: Arc<Block>,
}

impl Publish {
    pub fn serialize(&self, network: Network) -> Vec<u8> {
        let mut header = MessageHeader::new(network, MessageType::Publish);
        header.set_block_type(self.block.block_type());
        let mut out = header.to_bytes().to_vec();
        self.block.serialize(&mut out);
        out
    }
}

/// Ask peers to vote on a block's root.
#[derive(Clone, Debug)]
pub struct ConfirmReq {
    pub block: Arc<Block>,
}

impl ConfirmReq {
    pub fn serialize(&self, network: Network) -> Vec<u8> {
        let mut header = MessageHeader::new(network, MessageType::ConfirmReq);
        header.set_block_type(self.block.block_type());
        let mut out = header.to_bytes().to_vec();
        self.block.serialize(&mut out);
        out
    }
}

/// A representative's vote.
#[derive(Clone, Debug)]
pub struct ConfirmAck {
    pub vote: Arc<Vote>,
}

impl ConfirmAck {
    pub fn serialize(&self, network: Network) -> Vec<u8> {
        let mut out = MessageHeader::new(network, MessageType::ConfirmAck).to_bytes().to_vec();
        self.vote.serialize(&mut out);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::generate_keypair;
    use raze_ledger::{BlockType, SendBlock};
    use raze_types::{Account, Amount, BlockHash, Signature};

    fn sample_block() -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([1; 32]),
            destination: Account::new([2; 32]),
            balance: Amount::new(3),
            signature: Signature([4; 64]),
            work: 5,
        }))
    }

    #[test]
    fn keepalive_payload_is_144_bytes() {
        let bytes = Keepalive::default().serialize(Network::Test);
        assert_eq!(bytes.len(), 8 + 18 * KEEPALIVE_PEERS);
    }

    #[test]
    fn publish_carries_block_type_in_extensions() {
        let bytes = Publish { block: sample_block() }.serialize(Network::Test);
        let (header, _) = MessageHeader::from_bytes(&bytes).unwrap();
        assert_eq!(header.message_type, MessageType::Publish);
        assert_eq!(header.block_type(), Some(BlockType::Send));
    }

    #[test]
    fn confirm_ack_length_matches_vote() {
        let kp = generate_keypair();
        let vote = Arc::new(Vote::new(kp.public, &kp.private, 1, sample_block()));
        let bytes = ConfirmAck { vote: vote.clone() }.serialize(Network::Test);
        assert_eq!(bytes.len(), 8 + vote.to_bytes().len());
    }
}
