//! Datagram parsing with per-kind error reporting.
//!
//! The receive loop feeds raw datagrams through [`MessageParser::parse`];
//! each failure kind maps onto one of the network's drop counters. Contained
//! blocks are screened for sufficient work here so nothing below the codec
//! ever sees an under-worked block.

use std::net::Ipv6Addr;
use std::sync::Arc;

use thiserror::Error;

use raze_ledger::{Block, Vote};
use raze_types::{Endpoint, Network};
use raze_work::work_validate;

use crate::header::{MessageHeader, MessageType};
use crate::{ConfirmAck, ConfirmReq, Keepalive, Message, Publish, KEEPALIVE_PEERS};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("malformed header")]
    BadHeader,
    #[error("message for network {0:?}")]
    WrongNetwork(Network),
    #[error("peer version {0} below minimum")]
    VersionTooOld(u8),
    #[error("message type {0:?} not valid on the gossip socket")]
    UnexpectedType(MessageType),
    #[error("malformed {0:?} body")]
    BadBody(MessageType),
    #[error("insufficient work")]
    InsufficientWork,
}

/// Stateless parser bound to one network and its work threshold.
#[derive(Clone, Copy, Debug)]
pub struct MessageParser {
    pub network: Network,
    pub work_threshold: u64,
}

impl MessageParser {
    pub fn new(network: Network, work_threshold: u64) -> Self {
        Self {
            network,
            work_threshold,
        }
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<(MessageHeader, Message), ParseError> {
        let (header, body) = MessageHeader::from_bytes(bytes).ok_or(ParseError::BadHeader)?;
        if header.network != self.network {
            return Err(ParseError::WrongNetwork(header.network));
        }
        if header.version_using < crate::header::VERSION_MIN {
            return Err(ParseError::VersionTooOld(header.version_using));
        }
        let message = match header.message_type {
            MessageType::Keepalive => self.parse_keepalive(body)?,
            MessageType::Publish => {
                let block = self.parse_block(&header, body)?;
                Message::Publish(Publish { block })
            }
            MessageType::ConfirmReq => {
                let block = self.parse_block(&header, body)?;
                Message::ConfirmReq(ConfirmReq { block })
            }
            MessageType::ConfirmAck => self.parse_confirm_ack(body)?,
            other => return Err(ParseError::UnexpectedType(other)),
        };
        Ok((header, message))
    }

    fn parse_keepalive(&self, body: &[u8]) -> Result<Message, ParseError> {
        if body.len() != KEEPALIVE_PEERS * 18 {
            return Err(ParseError::BadBody(MessageType::Keepalive));
        }
        let mut message = Keepalive::default();
        for (slot, chunk) in message.peers.iter_mut().zip(body.chunks_exact(18)) {
            let octets: [u8; 16] = chunk[0..16].try_into().expect("length checked");
            let port = u16::from_le_bytes([chunk[16], chunk[17]]);
            *slot = Endpoint::new(Ipv6Addr::from(octets), port, 0, 0);
        }
        Ok(Message::Keepalive(message))
    }

    fn parse_block(
        &self,
        header: &MessageHeader,
        body: &[u8],
    ) -> Result<Arc<Block>, ParseError> {
        let block_type = header
            .block_type()
            .ok_or(ParseError::BadBody(header.message_type))?;
        let (block, used) = Block::deserialize(block_type, body)
            .map_err(|_| ParseError::BadBody(header.message_type))?;
        if used != body.len() {
            return Err(ParseError::BadBody(header.message_type));
        }
        self.screen_work(&block)?;
        Ok(Arc::new(block))
    }

    fn parse_confirm_ack(&self, body: &[u8]) -> Result<Message, ParseError> {
        let (vote, used) =
            Vote::deserialize(body).map_err(|_| ParseError::BadBody(MessageType::ConfirmAck))?;
        if used != body.len() {
            return Err(ParseError::BadBody(MessageType::ConfirmAck));
        }
        self.screen_work(&vote.block)?;
        Ok(Message::ConfirmAck(ConfirmAck {
            vote: Arc::new(vote),
        }))
    }

    fn screen_work(&self, block: &Block) -> Result<(), ParseError> {
        if work_validate(&block.root(), block.work(), self.work_threshold) {
            Ok(())
        } else {
            Err(ParseError::InsufficientWork)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::generate_keypair;
    use raze_ledger::SendBlock;
    use raze_types::{Account, Amount, BlockHash, Signature};

    fn worked_block() -> Arc<Block> {
        let mut block = Block::Send(SendBlock {
            previous: BlockHash::new([1; 32]),
            destination: Account::new([2; 32]),
            balance: Amount::new(3),
            signature: Signature([4; 64]),
            work: 0,
        });
        let mut work = 0u64;
        while !work_validate(&block.root(), work, raze_work::PUBLISH_TEST_THRESHOLD) {
            work += 1;
        }
        block.set_work(work);
        Arc::new(block)
    }

    fn parser() -> MessageParser {
        MessageParser::new(Network::Test, raze_work::PUBLISH_TEST_THRESHOLD)
    }

    #[test]
    fn publish_round_trip() {
        let block = worked_block();
        let bytes = Publish { block: block.clone() }.serialize(Network::Test);
        match parser().parse(&bytes).unwrap().1 {
            Message::Publish(publish) => assert_eq!(publish.block.hash(), block.hash()),
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn confirm_req_round_trip() {
        let block = worked_block();
        let bytes = ConfirmReq { block: block.clone() }.serialize(Network::Test);
        match parser().parse(&bytes).unwrap().1 {
            Message::ConfirmReq(req) => assert_eq!(req.block.hash(), block.hash()),
            other => panic!("expected confirm_req, got {other:?}"),
        }
    }

    #[test]
    fn confirm_ack_round_trip() {
        let kp = generate_keypair();
        let vote = Arc::new(Vote::new(kp.public, &kp.private, 9, worked_block()));
        let bytes = ConfirmAck { vote: vote.clone() }.serialize(Network::Test);
        match parser().parse(&bytes).unwrap().1 {
            Message::ConfirmAck(ack) => {
                assert_eq!(ack.vote.sequence, 9);
                assert_eq!(ack.vote.to_bytes(), vote.to_bytes());
            }
            other => panic!("expected confirm_ack, got {other:?}"),
        }
    }

    #[test]
    fn keepalive_round_trip() {
        let mut keepalive = Keepalive::default();
        keepalive.peers[0] = "[::ffff:1.2.3.4]:7075".parse().unwrap();
        keepalive.peers[3] = "[2001:4860::8888]:54000".parse().unwrap();
        let bytes = keepalive.serialize(Network::Test);
        match parser().parse(&bytes).unwrap().1 {
            Message::Keepalive(decoded) => assert_eq!(decoded, keepalive),
            other => panic!("expected keepalive, got {other:?}"),
        }
    }

    #[test]
    fn insufficient_work_screened() {
        let mut block = (*worked_block()).clone();
        let mut bad_work = 0u64;
        while work_validate(&block.root(), bad_work, raze_work::PUBLISH_TEST_THRESHOLD) {
            bad_work += 1;
        }
        block.set_work(bad_work);
        let bytes = Publish { block: Arc::new(block) }.serialize(Network::Test);
        assert_eq!(parser().parse(&bytes).unwrap_err(), ParseError::InsufficientWork);
    }

    #[test]
    fn wrong_network_dropped() {
        let bytes = Keepalive::default().serialize(Network::Live);
        assert_eq!(
            parser().parse(&bytes).unwrap_err(),
            ParseError::WrongNetwork(Network::Live)
        );
    }

    #[test]
    fn stale_version_dropped() {
        let mut bytes = Keepalive::default().serialize(Network::Test);
        bytes[3] = crate::header::VERSION_MIN - 1;
        assert_eq!(
            parser().parse(&bytes).unwrap_err(),
            ParseError::VersionTooOld(crate::header::VERSION_MIN - 1)
        );
    }

    #[test]
    fn bootstrap_types_rejected_on_gossip_socket() {
        let mut header = crate::MessageHeader::new(Network::Test, MessageType::BulkPull);
        header.extensions = 0;
        let bytes = header.to_bytes();
        assert_eq!(
            parser().parse(&bytes).unwrap_err(),
            ParseError::UnexpectedType(MessageType::BulkPull)
        );
    }

    #[test]
    fn truncated_body_rejected() {
        let block = worked_block();
        let bytes = Publish { block }.serialize(Network::Test);
        assert!(matches!(
            parser().parse(&bytes[..bytes.len() - 4]),
            Err(ParseError::BadBody(MessageType::Publish))
        ));
    }

    #[test]
    fn garbage_rejected() {
        assert_eq!(parser().parse(&[0xFF; 40]).unwrap_err(), ParseError::BadHeader);
    }
}
