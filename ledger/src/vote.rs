//! Representative votes.

use std::sync::Arc;

use raze_crypto::{blake2b_256_multi, sign_message, validate_message};
use raze_types::{Account, PrivateKey, Signature};

use crate::block::{Block, BlockType, Reader};
use crate::error::CodecError;

/// A representative's statement that `block` should win the election over
/// its root. Votes from the same account are totally ordered by `sequence`;
/// a higher sequence supersedes a lower one.
#[derive(Clone, Debug)]
pub struct Vote {
    pub account: Account,
    pub signature: Signature,
    pub sequence: u64,
    pub block: Arc<Block>,
}

impl Vote {
    /// Build and sign a vote.
    pub fn new(account: Account, private: &PrivateKey, sequence: u64, block: Arc<Block>) -> Self {
        let mut vote = Self {
            account,
            signature: Signature::ZERO,
            sequence,
            block,
        };
        vote.signature = sign_message(private, &vote.digest());
        vote
    }

    /// Signing digest: `blake2b_256("vote " ‖ sequence_le ‖ block_hash)`.
    pub fn digest(&self) -> [u8; 32] {
        blake2b_256_multi(&[
            b"vote ",
            &self.sequence.to_le_bytes(),
            self.block.hash().as_bytes(),
        ])
    }

    /// Verify the signature under the voting account's key.
    pub fn validate(&self) -> bool {
        validate_message(&self.account, &self.digest(), &self.signature)
    }

    /// Wire encoding: `account ‖ signature ‖ sequence_le ‖ block_type ‖ block`.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.account.as_bytes());
        out.extend_from_slice(self.signature.as_bytes());
        out.extend_from_slice(&self.sequence.to_le_bytes());
        out.push(self.block.block_type() as u8);
        self.block.serialize(out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.serialize(&mut out);
        out
    }

    pub fn deserialize(input: &[u8]) -> Result<(Vote, usize), CodecError> {
        let mut reader = Reader::new(input);
        let account = Account::new(reader.take_32()?);
        let signature = Signature(reader.take_64()?);
        let sequence = reader.take_u64_le()?;
        let type_byte = reader.take_u8()?;
        let block_type =
            BlockType::from_u8(type_byte).ok_or(CodecError::UnknownBlockType(type_byte))?;
        let (block, used) = Block::deserialize(block_type, &input[reader.offset..])?;
        Ok((
            Vote {
                account,
                signature,
                sequence,
                block: Arc::new(block),
            },
            reader.offset + used,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{ChangeBlock, SendBlock};
    use raze_crypto::generate_keypair;
    use raze_types::{Amount, BlockHash};

    fn sample_block() -> Arc<Block> {
        Arc::new(Block::Send(SendBlock {
            previous: BlockHash::new([1; 32]),
            destination: Account::new([2; 32]),
            balance: Amount::new(99),
            signature: Signature([3; 64]),
            work: 77,
        }))
    }

    #[test]
    fn signed_vote_validates() {
        let kp = generate_keypair();
        let vote = Vote::new(kp.public, &kp.private, 5, sample_block());
        assert!(vote.validate());
    }

    #[test]
    fn sequence_is_covered_by_signature() {
        let kp = generate_keypair();
        let mut vote = Vote::new(kp.public, &kp.private, 5, sample_block());
        vote.sequence = 6;
        assert!(!vote.validate());
    }

    #[test]
    fn foreign_signature_rejected() {
        let kp = generate_keypair();
        let other = generate_keypair();
        let mut vote = Vote::new(kp.public, &kp.private, 1, sample_block());
        vote.account = other.public;
        assert!(!vote.validate());
    }

    #[test]
    fn round_trip_is_byte_identical() {
        let kp = generate_keypair();
        let vote = Vote::new(kp.public, &kp.private, 30_000, sample_block());
        let bytes = vote.to_bytes();
        let (decoded, used) = Vote::deserialize(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded.to_bytes(), bytes);
        assert!(decoded.validate());
    }

    #[test]
    fn round_trip_preserves_block_type() {
        let kp = generate_keypair();
        let change = Arc::new(Block::Change(ChangeBlock {
            previous: BlockHash::new([4; 32]),
            representative: Account::new([5; 32]),
            signature: Signature([6; 64]),
            work: 1,
        }));
        let vote = Vote::new(kp.public, &kp.private, 2, change);
        let (decoded, _) = Vote::deserialize(&vote.to_bytes()).unwrap();
        assert_eq!(decoded.block.block_type(), BlockType::Change);
    }

    #[test]
    fn unknown_block_type_rejected() {
        let kp = generate_keypair();
        let mut bytes = Vote::new(kp.public, &kp.private, 1, sample_block()).to_bytes();
        bytes[32 + 64 + 8] = 9;
        assert_eq!(
            Vote::deserialize(&bytes).unwrap_err(),
            CodecError::UnknownBlockType(9)
        );
    }
}
