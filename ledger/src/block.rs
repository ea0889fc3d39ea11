//! Block variants and their canonical binary codec.
//!
//! A block's hash is the Blake2b-256 digest of its hashable fields only;
//! the signature and work nonce are excluded so that re-signing or re-working
//! a block never changes its identity.

use serde_json::json;

use raze_crypto::blake2b_256_multi;
use raze_types::{Account, Amount, BlockHash, Signature};

use crate::error::CodecError;

/// The four block kinds. Discriminants match the wire encoding used in
/// message-header extensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlockType {
    Send = 2,
    Receive = 3,
    Open = 4,
    Change = 5,
}

impl BlockType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(BlockType::Send),
            3 => Some(BlockType::Receive),
            4 => Some(BlockType::Open),
            5 => Some(BlockType::Change),
            _ => None,
        }
    }

    /// Size in bytes of a serialized block of this type.
    pub fn serialized_size(self) -> usize {
        match self {
            BlockType::Send => 32 + 32 + 16 + 64 + 8,
            BlockType::Receive => 32 + 32 + 64 + 8,
            BlockType::Open => 32 + 32 + 32 + 64 + 8,
            BlockType::Change => 32 + 32 + 64 + 8,
        }
    }
}

/// Debits the sender: `balance` is the account balance *after* the send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendBlock {
    pub previous: BlockHash,
    pub destination: Account,
    pub balance: Amount,
    pub signature: Signature,
    pub work: u64,
}

/// Credits the receiver from an earlier send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveBlock {
    pub previous: BlockHash,
    pub source: BlockHash,
    pub signature: Signature,
    pub work: u64,
}

/// First block of an account chain; names its voting representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenBlock {
    pub source: BlockHash,
    pub representative: Account,
    pub account: Account,
    pub signature: Signature,
    pub work: u64,
}

/// Re-delegates the account's weight to a different representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBlock {
    pub previous: BlockHash,
    pub representative: Account,
    pub signature: Signature,
    pub work: u64,
}

/// A block in an account chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Send(_) => BlockType::Send,
            Block::Receive(_) => BlockType::Receive,
            Block::Open(_) => BlockType::Open,
            Block::Change(_) => BlockType::Change,
        }
    }

    /// Blake2b-256 over the hashable fields (excluding signature and work).
    pub fn hash(&self) -> BlockHash {
        let digest = match self {
            Block::Send(b) => blake2b_256_multi(&[
                b.previous.as_bytes(),
                b.destination.as_bytes(),
                &b.balance.to_be_bytes(),
            ]),
            Block::Receive(b) => {
                blake2b_256_multi(&[b.previous.as_bytes(), b.source.as_bytes()])
            }
            Block::Open(b) => blake2b_256_multi(&[
                b.source.as_bytes(),
                b.representative.as_bytes(),
                b.account.as_bytes(),
            ]),
            Block::Change(b) => {
                blake2b_256_multi(&[b.previous.as_bytes(), b.representative.as_bytes()])
            }
        };
        BlockHash::new(digest)
    }

    /// The election key: an open block's root is the account it opens, every
    /// other block's root is its `previous` hash.
    pub fn root(&self) -> BlockHash {
        match self {
            Block::Open(b) => b.account.into(),
            other => other.previous(),
        }
    }

    /// `previous` hash; zero for open blocks.
    pub fn previous(&self) -> BlockHash {
        match self {
            Block::Send(b) => b.previous,
            Block::Receive(b) => b.previous,
            Block::Open(_) => BlockHash::ZERO,
            Block::Change(b) => b.previous,
        }
    }

    /// The send block consumed by a receive or open.
    pub fn source(&self) -> Option<BlockHash> {
        match self {
            Block::Receive(b) => Some(b.source),
            Block::Open(b) => Some(b.source),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<Account> {
        match self {
            Block::Send(b) => Some(b.destination),
            _ => None,
        }
    }

    pub fn representative(&self) -> Option<Account> {
        match self {
            Block::Open(b) => Some(b.representative),
            Block::Change(b) => Some(b.representative),
            _ => None,
        }
    }

    pub fn balance(&self) -> Option<Amount> {
        match self {
            Block::Send(b) => Some(b.balance),
            _ => None,
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Block::Send(b) => &b.signature,
            Block::Receive(b) => &b.signature,
            Block::Open(b) => &b.signature,
            Block::Change(b) => &b.signature,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        match self {
            Block::Send(b) => b.signature = signature,
            Block::Receive(b) => b.signature = signature,
            Block::Open(b) => b.signature = signature,
            Block::Change(b) => b.signature = signature,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Block::Send(b) => b.work,
            Block::Receive(b) => b.work,
            Block::Open(b) => b.work,
            Block::Change(b) => b.work,
        }
    }

    pub fn set_work(&mut self, work: u64) {
        match self {
            Block::Send(b) => b.work = work,
            Block::Receive(b) => b.work = work,
            Block::Open(b) => b.work = work,
            Block::Change(b) => b.work = work,
        }
    }

    /// Append the wire encoding (fixed size per type, work little-endian).
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Block::Send(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.destination.as_bytes());
                out.extend_from_slice(&b.balance.to_be_bytes());
                out.extend_from_slice(b.signature.as_bytes());
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Block::Receive(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.source.as_bytes());
                out.extend_from_slice(b.signature.as_bytes());
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Block::Open(b) => {
                out.extend_from_slice(b.source.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(b.account.as_bytes());
                out.extend_from_slice(b.signature.as_bytes());
                out.extend_from_slice(&b.work.to_le_bytes());
            }
            Block::Change(b) => {
                out.extend_from_slice(b.previous.as_bytes());
                out.extend_from_slice(b.representative.as_bytes());
                out.extend_from_slice(b.signature.as_bytes());
                out.extend_from_slice(&b.work.to_le_bytes());
            }
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.block_type().serialized_size());
        self.serialize(&mut out);
        out
    }

    /// Decode a block of a known type. Fails on short input; trailing bytes
    /// are left for the caller.
    pub fn deserialize(block_type: BlockType, input: &[u8]) -> Result<(Block, usize), CodecError> {
        let mut reader = Reader::new(input);
        let block = match block_type {
            BlockType::Send => Block::Send(SendBlock {
                previous: BlockHash::new(reader.take_32()?),
                destination: Account::new(reader.take_32()?),
                balance: Amount::from_be_bytes(reader.take_16()?),
                signature: Signature(reader.take_64()?),
                work: reader.take_u64_le()?,
            }),
            BlockType::Receive => Block::Receive(ReceiveBlock {
                previous: BlockHash::new(reader.take_32()?),
                source: BlockHash::new(reader.take_32()?),
                signature: Signature(reader.take_64()?),
                work: reader.take_u64_le()?,
            }),
            BlockType::Open => Block::Open(OpenBlock {
                source: BlockHash::new(reader.take_32()?),
                representative: Account::new(reader.take_32()?),
                account: Account::new(reader.take_32()?),
                signature: Signature(reader.take_64()?),
                work: reader.take_u64_le()?,
            }),
            BlockType::Change => Block::Change(ChangeBlock {
                previous: BlockHash::new(reader.take_32()?),
                representative: Account::new(reader.take_32()?),
                signature: Signature(reader.take_64()?),
                work: reader.take_u64_le()?,
            }),
        };
        Ok((block, reader.offset))
    }

    /// JSON rendering used by the block-accepted HTTP callback.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Block::Send(b) => json!({
                "type": "send",
                "previous": b.previous.to_string(),
                "destination": b.destination.to_string(),
                "balance": b.balance.to_string(),
                "signature": b.signature.to_string(),
                "work": format!("{:016X}", b.work),
            }),
            Block::Receive(b) => json!({
                "type": "receive",
                "previous": b.previous.to_string(),
                "source": b.source.to_string(),
                "signature": b.signature.to_string(),
                "work": format!("{:016X}", b.work),
            }),
            Block::Open(b) => json!({
                "type": "open",
                "source": b.source.to_string(),
                "representative": b.representative.to_string(),
                "account": b.account.to_string(),
                "signature": b.signature.to_string(),
                "work": format!("{:016X}", b.work),
            }),
            Block::Change(b) => json!({
                "type": "change",
                "previous": b.previous.to_string(),
                "representative": b.representative.to_string(),
                "signature": b.signature.to_string(),
                "work": format!("{:016X}", b.work),
            }),
        }
    }
}

/// Bounds-checked slice reader shared by the block and vote codecs.
pub(crate) struct Reader<'a> {
    input: &'a [u8],
    pub(crate) offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.offset.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.input.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.input[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    pub(crate) fn take_16(&mut self) -> Result<[u8; 16], CodecError> {
        Ok(self.take(16)?.try_into().expect("length checked"))
    }

    pub(crate) fn take_32(&mut self) -> Result<[u8; 32], CodecError> {
        Ok(self.take(32)?.try_into().expect("length checked"))
    }

    pub(crate) fn take_64(&mut self) -> Result<[u8; 64], CodecError> {
        Ok(self.take(64)?.try_into().expect("length checked"))
    }

    pub(crate) fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub(crate) fn take_u64_le(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().expect("length checked")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    pub(crate) fn sample_send() -> Block {
        Block::Send(SendBlock {
            previous: BlockHash::new([1; 32]),
            destination: Account::new([2; 32]),
            balance: Amount::new(12345),
            signature: Signature([3; 64]),
            work: 0xDEAD_BEEF_0BAD_F00D,
        })
    }

    #[test]
    fn serialized_sizes() {
        assert_eq!(BlockType::Send.serialized_size(), 152);
        assert_eq!(BlockType::Receive.serialized_size(), 136);
        assert_eq!(BlockType::Open.serialized_size(), 168);
        assert_eq!(BlockType::Change.serialized_size(), 136);
    }

    #[test]
    fn send_round_trip_is_byte_identical() {
        let block = sample_send();
        let bytes = block.to_bytes();
        assert_eq!(bytes.len(), 152);
        let (decoded, used) = Block::deserialize(BlockType::Send, &bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(decoded.to_bytes(), bytes);
        assert_eq!(decoded, block);
    }

    #[test]
    fn truncated_input_rejected() {
        let bytes = sample_send().to_bytes();
        let result = Block::deserialize(BlockType::Send, &bytes[..bytes.len() - 1]);
        assert_eq!(result.unwrap_err(), CodecError::Truncated);
    }

    #[test]
    fn hash_excludes_signature_and_work() {
        let block = sample_send();
        let mut resigned = block.clone();
        resigned.set_signature(Signature([9; 64]));
        resigned.set_work(42);
        assert_eq!(block.hash(), resigned.hash());
    }

    #[test]
    fn hash_covers_every_hashable_field() {
        let block = sample_send();
        let mut other = block.clone();
        if let Block::Send(ref mut b) = other {
            b.balance = Amount::new(54321);
        }
        assert_ne!(block.hash(), other.hash());
    }

    #[test]
    fn open_root_is_account() {
        let open = Block::Open(OpenBlock {
            source: BlockHash::new([1; 32]),
            representative: Account::new([2; 32]),
            account: Account::new([3; 32]),
            signature: Signature::ZERO,
            work: 0,
        });
        assert_eq!(open.root(), BlockHash::new([3; 32]));
        assert!(open.previous().is_zero());
    }

    #[test]
    fn non_open_root_is_previous() {
        let block = sample_send();
        assert_eq!(block.root(), BlockHash::new([1; 32]));
    }

    fn arb_block() -> impl Strategy<Value = Block> {
        let send = (any::<[u8; 32]>(), any::<[u8; 32]>(), any::<u128>(), any::<u64>()).prop_map(
            |(previous, destination, balance, work)| {
                Block::Send(SendBlock {
                    previous: BlockHash::new(previous),
                    destination: Account::new(destination),
                    balance: Amount::new(balance),
                    signature: Signature([7; 64]),
                    work,
                })
            },
        );
        let receive = (any::<[u8; 32]>(), any::<[u8; 32]>(), any::<u64>()).prop_map(
            |(previous, source, work)| {
                Block::Receive(ReceiveBlock {
                    previous: BlockHash::new(previous),
                    source: BlockHash::new(source),
                    signature: Signature([7; 64]),
                    work,
                })
            },
        );
        let open = (any::<[u8; 32]>(), any::<[u8; 32]>(), any::<[u8; 32]>(), any::<u64>())
            .prop_map(|(source, representative, account, work)| {
                Block::Open(OpenBlock {
                    source: BlockHash::new(source),
                    representative: Account::new(representative),
                    account: Account::new(account),
                    signature: Signature([7; 64]),
                    work,
                })
            });
        let change = (any::<[u8; 32]>(), any::<[u8; 32]>(), any::<u64>()).prop_map(
            |(previous, representative, work)| {
                Block::Change(ChangeBlock {
                    previous: BlockHash::new(previous),
                    representative: Account::new(representative),
                    signature: Signature([7; 64]),
                    work,
                })
            },
        );
        prop_oneof![send, receive, open, change]
    }

    proptest! {
        #[test]
        fn any_block_round_trips(block in arb_block()) {
            let bytes = block.to_bytes();
            prop_assert_eq!(bytes.len(), block.block_type().serialized_size());
            let (decoded, used) = Block::deserialize(block.block_type(), &bytes).unwrap();
            prop_assert_eq!(used, bytes.len());
            prop_assert_eq!(decoded.to_bytes(), bytes);
        }
    }
}
