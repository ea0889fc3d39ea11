//! Cryptographic primitives: Blake2b-256 digests and Ed25519 signatures.

pub mod hash;
pub mod keys;
pub mod sign;

pub use hash::{blake2b_256, blake2b_256_multi};
pub use keys::{deterministic_key, generate_keypair, keypair_from_private, keypair_from_seed};
pub use sign::{sign_message, validate_message};
