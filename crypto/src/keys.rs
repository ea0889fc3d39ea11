//! Ed25519 key generation and deterministic derivation.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

use raze_types::{Account, KeyPair, PrivateKey};

use crate::hash::blake2b_256_multi;

/// Generate a new key pair from the operating system's secure random source.
pub fn generate_keypair() -> KeyPair {
    let signing = SigningKey::generate(&mut OsRng);
    KeyPair {
        public: Account::new(signing.verifying_key().to_bytes()),
        private: PrivateKey(signing.to_bytes()),
    }
}

/// Reconstruct a full key pair from a private key.
pub fn keypair_from_private(private: PrivateKey) -> KeyPair {
    let signing = SigningKey::from_bytes(private.as_bytes());
    KeyPair {
        public: Account::new(signing.verifying_key().to_bytes()),
        private,
    }
}

/// Derive the key at `index` from a 32-byte wallet seed:
/// `blake2b_256(seed ‖ index_be)`.
pub fn deterministic_key(seed: &[u8; 32], index: u32) -> PrivateKey {
    PrivateKey(blake2b_256_multi(&[seed, &index.to_be_bytes()]))
}

/// Key pair at index 0 of a seed. Convenience for test fixtures and the
/// dev-network genesis.
pub fn keypair_from_seed(seed: &[u8; 32]) -> KeyPair {
    keypair_from_private(deterministic_key(seed, 0))
}
