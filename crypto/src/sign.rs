//! Ed25519 message signing and verification.

use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};

use raze_types::{Account, PrivateKey, Signature};

/// Sign a message digest with a private key.
pub fn sign_message(private: &PrivateKey, message: &[u8]) -> Signature {
    let signing = SigningKey::from_bytes(private.as_bytes());
    Signature(signing.sign(message).to_bytes())
}

/// Verify a signature against a message and the signing account.
///
/// Returns `true` when the signature is valid. Malformed public keys and
/// non-canonical signatures verify as invalid rather than erroring.
pub fn validate_message(account: &Account, message: &[u8], signature: &Signature) -> bool {
    let Ok(verifying) = VerifyingKey::from_bytes(account.as_bytes()) else {
        return false;
    };
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    verifying.verify(message, &sig).is_ok()
}
