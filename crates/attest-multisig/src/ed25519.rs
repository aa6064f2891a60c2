// Path: crates/attest-multisig/src/ed25519.rs
//! The default [`SignaturePredicate`](crate::SignaturePredicate) implementation.

use crate::SignaturePredicate;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Verifies Ed25519 signatures. Signers' `public_key` bytes must be a
/// 32-byte Ed25519 verifying key and `signature` a 64-byte Ed25519 signature;
/// anything else fails closed rather than panicking.
#[derive(Debug, Default, Clone, Copy)]
pub struct Ed25519SignaturePredicate;

impl SignaturePredicate for Ed25519SignaturePredicate {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
        let Ok(key_bytes) = <[u8; 32]>::try_from(public_key) else {
            return false;
        };
        let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
            return false;
        };
        let Ok(sig_bytes) = <[u8; 64]>::try_from(signature) else {
            return false;
        };
        let signature = Signature::from_bytes(&sig_bytes);
        verifying_key.verify(message, &signature).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer as _, SigningKey};
    use rand::rngs::OsRng;

    #[test]
    fn verifies_genuine_signature() {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let message = b"approve proposal";
        let signature = signing_key.sign(message);

        let predicate = Ed25519SignaturePredicate;
        assert!(predicate.verify(
            signing_key.verifying_key().as_bytes(),
            message,
            &signature.to_bytes(),
        ));
    }

    #[test]
    fn rejects_tampered_message() {
        let mut csprng = OsRng;
        let signing_key = SigningKey::generate(&mut csprng);
        let signature = signing_key.sign(b"approve proposal");

        let predicate = Ed25519SignaturePredicate;
        assert!(!predicate.verify(
            signing_key.verifying_key().as_bytes(),
            b"reject proposal",
            &signature.to_bytes(),
        ));
    }

    #[test]
    fn rejects_malformed_key_without_panicking() {
        let predicate = Ed25519SignaturePredicate;
        assert!(!predicate.verify(&[0u8; 4], b"msg", &[0u8; 64]));
    }
}
