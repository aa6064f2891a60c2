// Path: crates/attest-api/src/secret_cipher.rs
//! Encryption for `ProposalKind::RegisterDevice.secret_ciphertext`.
//!
//! The wire boundary (`spec.md` §6) never carries a device secret in the
//! clear once it is folded into a multi-sig proposal, since proposals sit
//! in the store — potentially for days — before `execute` consumes them.
//! This is a counter-mode keystream built from [`attest_hash::h`] (the
//! same keccak-256 primitive every other consensus-critical hash in this
//! kernel uses), keyed by a server-side key never returned over the wire.

use attest_hash::h;

/// A server-side key for [`encrypt`]/[`decrypt`]. Generated once per
/// process and held only in memory; a proposal encrypted under one
/// process's key cannot be decrypted by another, which is acceptable
/// since proposals are always executed by the same deployment that
/// created them.
#[derive(Clone)]
pub struct SecretCipherKey(Vec<u8>);

impl SecretCipherKey {
    pub fn new(key_material: impl Into<Vec<u8>>) -> Self {
        Self(key_material.into())
    }

    /// Derives the keystream block for counter `ctr`: `H(key ‖ ctr_be8)`.
    fn block(&self, ctr: u64) -> [u8; 32] {
        let mut buf = Vec::with_capacity(self.0.len() + 8);
        buf.extend_from_slice(&self.0);
        buf.extend_from_slice(&ctr.to_be_bytes());
        h(&buf)
    }

    fn apply_keystream(&self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len());
        for (i, chunk) in data.chunks(32).enumerate() {
            let block = self.block(i as u64);
            for (b, k) in chunk.iter().zip(block.iter()) {
                out.push(b ^ k);
            }
        }
        out
    }
}

/// Encrypts `secret` into opaque ciphertext for a proposal.
pub fn encrypt(key: &SecretCipherKey, secret: &[u8]) -> Vec<u8> {
    key.apply_keystream(secret)
}

/// Decrypts ciphertext produced by [`encrypt`]. The keystream is its own
/// inverse (XOR), so this is the same operation.
pub fn decrypt(key: &SecretCipherKey, ciphertext: &[u8]) -> Vec<u8> {
    key.apply_keystream(ciphertext)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_across_multiple_blocks() {
        let key = SecretCipherKey::new(b"server-secret-key".to_vec());
        let secret = b"a secret long enough to span more than one 32-byte keystream block";
        let ciphertext = encrypt(&key, secret);
        assert_ne!(ciphertext, secret);
        assert_eq!(decrypt(&key, &ciphertext), secret);
    }

    #[test]
    fn different_keys_do_not_decrypt_each_other() {
        let key_a = SecretCipherKey::new(b"key-a".to_vec());
        let key_b = SecretCipherKey::new(b"key-b".to_vec());
        let ciphertext = encrypt(&key_a, b"s3cr3t");
        assert_ne!(decrypt(&key_b, &ciphertext), b"s3cr3t");
    }
}
