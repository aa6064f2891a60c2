// Path: crates/attest-crypto/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The zero-knowledge-style authentication protocol (C2, `spec.md` §4.2).
//!
//! This is a commitment-based identification scheme, not a succinct proof
//! system: a device proves knowledge of a secret by re-deriving the same
//! commitment the server stored at registration, bound to a fresh
//! timestamp and nonce so the exchange can't be replayed. The `SIMPLE`
//! scheme is the only one implemented; `SNARK`/`STARK` are reserved names
//! on [`attest_types::model::ProofScheme`] with no generator/verifier here
//! (`spec.md` §9 "Open Questions" — any future implementation of those
//! must honor the same [`AuthError`] taxonomy and equation contract below).

mod replay;

pub use replay::ReplayCache;

use attest_hash::{h_concat, Encoder};
use attest_types::error::AuthError;
use attest_types::ids::{DeviceId, Digest};
use attest_types::model::{Proof, ProofScheme};
use rand::RngCore;
use std::time::Duration;

/// Default `VALIDITY_WINDOW`, in seconds (`spec.md` §4.2).
pub const DEFAULT_VALIDITY_WINDOW_SECS: u64 = 300;

/// Computes `public_commitment = H("COMMIT" ‖ device_id ‖ H(secret))`
/// (`spec.md` §4.2 "Registration"). Pure and deterministic: equal inputs
/// always yield equal outputs (testable property 1, "commitment
/// determinism").
pub fn commitment(device_id: &DeviceId, secret: &[u8]) -> Digest {
    let secret_hash = attest_hash::h(secret);
    Digest::from_bytes(
        Encoder::new()
            .tag("COMMIT")
            .str(device_id.as_str())
            .digest(&secret_hash)
            .hash(),
    )
}

/// Generates a fresh authentication [`Proof`] for `device_id` proving
/// knowledge of `secret` at time `t` (`spec.md` §4.2 "Authentication").
///
/// Picks a random 16-byte nonce, derives `challenge = H("CHAL" ‖
/// device_id ‖ nonce ‖ t_be8)`, and `response = H(H(secret) ‖ challenge)`.
pub fn generate(device_id: &DeviceId, secret: &[u8], t: u64) -> Proof {
    let secret_hash = attest_hash::h(secret);
    let mut nonce = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    let response = derive_response(device_id, &nonce, t, &secret_hash);
    Proof {
        scheme: ProofScheme::Simple,
        device_id: device_id.clone(),
        nonce,
        timestamp: t,
        secret_hash: Digest::from_bytes(secret_hash),
        response: Digest::from_bytes(response),
    }
}

fn derive_response(
    device_id: &DeviceId,
    nonce: &[u8; 16],
    t: u64,
    secret_hash: &attest_hash::Hash32,
) -> attest_hash::Hash32 {
    let challenge = Encoder::new()
        .tag("CHAL")
        .str(device_id.as_str())
        .digest(&pad32(nonce))
        .u64_be(t)
        .hash();
    h_concat(&[secret_hash, &challenge])
}

/// Pads a 16-byte nonce into a 32-byte buffer (zero-filled high half) so it
/// can be appended through [`Encoder::digest`]'s fixed-width path. The
/// nonce width is fixed at every call site in this crate, so the padding
/// never collides across differently-shaped inputs.
fn pad32(nonce: &[u8; 16]) -> attest_hash::Hash32 {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(nonce);
    out
}

/// The outcome of a successful verification: the time the check was
/// performed, useful for the caller to update `last_authenticated_at`.
#[derive(Debug, Clone, Copy)]
pub struct Verified {
    pub at: u64,
}

/// Verifies `proof` against a previously stored `public_commitment`
/// (`spec.md` §4.2 "Verification"). The caller is responsible for looking
/// up `public_commitment` and for the `UNKNOWN_DEVICE`/`INACTIVE_DEVICE`
/// checks that require persistence access; this function performs only
/// the steps that are pure cryptography plus the in-memory replay cache.
pub fn verify(
    replay: &ReplayCache,
    proof: &Proof,
    public_commitment: &Digest,
    t_verify: u64,
    validity_window: Duration,
) -> Result<Verified, AuthError> {
    let window_secs = validity_window.as_secs();
    let delta = t_verify.abs_diff(proof.timestamp);
    if delta > window_secs {
        return Err(AuthError::StaleProof);
    }

    let recomputed_commitment = Digest::from_bytes(
        Encoder::new()
            .tag("COMMIT")
            .str(proof.device_id.as_str())
            .digest(proof.secret_hash.as_bytes())
            .hash(),
    );
    if &recomputed_commitment != public_commitment {
        return Err(AuthError::BadProof);
    }

    let expected_response = derive_response(
        &proof.device_id,
        &proof.nonce,
        proof.timestamp,
        proof.secret_hash.as_bytes(),
    );
    if expected_response != proof.response.0 {
        return Err(AuthError::BadProof);
    }

    let replay_key = replay_key(&proof.device_id, &proof.nonce, proof.timestamp);
    if !replay.check_and_insert(replay_key, t_verify, validity_window) {
        return Err(AuthError::Replay);
    }

    Ok(Verified { at: t_verify })
}

/// Computes the replay-cache key `H(device_id ‖ nonce ‖ t_be8)`
/// (`spec.md` §4.2 step 4).
fn replay_key(device_id: &DeviceId, nonce: &[u8; 16], t: u64) -> Digest {
    Digest::from_bytes(
        Encoder::new()
            .str(device_id.as_str())
            .digest(&pad32(nonce))
            .u64_be(t)
            .hash(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_types::ids::DeviceId;

    fn dev(id: &str) -> DeviceId {
        DeviceId::new(id).unwrap()
    }

    #[test]
    fn commitment_is_deterministic() {
        let a = commitment(&dev("dev-001"), b"s3cr3t");
        let b = commitment(&dev("dev-001"), b"s3cr3t");
        assert_eq!(a, b);
    }

    #[test]
    fn commitment_differs_on_any_input_change() {
        let base = commitment(&dev("dev-001"), b"s3cr3t");
        assert_ne!(base, commitment(&dev("dev-002"), b"s3cr3t"));
        assert_ne!(base, commitment(&dev("dev-001"), b"other"));
    }

    #[test]
    fn full_round_trip_verifies() {
        let replay = ReplayCache::new();
        let device_id = dev("dev-001");
        let secret = b"s3cr3t";
        let public_commitment = commitment(&device_id, secret);
        let t = 1_700_000_000u64;
        let proof = generate(&device_id, secret, t);

        let result = verify(
            &replay,
            &proof,
            &public_commitment,
            t,
            Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn replay_is_rejected_on_second_use() {
        let replay = ReplayCache::new();
        let device_id = dev("dev-001");
        let secret = b"s3cr3t";
        let public_commitment = commitment(&device_id, secret);
        let t = 1_700_000_000u64;
        let proof = generate(&device_id, secret, t);
        let window = Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS);

        assert!(verify(&replay, &proof, &public_commitment, t, window).is_ok());
        let err = verify(&replay, &proof, &public_commitment, t, window).unwrap_err();
        assert!(matches!(err, AuthError::Replay));
    }

    #[test]
    fn stale_timestamp_is_rejected_before_commitment_check() {
        let replay = ReplayCache::new();
        let device_id = dev("dev-001");
        let secret = b"s3cr3t";
        let public_commitment = commitment(&device_id, secret);
        let t = 1_700_000_000u64;
        let proof = generate(&device_id, secret, t);
        let window = Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS);

        let err = verify(&replay, &proof, &public_commitment, t + 3600, window).unwrap_err();
        assert!(matches!(err, AuthError::StaleProof));
    }

    #[test]
    fn tampered_response_is_rejected() {
        let replay = ReplayCache::new();
        let device_id = dev("dev-001");
        let secret = b"s3cr3t";
        let public_commitment = commitment(&device_id, secret);
        let t = 1_700_000_000u64;
        let mut proof = generate(&device_id, secret, t);
        proof.response.0[0] ^= 0xFF;
        let window = Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS);

        let err = verify(&replay, &proof, &public_commitment, t, window).unwrap_err();
        assert!(matches!(err, AuthError::BadProof));
    }

    #[test]
    fn wrong_secret_hash_is_rejected() {
        let replay = ReplayCache::new();
        let device_id = dev("dev-001");
        let public_commitment = commitment(&device_id, b"s3cr3t");
        let t = 1_700_000_000u64;
        // Proof generated with the wrong secret never matches the stored commitment.
        let proof = generate(&device_id, b"wrong", t);
        let window = Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS);

        let err = verify(&replay, &proof, &public_commitment, t, window).unwrap_err();
        assert!(matches!(err, AuthError::BadProof));
    }

    proptest::proptest! {
        #[test]
        fn soundness_any_bit_flip_breaks_verification(
            id in "[a-zA-Z0-9_-]{1,32}",
            secret in ".{1,32}",
            t in 1_600_000_000u64..1_800_000_000u64,
            flip_byte in 0usize..32,
        ) {
            let replay = ReplayCache::new();
            let device_id = DeviceId::new(id).unwrap();
            let public_commitment = commitment(&device_id, secret.as_bytes());
            let mut proof = generate(&device_id, secret.as_bytes(), t);
            let window = Duration::from_secs(DEFAULT_VALIDITY_WINDOW_SECS);

            // Baseline must verify.
            proptest::prop_assert!(verify(&replay, &proof, &public_commitment, t, window).is_ok());

            // Flip a bit in the response; a fresh cache avoids replay masking the check.
            let replay2 = ReplayCache::new();
            proof.response.0[flip_byte % 32] ^= 0x01;
            proptest::prop_assert!(verify(&replay2, &proof, &public_commitment, t, window).is_err());
        }
    }
}
