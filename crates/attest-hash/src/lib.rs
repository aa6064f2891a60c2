// Path: crates/attest-hash/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! Canonical keccak-256 hashing (`H`) and the byte-stable tuple encoding
//! every downstream hash (commitments, proofs, Merkle nodes) is built on.
//!
//! This crate is the ground truth for serialization: two implementations
//! that disagree on a single byte here disagree on every anchor root they
//! produce, so the encoding rules are deliberately rigid rather than
//! ergonomic. All consensus-critical data passes through [`Encoder`]
//! instead of `serde`/`bincode`, which do not guarantee a stable wire
//! format across versions.

use sha3::{Digest as _, Keccak256};

/// A 32-byte keccak-256 digest.
pub type Hash32 = [u8; 32];

/// Computes `H(bytes) = keccak256(bytes)`.
pub fn h(bytes: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    let out = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    digest
}

/// Computes `H` over the concatenation of several byte slices without an
/// intermediate allocation per caller — equivalent to
/// `h(&[a, b, c].concat())` but avoids the concat when used directly.
pub fn h_concat(parts: &[&[u8]]) -> Hash32 {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let out = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&out);
    digest
}

/// Builds the canonical byte encoding of a tuple of fields.
///
/// Strings are length-prefixed with a 4-byte big-endian length; integers
/// are encoded 8-byte big-endian unless a field explicitly narrows that
/// (`u8`/fixed-width hash values are written as-is, with no length prefix,
/// since their width is already fixed and known to both ends). No field
/// is ever ambiguous about where it ends.
#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Appends a length-prefixed UTF-8 string tag, e.g. `"COMMIT"`, `"LEAF"`.
    pub fn tag(mut self, s: &str) -> Self {
        self.bytes(s.as_bytes());
        self
    }

    /// Appends a length-prefixed byte string.
    pub fn bytes(&mut self, b: &[u8]) {
        let len = u32::try_from(b.len()).unwrap_or(u32::MAX);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(b);
    }

    /// Appends a fixed-width 32-byte digest with no length prefix.
    pub fn digest(mut self, d: &Hash32) -> Self {
        self.buf.extend_from_slice(d);
        self
    }

    /// Appends an 8-byte big-endian unsigned integer.
    pub fn u64_be(mut self, v: u64) -> Self {
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Appends a length-prefixed UTF-8 string value.
    pub fn str(mut self, s: &str) -> Self {
        self.bytes(s.as_bytes());
        self
    }

    /// Appends a length-prefixed opaque byte string.
    pub fn blob(mut self, b: &[u8]) -> Self {
        self.bytes(b);
        self
    }

    /// Finalizes the buffer without hashing it, for callers that need the
    /// raw canonical bytes (e.g. as the `payload` passed into a Merkle leaf).
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Finalizes and hashes the buffer in one step.
    pub fn hash(self) -> Hash32 {
        h(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h_is_deterministic() {
        assert_eq!(h(b"hello"), h(b"hello"));
        assert_ne!(h(b"hello"), h(b"world"));
    }

    #[test]
    fn h_concat_matches_manual_concat() {
        let parts: &[&[u8]] = &[b"a", b"b", b"c"];
        let concatenated = [b"a".as_slice(), b"b".as_slice(), b"c".as_slice()].concat();
        assert_eq!(h_concat(parts), h(&concatenated));
    }

    #[test]
    fn encoder_distinguishes_field_boundaries() {
        // "ab", "c" must hash differently from "a", "bc": length prefixes
        // must prevent boundary ambiguity.
        let a = Encoder::new().str("ab").str("c").hash();
        let b = Encoder::new().str("a").str("bc").hash();
        assert_ne!(a, b);
    }

    #[test]
    fn encoder_is_order_sensitive() {
        let a = Encoder::new().str("x").u64_be(1).hash();
        let b = Encoder::new().u64_be(1).str("x").hash();
        assert_ne!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn h_never_panics_on_arbitrary_input(data: Vec<u8>) {
            let _ = h(&data);
        }

        #[test]
        fn encoder_roundtrip_is_deterministic(s in ".*", n: u64) {
            let a = Encoder::new().str(&s).u64_be(n).hash();
            let b = Encoder::new().str(&s).u64_be(n).hash();
            proptest::prop_assert_eq!(a, b);
        }
    }
}
