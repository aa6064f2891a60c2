// Path: crates/attest-merkle/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The Merkle anchoring engine (C3, `spec.md` §4.3): leaf hashing, tree
//! construction, inclusion proofs, and verification.
//!
//! Shape is fixed: a binary hash tree over an ordered leaf sequence, with
//! the last node at any odd-length level duplicated rather than promoted
//! unpaired. This duplication rule is load-bearing for proof
//! compatibility (`spec.md` §8 property 5) — changing it changes every
//! root this crate has ever produced.

use attest_hash::Encoder;
use attest_types::error::MerkleError;
use attest_types::ids::Digest;
use serde::{Deserialize, Serialize};

/// Computes the leaf hash `L = H("LEAF" ‖ canonical(payload))`.
///
/// `canonical` is the payload's `serde_json` serialization: `Value`'s
/// object map is a `BTreeMap` by default (this crate does not enable
/// `serde_json`'s `preserve_order` feature anywhere in the workspace), so
/// key order is always sorted and the encoding is byte-stable regardless
/// of the order fields were inserted in by the caller.
pub fn leaf_hash(payload: &serde_json::Value) -> Result<Digest, serde_json::Error> {
    let canonical = serde_json::to_vec(payload)?;
    Ok(Digest::from_bytes(
        Encoder::new().tag("LEAF").blob(&canonical).hash(),
    ))
}

/// Computes one internal node `N = H("NODE" ‖ left ‖ right)`.
pub fn node_hash(left: &Digest, right: &Digest) -> Digest {
    Digest::from_bytes(
        Encoder::new()
            .tag("NODE")
            .digest(left.as_bytes())
            .digest(right.as_bytes())
            .hash(),
    )
}

/// Which side of a walked node a proof sibling sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Left,
    Right,
}

/// One step of an inclusion proof: a sibling hash and which side it sits
/// on relative to the node being walked up from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    pub sibling: Digest,
    pub side: Side,
}

/// A built Merkle tree: every layer from the leaves up to the single-node
/// root layer, kept so inclusion proofs can be served without rebuilding.
#[derive(Debug, Clone)]
pub struct Tree {
    /// `layers[0]` is the leaf layer; the last layer is `[root]`.
    layers: Vec<Vec<Digest>>,
}

impl Tree {
    /// Builds a tree over `leaves` in the given order. Rejects an empty
    /// leaf set (`spec.md` §4.3 "rejects empty input").
    pub fn build(leaves: &[Digest]) -> Result<Self, MerkleError> {
        if leaves.is_empty() {
            return Err(MerkleError::EmptyLeafSet);
        }
        let mut layers = vec![leaves.to_vec()];
        loop {
            let current = match layers.last() {
                Some(layer) => layer,
                None => break,
            };
            if current.len() == 1 {
                break;
            }
            let mut next = Vec::with_capacity(current.len().div_ceil(2));
            let mut i = 0;
            while i < current.len() {
                let left = &current[i];
                // Odd level: duplicate the last node, paired with itself.
                let right = current.get(i + 1).unwrap_or(left);
                next.push(node_hash(left, right));
                i += 2;
            }
            layers.push(next);
        }
        Ok(Self { layers })
    }

    /// The tree's root hash.
    pub fn root(&self) -> Digest {
        // `build` always leaves exactly one node in the final layer, and
        // `layers` is never empty after a successful `build`.
        self.layers
            .last()
            .and_then(|layer| layer.first())
            .copied()
            .unwrap_or(Digest::ZERO)
    }

    /// The number of leaves the tree was built over.
    pub fn leaf_count(&self) -> usize {
        self.layers.first().map(Vec::len).unwrap_or(0)
    }

    /// Computes the inclusion proof for the leaf at `index`, walking
    /// bottom-up from the leaf layer to the root.
    pub fn inclusion_proof(&self, index: usize) -> Result<Vec<ProofStep>, MerkleError> {
        let leaf_count = self.leaf_count();
        if index >= leaf_count {
            return Err(MerkleError::LeafNotFound(index as u64));
        }
        let mut steps = Vec::with_capacity(self.layers.len().saturating_sub(1));
        let mut idx = index;
        for layer in &self.layers[..self.layers.len().saturating_sub(1)] {
            let is_right_child = idx % 2 == 1;
            let sibling_idx = if is_right_child { idx - 1 } else { idx + 1 };
            // Odd level: the duplicated node is this node itself.
            let sibling = layer
                .get(sibling_idx)
                .or_else(|| layer.get(idx))
                .copied()
                .unwrap_or(Digest::ZERO);
            let side = if is_right_child { Side::Left } else { Side::Right };
            steps.push(ProofStep { sibling, side });
            idx /= 2;
        }
        Ok(steps)
    }
}

/// Recomputes the root from `leaf` and `proof`, and compares it to `root`
/// (`spec.md` §4.3 "verify"). Used both by the server (re-deriving a
/// stored batch's root as a sanity check) and by any later holder of a
/// datum who wants to confirm membership independently.
pub fn verify(leaf: &Digest, proof: &[ProofStep], root: &Digest) -> bool {
    let mut current = *leaf;
    for step in proof {
        current = match step.side {
            Side::Left => node_hash(&step.sibling, &current),
            Side::Right => node_hash(&current, &step.sibling),
        };
    }
    &current == root
}

/// Convenience wrapper combining [`Tree::build`] and [`Tree::root`].
pub fn build(leaves: &[Digest]) -> Result<(Digest, Tree), MerkleError> {
    let tree = Tree::build(leaves)?;
    let root = tree.root();
    Ok((root, tree))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves_of(n: usize) -> Vec<Digest> {
        (0..n)
            .map(|i| leaf_hash(&serde_json::json!({ "v": i })).unwrap())
            .collect()
    }

    #[test]
    fn rejects_empty_input() {
        let err = Tree::build(&[]).unwrap_err();
        assert!(matches!(err, MerkleError::EmptyLeafSet));
    }

    #[test]
    fn single_leaf_root_is_itself_hashed_with_itself() {
        let leaves = leaves_of(1);
        let tree = Tree::build(&leaves).unwrap();
        assert_eq!(tree.root(), leaves[0]);
    }

    #[test]
    fn round_trip_every_index_for_various_sizes() {
        for n in [1usize, 2, 3, 4, 5, 7, 8, 13, 16] {
            let leaves = leaves_of(n);
            let tree = Tree::build(&leaves).unwrap();
            let root = tree.root();
            for i in 0..n {
                let proof = tree.inclusion_proof(i).unwrap();
                assert!(
                    verify(&leaves[i], &proof, &root),
                    "inclusion proof failed to verify for n={n}, i={i}"
                );
            }
        }
    }

    #[test]
    fn bit_flip_in_leaf_breaks_verification() {
        let leaves = leaves_of(3);
        let tree = Tree::build(&leaves).unwrap();
        let root = tree.root();
        let proof = tree.inclusion_proof(1).unwrap();
        let mut tampered = leaves[1];
        tampered.0[0] ^= 0xFF;
        assert!(!verify(&tampered, &proof, &root));
    }

    #[test]
    fn bit_flip_in_proof_breaks_verification() {
        let leaves = leaves_of(3);
        let tree = Tree::build(&leaves).unwrap();
        let root = tree.root();
        let mut proof = tree.inclusion_proof(2).unwrap();
        proof[0].sibling.0[0] ^= 0xFF;
        assert!(!verify(&leaves[2], &proof, &root));
    }

    #[test]
    fn odd_level_duplication_matches_padded_power_of_two() {
        // n=3: the tree duplicates the 3rd leaf to pair with itself at the
        // leaf layer. Building with an explicit 4th leaf equal to a copy of
        // leaf[2] must produce the same root.
        let leaves = leaves_of(3);
        let padded_root = {
            let mut padded = leaves.clone();
            padded.push(leaves[2]);
            Tree::build(&padded).unwrap().root()
        };
        let natural_root = Tree::build(&leaves).unwrap().root();
        assert_eq!(padded_root, natural_root);
    }

    #[test]
    fn leaf_hash_is_order_sensitive_to_canonical_json() {
        let a = leaf_hash(&serde_json::json!({"a": 1, "b": 2})).unwrap();
        let b = leaf_hash(&serde_json::json!({"b": 2, "a": 1})).unwrap();
        // BTreeMap-backed `Value` serialization sorts keys, so insertion
        // order must not matter.
        assert_eq!(a, b);
    }

    proptest::proptest! {
        #[test]
        fn round_trip_holds_for_arbitrary_sizes(n in 1usize..64, i in 0usize..64) {
            let i = i % n;
            let leaves = leaves_of(n);
            let tree = Tree::build(&leaves).unwrap();
            let root = tree.root();
            let proof = tree.inclusion_proof(i).unwrap();
            proptest::prop_assert!(verify(&leaves[i], &proof, &root));
        }
    }
}
