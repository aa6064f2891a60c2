// Path: crates/attest-anchor/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The anchor pipeline (C6, `spec.md` §4.6): turns accumulated
//! [`PendingDatum`] records into anchored [`MerkleBatch`]es.
//!
//! Batch assembly is guarded by a single exclusive lock
//! (`spec.md` §5: "at most one batch assembly is in flight globally").
//! The lock is released before this crate's caller hands the assembled
//! batch to the cross-chain dispatcher — `assemble_batch` only snapshots,
//! hashes, allocates the batch id, and persists; it never calls out to a
//! chain client.

use attest_types::error::{AttestError, MerkleError};
use attest_types::ids::{BatchId, DeviceId, Digest};
use attest_types::model::{MerkleBatch, PendingDatum};
use attest_persistence::{PendingKey, Store};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Policy governing when an on-demand trigger should assemble a batch
/// (`spec.md` §4.6: "pending count ≥ THRESHOLD_LEAVES or age(oldest
/// pending) ≥ THRESHOLD_AGE").
#[derive(Debug, Clone, Copy)]
pub struct TriggerPolicy {
    pub threshold_leaves: usize,
    pub threshold_age: Duration,
}

/// The anchor pipeline: pending-ingest plus batch assembly.
pub struct AnchorPipeline {
    store: Arc<dyn Store>,
    assembly_lock: Mutex<()>,
    policy: TriggerPolicy,
}

impl AnchorPipeline {
    pub fn new(store: Arc<dyn Store>, policy: TriggerPolicy) -> Self {
        Self {
            store,
            assembly_lock: Mutex::new(()),
            policy,
        }
    }

    /// Submits one telemetry datum for `device_id`, computing its leaf
    /// hash and appending it to the pending queue (`spec.md` §4.6,
    /// dataflow "façade → persistence pending bucket").
    pub async fn submit(
        &self,
        device_id: DeviceId,
        payload: serde_json::Value,
        submitted_at: u64,
    ) -> Result<PendingDatum, AttestError> {
        let leaf_hash = attest_merkle::leaf_hash(&payload)
            .map_err(|e| AttestError::Validation(format!("payload is not valid JSON: {e}")))?;
        let datum = PendingDatum {
            device_id,
            payload,
            submitted_at,
            insertion_seq: 0,
            leaf_hash,
            batch_id: None,
        };
        let stored = self.store.append_pending(datum).await?;
        attest_telemetry::anchor_metrics().set_pending_depth(
            self.store.list_pending_ordered().await.map(|p| p.len() as u64).unwrap_or(0),
        );
        Ok(stored)
    }

    /// Evaluates the trigger policy against the current pending snapshot.
    pub async fn should_trigger(&self, now: u64) -> Result<bool, AttestError> {
        let pending = self.store.list_pending_ordered().await?;
        if pending.is_empty() {
            return Ok(false);
        }
        if pending.len() >= self.policy.threshold_leaves {
            return Ok(true);
        }
        let oldest = pending.iter().map(|d| d.submitted_at).min().unwrap_or(now);
        Ok(now.saturating_sub(oldest) >= self.policy.threshold_age.as_secs())
    }

    /// Assembles a batch from every currently pending datum
    /// (`spec.md` §4.6 steps 1–5). Returns [`MerkleError::NoPending`] if
    /// there is nothing to anchor.
    pub async fn assemble_batch(&self, now: u64, metadata: String) -> Result<MerkleBatch, AttestError> {
        let _guard = self.assembly_lock.lock().await;

        let pending = self.store.list_pending_ordered().await?;
        if pending.is_empty() {
            return Err(MerkleError::NoPending.into());
        }

        let leaves: Vec<Digest> = pending.iter().map(|d| d.leaf_hash).collect();
        let (root, _tree) = attest_merkle::build(&leaves).map_err(AttestError::from)?;
        let batch_id = self.store.next_batch_id().await?;

        let batch = MerkleBatch {
            batch_id,
            leaf_count: leaves.len() as u32,
            root,
            created_at: now,
            metadata,
            leaves,
            anchors: Default::default(),
        };

        let keys: Vec<PendingKey> = pending
            .iter()
            .map(|d| PendingKey {
                insertion_seq: d.insertion_seq,
            })
            .collect();
        self.store.create_batch_with_leaves(batch.clone(), &keys).await?;

        attest_telemetry::anchor_metrics().observe_batch_size(batch.leaf_count);
        attest_telemetry::anchor_metrics().inc_batches_created();
        tracing::info!(batch_id, leaf_count = batch.leaf_count, "assembled anchor batch");

        Ok(batch)
    }

    /// Looks up the inclusion proof for `leaf_hash` within `batch_id`.
    pub async fn inclusion_proof(
        &self,
        batch_id: BatchId,
        leaf_hash: Digest,
    ) -> Result<Vec<attest_merkle::ProofStep>, AttestError> {
        let batch = self.store.get_batch(batch_id).await?;
        let index = batch
            .leaves
            .iter()
            .position(|l| *l == leaf_hash)
            .ok_or(MerkleError::LeafNotFound(batch_id))?;
        let tree = attest_merkle::Tree::build(&batch.leaves).map_err(AttestError::from)?;
        Ok(tree.inclusion_proof(index).map_err(AttestError::from)?)
    }

    /// Verifies `proof` for `leaf_hash` against the stored root of `batch_id`.
    pub async fn verify_inclusion(
        &self,
        batch_id: BatchId,
        leaf_hash: Digest,
        proof: &[attest_merkle::ProofStep],
    ) -> Result<bool, AttestError> {
        let batch = self.store.get_batch(batch_id).await?;
        Ok(attest_merkle::verify(&leaf_hash, proof, &batch.root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_persistence::InMemoryStore;

    fn pipeline() -> AnchorPipeline {
        AnchorPipeline::new(
            Arc::new(InMemoryStore::new()),
            TriggerPolicy {
                threshold_leaves: 3,
                threshold_age: Duration::from_secs(60),
            },
        )
    }

    #[tokio::test]
    async fn assemble_rejects_empty_pending() {
        let pipeline = pipeline();
        let err = pipeline.assemble_batch(100, "m".to_string()).await.unwrap_err();
        assert!(matches!(err, AttestError::Merkle(MerkleError::NoPending)));
    }

    #[tokio::test]
    async fn assemble_produces_dense_batch_ids() {
        let pipeline = pipeline();
        for v in [1, 2, 3] {
            pipeline
                .submit(DeviceId::new("dev-1").unwrap(), serde_json::json!({"v": v}), 100)
                .await
                .unwrap();
        }
        let batch1 = pipeline.assemble_batch(100, "m1".to_string()).await.unwrap();
        assert_eq!(batch1.batch_id, 1);
        assert_eq!(batch1.leaf_count, 3);

        pipeline
            .submit(DeviceId::new("dev-2").unwrap(), serde_json::json!({"v": 4}), 100)
            .await
            .unwrap();
        let batch2 = pipeline.assemble_batch(100, "m2".to_string()).await.unwrap();
        assert_eq!(batch2.batch_id, 2);
    }

    #[tokio::test]
    async fn inclusion_proof_round_trips() {
        let pipeline = pipeline();
        let mut leaf_hashes = vec![];
        for v in [1, 2, 3] {
            let stored = pipeline
                .submit(DeviceId::new("dev-1").unwrap(), serde_json::json!({"v": v}), 100)
                .await
                .unwrap();
            leaf_hashes.push(stored.leaf_hash);
        }
        let batch = pipeline.assemble_batch(100, "m".to_string()).await.unwrap();
        for leaf in leaf_hashes {
            let proof = pipeline.inclusion_proof(batch.batch_id, leaf).await.unwrap();
            assert!(pipeline.verify_inclusion(batch.batch_id, leaf, &proof).await.unwrap());
        }
    }

    #[tokio::test]
    async fn trigger_policy_fires_on_leaf_count() {
        let pipeline = pipeline();
        assert!(!pipeline.should_trigger(100).await.unwrap());
        for v in [1, 2, 3] {
            pipeline
                .submit(DeviceId::new("dev-1").unwrap(), serde_json::json!({"v": v}), 100)
                .await
                .unwrap();
        }
        assert!(pipeline.should_trigger(100).await.unwrap());
    }

    #[tokio::test]
    async fn trigger_policy_fires_on_age() {
        let pipeline = pipeline();
        pipeline
            .submit(DeviceId::new("dev-1").unwrap(), serde_json::json!({"v": 1}), 100)
            .await
            .unwrap();
        assert!(!pipeline.should_trigger(110).await.unwrap());
        assert!(pipeline.should_trigger(200).await.unwrap());
    }
}
