// Path: crates/attest-persistence/src/memory.rs
//! An in-memory [`Store`] implementation, used for tests and local runs
//! (`spec.md` §2 notes `attest-persistence` "doubles as both C11 and the
//! concrete in-memory store used for tests and local runs").
//!
//! Single-document CAS is provided per collection by a `std::sync::Mutex`
//! guarding a `BTreeMap`; `create_batch_with_leaves` additionally holds
//! both the pending and batch maps' locks for the duration of the write
//! so the two collections move together atomically, exactly the
//! cross-collection atomicity `spec.md` §4.6 step 5 requires.

use crate::store::{PendingKey, ProposalMutator, Store};
use attest_types::error::PersistError;
use attest_types::ids::{BatchId, DeviceId, ProposalId};
use attest_types::model::{ChainAnchor, Device, MerkleBatch, MultiSigProposal, PendingDatum, ProposalState, Signer};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[derive(Default)]
struct Inner {
    devices: Mutex<BTreeMap<DeviceId, Device>>,
    pending: Mutex<BTreeMap<u64, PendingDatum>>,
    batches: Mutex<BTreeMap<BatchId, MerkleBatch>>,
    proposals: Mutex<BTreeMap<ProposalId, MultiSigProposal>>,
    signers: Mutex<BTreeMap<String, Signer>>,
    pending_seq: AtomicU64,
    batch_seq: AtomicU64,
}

/// An in-memory, process-local implementation of [`Store`].
#[derive(Default)]
pub struct InMemoryStore {
    inner: Inner,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Store for InMemoryStore {
    async fn put_new_device(&self, device: Device) -> Result<(), PersistError> {
        let mut devices = lock(&self.inner.devices);
        if devices.contains_key(&device.device_id) {
            return Err(PersistError::AlreadyExists(device.device_id.to_string()));
        }
        devices.insert(device.device_id.clone(), device);
        Ok(())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Device, PersistError> {
        lock(&self.inner.devices)
            .get(id)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(id.to_string()))
    }

    async fn set_device_active(&self, id: &DeviceId, active: bool) -> Result<(), PersistError> {
        let mut devices = lock(&self.inner.devices);
        let device = devices
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        device.is_active = active;
        Ok(())
    }

    async fn bump_device_counter(&self, id: &DeviceId, delta: u64) -> Result<(), PersistError> {
        let mut devices = lock(&self.inner.devices);
        let device = devices
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        device.total_data_submitted = device.total_data_submitted.saturating_add(delta);
        Ok(())
    }

    async fn touch_authenticated(&self, id: &DeviceId, at: u64) -> Result<(), PersistError> {
        let mut devices = lock(&self.inner.devices);
        let device = devices
            .get_mut(id)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        device.last_authenticated_at = Some(at);
        Ok(())
    }

    async fn list_devices(&self) -> Result<Vec<Device>, PersistError> {
        Ok(lock(&self.inner.devices).values().cloned().collect())
    }

    async fn append_pending(&self, mut datum: PendingDatum) -> Result<PendingDatum, PersistError> {
        let seq = self.inner.pending_seq.fetch_add(1, Ordering::SeqCst);
        datum.insertion_seq = seq;
        let mut pending = lock(&self.inner.pending);
        pending.insert(seq, datum.clone());
        Ok(datum)
    }

    async fn list_pending_ordered(&self) -> Result<Vec<PendingDatum>, PersistError> {
        let pending = lock(&self.inner.pending);
        let mut items: Vec<PendingDatum> = pending
            .values()
            .filter(|d| d.batch_id.is_none())
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            (a.submitted_at, a.device_id.as_str(), a.insertion_seq)
                .cmp(&(b.submitted_at, b.device_id.as_str(), b.insertion_seq))
        });
        Ok(items)
    }

    async fn attach_to_batch(&self, keys: &[PendingKey], batch_id: BatchId) -> Result<(), PersistError> {
        let mut pending = lock(&self.inner.pending);
        for key in keys {
            if let Some(datum) = pending.get_mut(&key.insertion_seq) {
                datum.batch_id = Some(batch_id);
            }
        }
        Ok(())
    }

    async fn next_batch_id(&self) -> Result<BatchId, PersistError> {
        // Dense and monotonic: the counter only ever increments, and every
        // value it hands out is persisted by the immediately-following
        // `create_batch_with_leaves` call under the anchor pipeline's
        // exclusive lock (`spec.md` §5), so no value is ever skipped.
        Ok(self.inner.batch_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn create_batch_with_leaves(&self, batch: MerkleBatch, keys: &[PendingKey]) -> Result<(), PersistError> {
        if batch.leaves.is_empty() {
            return Err(PersistError::Backend(
                "refusing to persist a batch with an empty leaf set".to_string(),
            ));
        }
        let mut batches = lock(&self.inner.batches);
        let mut pending = lock(&self.inner.pending);
        let batch_id = batch.batch_id;
        batches.insert(batch_id, batch);
        for key in keys {
            if let Some(datum) = pending.get_mut(&key.insertion_seq) {
                datum.batch_id = Some(batch_id);
            }
        }
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> Result<MerkleBatch, PersistError> {
        lock(&self.inner.batches)
            .get(&id)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(id.to_string()))
    }

    async fn get_batch_by_root(&self, root: attest_types::ids::Digest) -> Result<MerkleBatch, PersistError> {
        lock(&self.inner.batches)
            .values()
            .find(|b| b.root == root)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(root.to_string()))
    }

    async fn list_batches(&self) -> Result<Vec<MerkleBatch>, PersistError> {
        Ok(lock(&self.inner.batches).values().cloned().collect())
    }

    async fn update_anchor(&self, batch_id: BatchId, chain: &str, anchor: ChainAnchor) -> Result<(), PersistError> {
        let mut batches = lock(&self.inner.batches);
        let batch = batches
            .get_mut(&batch_id)
            .ok_or_else(|| PersistError::NotFound(batch_id.to_string()))?;
        batch.anchors.insert(chain.to_string(), anchor);
        Ok(())
    }

    async fn create_proposal(&self, proposal: MultiSigProposal) -> Result<(), PersistError> {
        let mut proposals = lock(&self.inner.proposals);
        if proposals.contains_key(&proposal.proposal_id) {
            return Err(PersistError::AlreadyExists(proposal.proposal_id.to_string()));
        }
        proposals.insert(proposal.proposal_id, proposal);
        Ok(())
    }

    async fn get_proposal(&self, id: ProposalId) -> Result<MultiSigProposal, PersistError> {
        lock(&self.inner.proposals)
            .get(&id)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(id.to_string()))
    }

    async fn list_proposals(&self) -> Result<Vec<MultiSigProposal>, PersistError> {
        Ok(lock(&self.inner.proposals).values().cloned().collect())
    }

    async fn update_proposal_cas(
        &self,
        id: ProposalId,
        expected_state: ProposalState,
        mutator: ProposalMutator,
    ) -> Result<MultiSigProposal, PersistError> {
        let mut proposals = lock(&self.inner.proposals);
        let proposal = proposals
            .get_mut(&id)
            .ok_or_else(|| PersistError::NotFound(id.to_string()))?;
        if proposal.state != expected_state {
            return Err(PersistError::CasConflict(id.to_string()));
        }
        mutator(proposal)?;
        Ok(proposal.clone())
    }

    async fn add_signer(&self, signer: Signer) -> Result<(), PersistError> {
        let mut signers = lock(&self.inner.signers);
        if signers.contains_key(&signer.signer_id) {
            return Err(PersistError::AlreadyExists(signer.signer_id.clone()));
        }
        signers.insert(signer.signer_id.clone(), signer);
        Ok(())
    }

    async fn deactivate_signer(&self, signer_id: &str) -> Result<(), PersistError> {
        let mut signers = lock(&self.inner.signers);
        let signer = signers
            .get_mut(signer_id)
            .ok_or_else(|| PersistError::NotFound(signer_id.to_string()))?;
        signer.is_active = false;
        Ok(())
    }

    async fn get_signer(&self, signer_id: &str) -> Result<Signer, PersistError> {
        lock(&self.inner.signers)
            .get(signer_id)
            .cloned()
            .ok_or_else(|| PersistError::NotFound(signer_id.to_string()))
    }

    async fn list_active_signers(&self) -> Result<Vec<Signer>, PersistError> {
        Ok(lock(&self.inner.signers)
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect())
    }

    async fn list_all_signers(&self) -> Result<Vec<Signer>, PersistError> {
        Ok(lock(&self.inner.signers).values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_types::ids::Digest;

    fn device(id: &str) -> Device {
        Device {
            device_id: DeviceId::new(id).unwrap(),
            device_name: "sensor".to_string(),
            device_type: "temperature".to_string(),
            public_commitment: Digest::ZERO,
            registered_at: 1_700_000_000,
            last_authenticated_at: None,
            is_active: true,
            total_data_submitted: 0,
        }
    }

    #[tokio::test]
    async fn put_new_device_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.put_new_device(device("dev-1")).await.unwrap();
        let err = store.put_new_device(device("dev-1")).await.unwrap_err();
        assert!(matches!(err, PersistError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn pending_data_orders_by_submitted_at_then_seq() {
        let store = InMemoryStore::new();
        for (dev_id, submitted_at) in [("dev-b", 200u64), ("dev-a", 100), ("dev-c", 100)] {
            let datum = PendingDatum {
                device_id: DeviceId::new(dev_id).unwrap(),
                payload: serde_json::json!({}),
                submitted_at,
                insertion_seq: 0,
                leaf_hash: Digest::ZERO,
                batch_id: None,
            };
            store.append_pending(datum).await.unwrap();
        }
        let ordered = store.list_pending_ordered().await.unwrap();
        let ids: Vec<&str> = ordered.iter().map(|d| d.device_id.as_str()).collect();
        assert_eq!(ids, vec!["dev-a", "dev-c", "dev-b"]);
    }

    #[tokio::test]
    async fn create_batch_with_leaves_attaches_pending_atomically() {
        let store = InMemoryStore::new();
        let datum = PendingDatum {
            device_id: DeviceId::new("dev-1").unwrap(),
            payload: serde_json::json!({"v":1}),
            submitted_at: 100,
            insertion_seq: 0,
            leaf_hash: Digest::ZERO,
            batch_id: None,
        };
        let stored = store.append_pending(datum).await.unwrap();
        let batch_id = store.next_batch_id().await.unwrap();
        let batch = MerkleBatch {
            batch_id,
            leaf_count: 1,
            root: Digest::ZERO,
            created_at: 100,
            metadata: String::new(),
            leaves: vec![Digest::ZERO],
            anchors: Default::default(),
        };
        store
            .create_batch_with_leaves(batch, &[PendingKey { insertion_seq: stored.insertion_seq }])
            .await
            .unwrap();

        let pending = store.list_pending_ordered().await.unwrap();
        assert!(pending.is_empty());
        let fetched = store.get_batch(batch_id).await.unwrap();
        assert_eq!(fetched.leaf_count, 1);
    }

    #[tokio::test]
    async fn proposal_cas_rejects_stale_expected_state() {
        let store = InMemoryStore::new();
        let proposal_id = attest_types::ids::ProposalId::random();
        let proposal = MultiSigProposal {
            proposal_id,
            kind: attest_types::model::ProposalKind::RegisterDevice {
                device_id: DeviceId::new("dev-1").unwrap(),
                device_name: "s".to_string(),
                device_type: "t".to_string(),
                secret_ciphertext: vec![],
            },
            required_approvals: 2,
            approvals: Default::default(),
            rejections: Default::default(),
            state: ProposalState::Pending,
            created_at: 0,
            expires_at: 0,
            proposer: "alice".to_string(),
            executed_artifact: None,
        };
        store.create_proposal(proposal).await.unwrap();

        let result = store
            .update_proposal_cas(
                proposal_id,
                ProposalState::Approved,
                Box::new(|_p| Ok(())),
            )
            .await;
        assert!(matches!(result, Err(PersistError::CasConflict(_))));

        let ok = store
            .update_proposal_cas(
                proposal_id,
                ProposalState::Pending,
                Box::new(|p| {
                    p.state = ProposalState::Approved;
                    Ok(())
                }),
            )
            .await
            .unwrap();
        assert_eq!(ok.state, ProposalState::Approved);
    }
}
