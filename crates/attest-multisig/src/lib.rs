// Path: crates/attest-multisig/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The multi-sig proposal state machine (C8, `spec.md` §4.8):
//! `PENDING -> {APPROVED, REJECTED, EXPIRED}`, `APPROVED -> {EXECUTED, EXPIRED}`.
//!
//! Signatures on `approve`/`reject` are opaque to this FSM — they are
//! checked by an injected [`SignaturePredicate`], and proposal kinds are
//! executed by an injected [`ProposalExecutor`] looked up by
//! [`attest_types::model::ProposalKind::kind_name`]. The FSM itself knows
//! neither a signature scheme nor what executing a proposal does.

pub mod ed25519;

use attest_events::EventBus;
use attest_hash::Encoder;
use attest_persistence::{ProposalMutator, Store};
use attest_types::error::{AttestError, MultisigError, PersistError};
use attest_types::ids::ProposalId;
use attest_types::model::{MultiSigProposal, ProposalKind, ProposalState};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

pub use ed25519::Ed25519SignaturePredicate;

/// Default proposal lifetime (`spec.md` §3: `expires_at = created_at + 7d`).
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const MAX_CAS_ATTEMPTS: u32 = 5;

/// Verifies an opaque signature against a signer's opaque public key. The
/// FSM never interprets either byte string itself.
pub trait SignaturePredicate: Send + Sync {
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> bool;
}

/// Executes the action a proposal authorizes once it reaches APPROVED
/// (`spec.md` §4.8 "dispatches to the handler registered for kind").
/// Returns a reference to the produced artifact (e.g. a device id).
#[async_trait::async_trait]
pub trait ProposalExecutor: Send + Sync {
    async fn execute(&self, kind: &ProposalKind) -> Result<String, MultisigError>;
}

/// The canonical message a signer signs over for `approve`/`reject`
/// (`spec.md` §4.8 "Signatures ... are opaque to this FSM" — this is the
/// one piece of structure the FSM does fix: what bytes get signed).
pub fn approval_message(proposal_id: ProposalId, signer_id: &str, action: &str) -> [u8; 32] {
    Encoder::new()
        .tag("MULTISIG")
        .str(&proposal_id.to_string())
        .str(signer_id)
        .str(action)
        .hash()
}

/// The multi-sig FSM engine.
pub struct MultisigEngine {
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    predicate: Arc<dyn SignaturePredicate>,
    executors: DashMap<String, Arc<dyn ProposalExecutor>>,
    expiry: Duration,
}

impl MultisigEngine {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>, predicate: Arc<dyn SignaturePredicate>) -> Self {
        Self {
            store,
            events,
            predicate,
            executors: DashMap::new(),
            expiry: DEFAULT_EXPIRY,
        }
    }

    /// Registers the handler invoked when a proposal of `kind_name` reaches
    /// APPROVED and `execute` is called.
    pub fn register_executor(&self, kind_name: &str, executor: Arc<dyn ProposalExecutor>) {
        self.executors.insert(kind_name.to_string(), executor);
    }

    pub async fn propose(
        &self,
        kind: ProposalKind,
        required_approvals: u32,
        proposer: String,
        now: u64,
    ) -> Result<MultiSigProposal, AttestError> {
        if required_approvals == 0 {
            return Err(MultisigError::InvalidThreshold.into());
        }
        let proposal = MultiSigProposal {
            proposal_id: ProposalId::random(),
            kind,
            required_approvals,
            approvals: Default::default(),
            rejections: Default::default(),
            state: ProposalState::Pending,
            created_at: now,
            expires_at: now + self.expiry.as_secs(),
            proposer,
            executed_artifact: None,
        };
        self.store.create_proposal(proposal.clone()).await?;
        attest_telemetry::multisig_metrics().inc_transition("PENDING");
        self.events.publish(
            "PROPOSAL_CREATED",
            serde_json::json!({"proposal_id": proposal.proposal_id.to_string()}),
            now,
        );
        Ok(proposal)
    }

    pub async fn approve(
        &self,
        proposal_id: ProposalId,
        signer_id: &str,
        signature: &[u8],
        now: u64,
    ) -> Result<MultiSigProposal, AttestError> {
        let signer = self.store.get_signer(signer_id).await?;
        if !signer.is_active {
            return Err(MultisigError::UnknownSigner.into());
        }
        let message = approval_message(proposal_id, signer_id, "APPROVE");
        if !self.predicate.verify(&signer.public_key, &message, signature) {
            return Err(MultisigError::BadSignature.into());
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get_proposal(proposal_id).await?;
            if current.state != ProposalState::Pending {
                return Err(MultisigError::InvalidState(current.state).into());
            }
            let required = current.required_approvals;
            let signer_id_owned = signer_id.to_string();
            let mutator: ProposalMutator = Box::new(move |p| {
                p.rejections.remove(&signer_id_owned);
                p.approvals.insert(signer_id_owned);
                if p.approvals.len() as u32 >= required {
                    p.state = ProposalState::Approved;
                }
                Ok(())
            });
            match self
                .store
                .update_proposal_cas(proposal_id, ProposalState::Pending, mutator)
                .await
            {
                Ok(updated) => {
                    attest_telemetry::multisig_metrics().inc_transition(state_label(updated.state));
                    if updated.state == ProposalState::Approved {
                        self.events.publish(
                            "PROPOSAL_APPROVED",
                            serde_json::json!({"proposal_id": proposal_id.to_string()}),
                            now,
                        );
                    }
                    return Ok(updated);
                }
                Err(PersistError::CasConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AttestError::Internal("approve: exhausted CAS retries".to_string()))
    }

    pub async fn reject(
        &self,
        proposal_id: ProposalId,
        signer_id: &str,
        signature: &[u8],
        now: u64,
    ) -> Result<MultiSigProposal, AttestError> {
        let signer = self.store.get_signer(signer_id).await?;
        if !signer.is_active {
            return Err(MultisigError::UnknownSigner.into());
        }
        let message = approval_message(proposal_id, signer_id, "REJECT");
        if !self.predicate.verify(&signer.public_key, &message, signature) {
            return Err(MultisigError::BadSignature.into());
        }

        for _ in 0..MAX_CAS_ATTEMPTS {
            let current = self.store.get_proposal(proposal_id).await?;
            if current.state != ProposalState::Pending {
                return Err(MultisigError::InvalidState(current.state).into());
            }
            let total_active = self.store.list_active_signers().await?.len() as u32;
            let required = current.required_approvals;
            // Approval is no longer reachable once rejections exceed the
            // number of signers who could still approve.
            let reject_threshold = total_active.saturating_sub(required) + 1;
            let signer_id_owned = signer_id.to_string();
            let mutator: ProposalMutator = Box::new(move |p| {
                p.approvals.remove(&signer_id_owned);
                p.rejections.insert(signer_id_owned);
                if p.rejections.len() as u32 >= reject_threshold {
                    p.state = ProposalState::Rejected;
                }
                Ok(())
            });
            match self
                .store
                .update_proposal_cas(proposal_id, ProposalState::Pending, mutator)
                .await
            {
                Ok(updated) => {
                    attest_telemetry::multisig_metrics().inc_transition(state_label(updated.state));
                    if updated.state == ProposalState::Rejected {
                        self.events.publish(
                            "PROPOSAL_REJECTED",
                            serde_json::json!({"proposal_id": proposal_id.to_string()}),
                            now,
                        );
                    }
                    return Ok(updated);
                }
                Err(PersistError::CasConflict(_)) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(AttestError::Internal("reject: exhausted CAS retries".to_string()))
    }

    /// Executes an APPROVED proposal. On handler failure the proposal
    /// remains APPROVED so `execute` can be retried (`spec.md` §4.8).
    pub async fn execute(&self, proposal_id: ProposalId, now: u64) -> Result<MultiSigProposal, AttestError> {
        let current = self.store.get_proposal(proposal_id).await?;
        if current.state != ProposalState::Approved {
            return Err(MultisigError::InvalidState(current.state).into());
        }
        let kind_name = current.kind.kind_name();
        let executor = self
            .executors
            .get(kind_name)
            .map(|e| e.clone())
            .ok_or_else(|| MultisigError::ExecutionFailed(format!("no executor registered for {kind_name}")))?;

        let artifact = executor.execute(&current.kind).await?;

        let artifact_owned = artifact.clone();
        let mutator: ProposalMutator = Box::new(move |p| {
            p.state = ProposalState::Executed;
            p.executed_artifact = Some(artifact_owned);
            Ok(())
        });
        let updated = self
            .store
            .update_proposal_cas(proposal_id, ProposalState::Approved, mutator)
            .await?;
        attest_telemetry::multisig_metrics().inc_transition("EXECUTED");
        self.events.publish(
            "PROPOSAL_EXECUTED",
            serde_json::json!({"proposal_id": proposal_id.to_string(), "artifact": artifact}),
            now,
        );
        Ok(updated)
    }

    /// Moves every non-terminal proposal past `expires_at` to EXPIRED.
    /// Intended to run on a fixed cadence from a background task.
    pub async fn sweep_expired(&self, now: u64) -> Result<usize, AttestError> {
        let proposals = self.store.list_proposals().await?;
        let mut expired_count = 0;
        for proposal in proposals {
            if !matches!(proposal.state, ProposalState::Pending | ProposalState::Approved) {
                continue;
            }
            if proposal.expires_at > now {
                continue;
            }
            let expected_state = proposal.state;
            let mutator: ProposalMutator = Box::new(|p| {
                p.state = ProposalState::Expired;
                Ok(())
            });
            if self
                .store
                .update_proposal_cas(proposal.proposal_id, expected_state, mutator)
                .await
                .is_ok()
            {
                expired_count += 1;
                attest_telemetry::multisig_metrics().inc_transition("EXPIRED");
                self.events.publish(
                    "PROPOSAL_EXPIRED",
                    serde_json::json!({"proposal_id": proposal.proposal_id.to_string()}),
                    now,
                );
            }
        }
        Ok(expired_count)
    }
}

fn state_label(state: ProposalState) -> &'static str {
    match state {
        ProposalState::Pending => "PENDING",
        ProposalState::Approved => "APPROVED",
        ProposalState::Rejected => "REJECTED",
        ProposalState::Executed => "EXECUTED",
        ProposalState::Expired => "EXPIRED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_persistence::InMemoryStore;
    use attest_types::ids::DeviceId;
    use attest_types::model::Signer;

    struct AllowAllPredicate;
    impl SignaturePredicate for AllowAllPredicate {
        fn verify(&self, _public_key: &[u8], _message: &[u8], _signature: &[u8]) -> bool {
            true
        }
    }

    struct RecordingExecutor;
    #[async_trait::async_trait]
    impl ProposalExecutor for RecordingExecutor {
        async fn execute(&self, kind: &ProposalKind) -> Result<String, MultisigError> {
            match kind {
                ProposalKind::RegisterDevice { device_id, .. } => Ok(device_id.as_str().to_string()),
            }
        }
    }

    async fn engine_with_signers(count: usize) -> (MultisigEngine, Vec<String>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let events = Arc::new(EventBus::new(16, 8));
        let engine = MultisigEngine::new(store.clone(), events, Arc::new(AllowAllPredicate));
        let mut signer_ids = vec![];
        for i in 0..count {
            let signer_id = format!("signer-{i}");
            store
                .add_signer(Signer {
                    signer_id: signer_id.clone(),
                    public_key: vec![0u8; 32],
                    added_at: 0,
                    is_active: true,
                })
                .await
                .unwrap();
            signer_ids.push(signer_id);
        }
        (engine, signer_ids)
    }

    fn register_device_kind() -> ProposalKind {
        ProposalKind::RegisterDevice {
            device_id: DeviceId::new("dev-1").unwrap(),
            device_name: "sensor".to_string(),
            device_type: "thermometer".to_string(),
            secret_ciphertext: vec![1, 2, 3],
        }
    }

    #[tokio::test]
    async fn propose_requires_nonzero_threshold() {
        let (engine, _) = engine_with_signers(0).await;
        let err = engine
            .propose(register_device_kind(), 0, "alice".to_string(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, AttestError::Multisig(MultisigError::InvalidThreshold)));
    }

    #[tokio::test]
    async fn approvals_accumulate_and_cross_threshold() {
        let (engine, signers) = engine_with_signers(3).await;
        let proposal = engine
            .propose(register_device_kind(), 2, "alice".to_string(), 100)
            .await
            .unwrap();

        let after_first = engine.approve(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        assert_eq!(after_first.state, ProposalState::Pending);

        let after_second = engine.approve(proposal.proposal_id, &signers[1], b"sig", 100).await.unwrap();
        assert_eq!(after_second.state, ProposalState::Approved);
    }

    #[tokio::test]
    async fn approve_is_idempotent_per_signer() {
        let (engine, signers) = engine_with_signers(3).await;
        let proposal = engine
            .propose(register_device_kind(), 2, "alice".to_string(), 100)
            .await
            .unwrap();
        engine.approve(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        let again = engine.approve(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        assert_eq!(again.approvals.len(), 1);
    }

    #[tokio::test]
    async fn rejection_fires_when_approval_becomes_unreachable() {
        let (engine, signers) = engine_with_signers(3).await;
        // required_approvals=3 out of 3 signers; one rejection makes it unreachable.
        let proposal = engine
            .propose(register_device_kind(), 3, "alice".to_string(), 100)
            .await
            .unwrap();
        let after = engine.reject(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        assert_eq!(after.state, ProposalState::Rejected);
    }

    #[tokio::test]
    async fn approve_then_reject_by_same_signer_keeps_sets_disjoint() {
        let (engine, signers) = engine_with_signers(3).await;
        let proposal = engine
            .propose(register_device_kind(), 3, "alice".to_string(), 100)
            .await
            .unwrap();
        engine.approve(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        let after = engine.reject(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        assert_eq!(after.state, ProposalState::Rejected);
        assert!(after.approvals.is_disjoint(&after.rejections));
        assert!(!after.approvals.contains(&signers[0]));
        assert!(after.rejections.contains(&signers[0]));
    }

    #[tokio::test]
    async fn execute_requires_approved_state() {
        let (engine, signers) = engine_with_signers(1).await;
        let proposal = engine
            .propose(register_device_kind(), 1, "alice".to_string(), 100)
            .await
            .unwrap();
        let err = engine.execute(proposal.proposal_id, 100).await.unwrap_err();
        assert!(matches!(err, AttestError::Multisig(MultisigError::InvalidState(ProposalState::Pending))));

        engine.approve(proposal.proposal_id, &signers[0], b"sig", 100).await.unwrap();
        engine.register_executor("REGISTER_DEVICE", Arc::new(RecordingExecutor));
        let executed = engine.execute(proposal.proposal_id, 100).await.unwrap();
        assert_eq!(executed.state, ProposalState::Executed);
        assert_eq!(executed.executed_artifact.as_deref(), Some("dev-1"));
    }

    #[tokio::test]
    async fn sweep_expires_stale_pending_proposals() {
        let (engine, _signers) = engine_with_signers(2).await;
        let proposal = engine
            .propose(register_device_kind(), 2, "alice".to_string(), 100)
            .await
            .unwrap();
        let count = engine.sweep_expired(proposal.expires_at + 1).await.unwrap();
        assert_eq!(count, 1);
    }
}
