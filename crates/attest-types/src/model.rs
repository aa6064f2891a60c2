// Path: crates/attest-types/src/model.rs
//! Plain entity structs for the data model described in `spec.md` §3.
//!
//! These types carry no behavior beyond basic constructors; the crates
//! that own transitions on them (`attest-anchor` for `MerkleBatch`,
//! `attest-multisig` for `MultiSigProposal`, `attest-presence` for
//! `PresenceRecord`) enforce the invariants described in the data model.

use crate::ids::{BatchId, DeviceId, Digest, ProposalId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An enrolled IoT device (`spec.md` §3 "Device").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub device_id: DeviceId,
    pub device_name: String,
    pub device_type: String,
    pub public_commitment: Digest,
    pub registered_at: u64,
    pub last_authenticated_at: Option<u64>,
    pub is_active: bool,
    pub total_data_submitted: u64,
}

/// A telemetry datum awaiting inclusion in a Merkle batch
/// (`spec.md` §3 "PendingDatum").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingDatum {
    pub device_id: DeviceId,
    pub payload: serde_json::Value,
    pub submitted_at: u64,
    /// Assigned at write time to break ties within the same `submitted_at`.
    pub insertion_seq: u64,
    pub leaf_hash: Digest,
    pub batch_id: Option<BatchId>,
}

/// The on-chain dispatch status of one anchor on one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Per-chain anchor record stored inside a [`MerkleBatch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainAnchor {
    pub tx_hash: Option<Digest>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub status: AnchorStatus,
    pub error: Option<String>,
}

impl ChainAnchor {
    /// Constructs a freshly dispatched, still-pending anchor record.
    pub fn pending(tx_hash: Digest) -> Self {
        Self {
            tx_hash: Some(tx_hash),
            block_number: None,
            gas_used: None,
            status: AnchorStatus::Pending,
            error: None,
        }
    }

    /// Constructs a failed anchor record (dispatch never produced a tx hash).
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            tx_hash: None,
            block_number: None,
            gas_used: None,
            status: AnchorStatus::Failed,
            error: Some(error.into()),
        }
    }
}

/// A committed batch of telemetry leaves and its per-chain anchor outcomes
/// (`spec.md` §3 "MerkleBatch").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MerkleBatch {
    pub batch_id: BatchId,
    pub leaf_count: u32,
    pub root: Digest,
    pub created_at: u64,
    pub metadata: String,
    /// Leaf hashes in the exact order they were combined into the tree,
    /// needed to recompute inclusion proofs later.
    pub leaves: Vec<Digest>,
    pub anchors: BTreeMap<String, ChainAnchor>,
}

/// The variant of zero-knowledge scheme a [`Proof`] was generated under
/// (`spec.md` §4.2 and §9's "tagged sum, not ad-hoc object" redesign note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProofScheme {
    Simple,
    Snark,
    Stark,
}

/// An authentication proof (`spec.md` §3 "Proof", §4.2).
///
/// `secret_hash` carries `H(secret)` — the one piece of secret-derived
/// material the SIMPLE scheme's verifier equation needs in order to
/// recompute the commitment (`spec.md` §4.2 step 3: "the authentication
/// submission is accompanied by the same `H(secret)` value"). The raw
/// `secret` itself never appears in a `Proof`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proof {
    pub scheme: ProofScheme,
    pub device_id: DeviceId,
    pub nonce: [u8; 16],
    pub timestamp: u64,
    pub secret_hash: Digest,
    pub response: Digest,
}

/// The kind of action a multi-sig proposal authorizes (`spec.md` §3).
/// Only `RegisterDevice` is defined today; the enum is open to extension by
/// design (`spec.md` §3 "design allows extension").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalKind {
    RegisterDevice {
        device_id: DeviceId,
        device_name: String,
        device_type: String,
        /// Ciphertext of the device secret; decrypted only inside the
        /// registration handler at execution time.
        secret_ciphertext: Vec<u8>,
    },
}

impl ProposalKind {
    /// The stable name used to look up a registered execution handler
    /// (`spec.md` §4.8 "dispatches to the handler registered for kind").
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::RegisterDevice { .. } => "REGISTER_DEVICE",
        }
    }
}

/// Lifecycle state of a [`MultiSigProposal`] (`spec.md` §3, §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalState {
    Pending,
    Approved,
    Rejected,
    Executed,
    Expired,
}

/// A threshold-approval request (`spec.md` §3 "MultiSigProposal").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiSigProposal {
    pub proposal_id: ProposalId,
    pub kind: ProposalKind,
    pub required_approvals: u32,
    pub approvals: BTreeSet<String>,
    pub rejections: BTreeSet<String>,
    pub state: ProposalState,
    pub created_at: u64,
    pub expires_at: u64,
    pub proposer: String,
    /// Set once `execute()` succeeds: a reference to the produced artifact
    /// (e.g. the new device id).
    pub executed_artifact: Option<String>,
}

/// A multi-sig signer (`spec.md` §3 "Signer").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signer {
    pub signer_id: String,
    pub public_key: Vec<u8>,
    pub added_at: u64,
    pub is_active: bool,
}

/// Liveness classification of a device (`spec.md` §3 "PresenceRecord").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PresenceStatus {
    Online,
    Idle,
    Offline,
}

/// A device's liveness state, derived purely from `last_heartbeat_at` and
/// the sweep clock (`spec.md` §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub device_id: DeviceId,
    pub last_heartbeat_at: u64,
    pub status: PresenceStatus,
}

/// An event published on the event bus (`spec.md` §3 "Event", §4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_id: u64,
    pub kind: String,
    pub payload: serde_json::Value,
    pub at: u64,
}
