// Path: crates/attest-types/src/error.rs
//! Core error types for the attestation kernel.
//!
//! Every public error enum implements [`ErrorCode`], which assigns a stable,
//! machine-readable, uppercase snake_case identifier matching the taxonomy
//! in `spec.md` §7. Callers never see more detail than the code plus a
//! human message; internal state (store keys, stack traces) is logged, not
//! returned.

use thiserror::Error;

/// A trait for assigning a stable, machine-readable string code to an error.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// Errors from the zero-knowledge authentication protocol (C2).
#[derive(Error, Debug)]
pub enum AuthError {
    /// The device id has no registered commitment.
    #[error("unknown device")]
    UnknownDevice,
    /// The device is registered but deactivated.
    #[error("device is inactive")]
    InactiveDevice,
    /// `device_id` already has a registered commitment.
    #[error("device already registered")]
    DeviceExists,
    /// The commitment equation did not hold.
    #[error("proof failed commitment check")]
    BadProof,
    /// `|t_verify - t|` exceeded `VALIDITY_WINDOW`.
    #[error("proof timestamp outside validity window")]
    StaleProof,
    /// `(device_id, nonce, t)` was already seen within the validity window.
    #[error("proof already used")]
    Replay,
}

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownDevice => "UNKNOWN_DEVICE",
            Self::InactiveDevice => "INACTIVE_DEVICE",
            Self::DeviceExists => "DEVICE_EXISTS",
            Self::BadProof => "BAD_PROOF",
            Self::StaleProof => "STALE_PROOF",
            Self::Replay => "REPLAY",
        }
    }
}

/// Errors from the Merkle anchoring pipeline (C3, C6).
#[derive(Error, Debug)]
pub enum MerkleError {
    /// `build()` was called with zero leaves.
    #[error("cannot build a tree over zero leaves")]
    EmptyLeafSet,
    /// No pending data were available to assemble into a batch.
    #[error("no pending data to anchor")]
    NoPending,
    /// The requested batch id does not exist.
    #[error("batch {0} not found")]
    BatchNotFound(u64),
    /// The requested leaf was not found within the batch.
    #[error("leaf not found in batch {0}")]
    LeafNotFound(u64),
}

impl ErrorCode for MerkleError {
    fn code(&self) -> &'static str {
        match self {
            Self::EmptyLeafSet => "MERKLE_EMPTY_LEAF_SET",
            Self::NoPending => "NO_PENDING",
            Self::BatchNotFound(_) => "BATCH_NOT_FOUND",
            Self::LeafNotFound(_) => "LEAF_NOT_FOUND",
        }
    }
}

/// Errors from chain clients and the cross-chain dispatcher (C4, C5, C7).
#[derive(Error, Debug)]
pub enum ChainError {
    /// The named network has no registry entry.
    #[error("unknown chain {0}")]
    UnknownChain(String),
    /// Connecting to the RPC endpoint failed.
    #[error("failed to connect to {chain}: {reason}")]
    Connect { chain: String, reason: String },
    /// An RPC call failed in a way considered retriable.
    #[error("transient RPC error on {chain}: {reason}")]
    RpcTransient { chain: String, reason: String },
    /// Retries were exhausted; the transient error is reclassified as permanent.
    #[error("permanent RPC error on {chain}: {reason}")]
    RpcPermanent { chain: String, reason: String },
    /// `wait_receipt` exceeded its deadline.
    #[error("timed out waiting for receipt on {0}")]
    ReceiptTimeout(String),
    /// The transaction was included but reverted.
    #[error("transaction reverted on {0}")]
    Reverted(String),
}

impl ErrorCode for ChainError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownChain(_) => "UNKNOWN_CHAIN",
            Self::Connect { .. } => "RPC_PERMANENT",
            Self::RpcTransient { .. } => "RPC_TRANSIENT",
            Self::RpcPermanent { .. } => "RPC_PERMANENT",
            Self::ReceiptTimeout(_) => "RPC_PERMANENT",
            Self::Reverted(_) => "RPC_PERMANENT",
        }
    }
}

/// Errors from the multi-sig proposal state machine (C8).
#[derive(Error, Debug)]
pub enum MultisigError {
    /// The proposal id has no matching record.
    #[error("proposal not found")]
    NotFound,
    /// The requested transition is not valid from the proposal's current state.
    #[error("invalid transition from state {0:?}")]
    InvalidState(crate::model::ProposalState),
    /// The signer id is not an active signer.
    #[error("unknown or inactive signer")]
    UnknownSigner,
    /// The supplied signature did not verify against the signer's public key.
    #[error("signature verification failed")]
    BadSignature,
    /// `required_approvals` was zero.
    #[error("required_approvals must be at least 1")]
    InvalidThreshold,
    /// The registered handler for this proposal kind failed.
    #[error("execution handler failed: {0}")]
    ExecutionFailed(String),
}

impl ErrorCode for MultisigError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::InvalidState(_) => "CONFLICT_STATE",
            Self::UnknownSigner => "FORBIDDEN",
            Self::BadSignature => "UNAUTHENTICATED",
            Self::InvalidThreshold => "VALIDATION",
            Self::ExecutionFailed(_) => "INTERNAL",
        }
    }
}

/// Errors from the persistence adapter (C11).
#[derive(Error, Debug)]
pub enum PersistError {
    /// The requested record does not exist.
    #[error("record not found: {0}")]
    NotFound(String),
    /// The record already exists under a unique key.
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    /// A compare-and-set write lost the race; the caller may retry.
    #[error("compare-and-set conflict on {0}")]
    CasConflict(String),
    /// The underlying store returned an unrecoverable error.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl ErrorCode for PersistError {
    fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::AlreadyExists(_) => "CONFLICT_STATE",
            Self::CasConflict(_) => "PERSIST_CONFLICT",
            Self::Backend(_) => "INTERNAL",
        }
    }
}

/// Errors from the presence tracker (C9).
#[derive(Error, Debug)]
pub enum PresenceError {
    /// The device id has no presence record yet.
    #[error("no presence record for device")]
    NoRecord,
}

impl ErrorCode for PresenceError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoRecord => "NOT_FOUND",
        }
    }
}

/// Top-level error aggregating every domain's errors, used at crate
/// boundaries where a single `Result` type is convenient.
#[derive(Error, Debug)]
pub enum AttestError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Multisig(#[from] MultisigError),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error(transparent)]
    Presence(#[from] PresenceError),
    /// A request-shape validation error not specific to any one domain.
    #[error("validation failed: {0}")]
    Validation(String),
    /// An unexpected internal failure; detail is logged, not exposed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for AttestError {
    fn code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.code(),
            Self::Merkle(e) => e.code(),
            Self::Chain(e) => e.code(),
            Self::Multisig(e) => e.code(),
            Self::Persist(e) => e.code(),
            Self::Presence(e) => e.code(),
            Self::Validation(_) => "VALIDATION",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_error_codes_are_stable() {
        assert_eq!(AuthError::Replay.code(), "REPLAY");
        assert_eq!(AuthError::StaleProof.code(), "STALE_PROOF");
        assert_eq!(AuthError::BadProof.code(), "BAD_PROOF");
    }

    #[test]
    fn attest_error_forwards_code() {
        let e: AttestError = AuthError::UnknownDevice.into();
        assert_eq!(e.code(), "UNKNOWN_DEVICE");
    }
}
