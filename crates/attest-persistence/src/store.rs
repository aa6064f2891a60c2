// Path: crates/attest-persistence/src/store.rs
//! The abstract persistence contract (C11, `spec.md` §4.11).
//!
//! Every write path that affects FSM or batch transitions uses a
//! compare-and-set primitive to avoid lost updates; the store is treated
//! as a durable map with optimistic concurrency control, plus the one
//! atomic group-update `create_batch_with_leaves` needs (`spec.md` §4.6
//! step 5). Presence and the event bus own their own in-memory state
//! directly (`spec.md` §4.9/§4.10 ownership) and are not routed through
//! this trait — only the five entity families `spec.md` §4.11 names
//! (`Devices`, `PendingData`, `Batches`, `Proposals`, `Signers`) are.

use attest_types::error::PersistError;
use attest_types::ids::{BatchId, DeviceId, ProposalId};
use attest_types::model::{ChainAnchor, Device, MerkleBatch, MultiSigProposal, PendingDatum, ProposalState, Signer};

/// Identifies one pending datum for the atomic `attach_to_batch` group
/// update: the device it belongs to plus the insertion sequence number
/// the store assigned when it was appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingKey {
    pub insertion_seq: u64,
}

/// A boxed mutation applied to a [`MultiSigProposal`] under compare-and-set.
/// Boxed (rather than a generic type parameter) so [`Store`] stays
/// object-safe — callers pass ordinary closures.
pub type ProposalMutator =
    Box<dyn FnOnce(&mut MultiSigProposal) -> Result<(), PersistError> + Send>;

/// The persistence adapter contract. Implementations must guarantee that
/// `create_batch_with_leaves` is atomic across the batch and pending-data
/// collections, and that `update_proposal_cas` only applies `mutator` when
/// the stored state still matches `expected_state`.
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // --- Devices ---

    /// Inserts a new device. Fails with [`PersistError::AlreadyExists`] if
    /// `device_id` is already registered.
    async fn put_new_device(&self, device: Device) -> Result<(), PersistError>;
    async fn get_device(&self, id: &DeviceId) -> Result<Device, PersistError>;
    async fn set_device_active(&self, id: &DeviceId, active: bool) -> Result<(), PersistError>;
    async fn bump_device_counter(&self, id: &DeviceId, delta: u64) -> Result<(), PersistError>;
    async fn touch_authenticated(&self, id: &DeviceId, at: u64) -> Result<(), PersistError>;
    async fn list_devices(&self) -> Result<Vec<Device>, PersistError>;

    // --- Pending data ---

    /// Appends a pending datum. The store assigns an authoritative,
    /// monotonically increasing `insertion_seq`, overwriting whatever the
    /// caller set, and returns the stored record.
    async fn append_pending(&self, datum: PendingDatum) -> Result<PendingDatum, PersistError>;

    /// Every pending datum with `batch_id = None`, ordered by
    /// `(submitted_at, device_id, insertion_seq)` (`spec.md` §4.6 step 1).
    async fn list_pending_ordered(&self) -> Result<Vec<PendingDatum>, PersistError>;

    /// Atomically sets `batch_id` on every pending datum named by `keys`.
    async fn attach_to_batch(&self, keys: &[PendingKey], batch_id: BatchId) -> Result<(), PersistError>;

    // --- Batches ---

    /// Atomically allocates the next dense, monotonically increasing batch id.
    async fn next_batch_id(&self) -> Result<BatchId, PersistError>;

    /// Persists `batch` and attaches `keys` to it in one atomic write
    /// (`spec.md` §4.6 step 5). Implementations without cross-collection
    /// atomicity must use the `preparing`/`ready` two-phase variant
    /// described there; this in-memory store provides true atomicity via
    /// a single exclusive critical section.
    async fn create_batch_with_leaves(&self, batch: MerkleBatch, keys: &[PendingKey]) -> Result<(), PersistError>;

    async fn get_batch(&self, id: BatchId) -> Result<MerkleBatch, PersistError>;

    /// Looks a batch up by its Merkle root, for callers (the cross-chain
    /// status endpoint) that only know the root and not the batch id.
    async fn get_batch_by_root(&self, root: attest_types::ids::Digest) -> Result<MerkleBatch, PersistError>;
    async fn list_batches(&self) -> Result<Vec<MerkleBatch>, PersistError>;

    /// Updates (or inserts) the anchor record for `chain` on `batch_id`.
    async fn update_anchor(&self, batch_id: BatchId, chain: &str, anchor: ChainAnchor) -> Result<(), PersistError>;

    // --- Proposals ---

    async fn create_proposal(&self, proposal: MultiSigProposal) -> Result<(), PersistError>;
    async fn get_proposal(&self, id: ProposalId) -> Result<MultiSigProposal, PersistError>;
    async fn list_proposals(&self) -> Result<Vec<MultiSigProposal>, PersistError>;

    /// Applies `mutator` to the proposal named by `id` iff its current
    /// state equals `expected_state`; returns [`PersistError::CasConflict`]
    /// otherwise. Returns the proposal's state after the mutation.
    async fn update_proposal_cas(
        &self,
        id: ProposalId,
        expected_state: ProposalState,
        mutator: ProposalMutator,
    ) -> Result<MultiSigProposal, PersistError>;

    // --- Signers ---

    async fn add_signer(&self, signer: Signer) -> Result<(), PersistError>;
    async fn deactivate_signer(&self, signer_id: &str) -> Result<(), PersistError>;
    async fn get_signer(&self, signer_id: &str) -> Result<Signer, PersistError>;
    async fn list_active_signers(&self) -> Result<Vec<Signer>, PersistError>;
    async fn list_all_signers(&self) -> Result<Vec<Signer>, PersistError>;
}
