// Path: crates/attest-chain-client/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! One chain client instance per configured network (C4, `spec.md` §4.4).
//!
//! A client serializes nonce allocation per signing key (a single sender
//! per network at a time) and applies [`retry::RetryPolicy`] to transient
//! RPC failures. The concrete backend is `alloy`; [`ChainClient`] is the
//! seam the anchor/cross-chain layers program against so tests can swap
//! in [`fake::FakeChainClient`] instead of a live RPC endpoint.

pub mod alloy_client;
pub mod fake;
pub mod retry;

pub use alloy_client::{AlloyChainClient, AlloyClientConfig};

use attest_types::error::ChainError;
use attest_types::ids::Digest;
use std::time::Duration;

/// The parameters of one anchor transaction: `anchor(root, leaf_count, metadata)`
/// (`spec.md` §6 "On-chain"). The exact contract ABI is a deployment input,
/// not part of this crate's contract.
#[derive(Debug, Clone)]
pub struct AnchorOp {
    pub root: Digest,
    pub leaf_count: u64,
    pub metadata: String,
}

/// The outcome of waiting for a transaction receipt.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub block_number: u64,
    pub gas_used: u64,
    pub status: bool,
}

/// A gas estimate: units and the price, in wei, the client intends to pay.
#[derive(Debug, Clone, Copy)]
pub struct GasEstimate {
    pub gas_units: u64,
    pub gas_price_wei: u128,
}

/// The public contract every chain client implements (`spec.md` §4.4).
///
/// Every method is an explicitly awaited, timed operation (`spec.md` §9
/// redesign flag: "treat every chain call as an explicitly awaited, timed
/// operation; do not block on RPC inside locks"). None of these may be
/// called while holding the anchor pipeline's assembly lock.
#[async_trait::async_trait]
pub trait ChainClient: Send + Sync {
    /// The configured network name this client talks to.
    fn chain_name(&self) -> &str;

    /// Establishes (or verifies) connectivity to the RPC endpoint.
    async fn connect(&self) -> Result<(), ChainError>;

    /// Estimates gas for `op` without submitting anything.
    async fn estimate_gas(&self, op: &AnchorOp) -> Result<GasEstimate, ChainError>;

    /// Builds, signs, and broadcasts the anchor transaction for `op`,
    /// returning its hash without waiting for inclusion.
    async fn send(&self, op: &AnchorOp) -> Result<Digest, ChainError>;

    /// Polls for a transaction receipt until it appears or `deadline` elapses.
    async fn wait_receipt(&self, tx_hash: Digest, deadline: Duration) -> Result<Receipt, ChainError>;

    /// Reads the native-token balance of `address`, in wei.
    async fn balance(&self, address: &str) -> Result<u128, ChainError>;

    /// Decodes a raw event log into a structured JSON value.
    fn decode_event(&self, topic: &str, data: &[u8]) -> Result<serde_json::Value, ChainError>;
}
