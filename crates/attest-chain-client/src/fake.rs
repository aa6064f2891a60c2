// Path: crates/attest-chain-client/src/fake.rs
//! A hand-written test double for [`ChainClient`] (teacher style: small
//! trait objects swapped for test doubles, not a mocking macro —
//! `spec.md`'s expanded test-tooling section).

use crate::{AnchorOp, ChainClient, GasEstimate, Receipt};
use attest_types::error::ChainError;
use attest_types::ids::Digest;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// What a [`FakeChainClient::send`] call should do.
#[derive(Debug, Clone)]
pub enum SendBehavior {
    /// Succeed, returning a deterministic tx hash derived from a counter.
    Succeed,
    /// Fail permanently with the given reason.
    FailPermanent(String),
}

/// A configurable fake chain client for unit and integration tests.
pub struct FakeChainClient {
    chain_name: String,
    send_behavior: Mutex<SendBehavior>,
    receipt_behavior: Mutex<Option<Receipt>>,
    counter: AtomicU64,
    sent: Mutex<Vec<AnchorOp>>,
}

impl FakeChainClient {
    pub fn new(chain_name: impl Into<String>) -> Self {
        Self {
            chain_name: chain_name.into(),
            send_behavior: Mutex::new(SendBehavior::Succeed),
            receipt_behavior: Mutex::new(Some(Receipt {
                block_number: 1,
                gas_used: 21_000,
                status: true,
            })),
            counter: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn with_send_behavior(self, behavior: SendBehavior) -> Self {
        *self.send_behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
        self
    }

    pub fn with_receipt_behavior(self, receipt: Option<Receipt>) -> Self {
        *self.receipt_behavior.lock().unwrap_or_else(|e| e.into_inner()) = receipt;
        self
    }

    /// Every [`AnchorOp`] this client was asked to `send`, in order.
    pub fn sent_ops(&self) -> Vec<AnchorOp> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait::async_trait]
impl ChainClient for FakeChainClient {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    async fn connect(&self) -> Result<(), ChainError> {
        Ok(())
    }

    async fn estimate_gas(&self, _op: &AnchorOp) -> Result<GasEstimate, ChainError> {
        Ok(GasEstimate {
            gas_units: 21_000,
            gas_price_wei: 1_000_000_000,
        })
    }

    async fn send(&self, op: &AnchorOp) -> Result<Digest, ChainError> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push(op.clone());
        let behavior = self.send_behavior.lock().unwrap_or_else(|e| e.into_inner()).clone();
        match behavior {
            SendBehavior::Succeed => {
                let n = self.counter.fetch_add(1, Ordering::SeqCst);
                let mut bytes = [0u8; 32];
                bytes[24..].copy_from_slice(&n.to_be_bytes());
                Ok(Digest::from_bytes(bytes))
            }
            SendBehavior::FailPermanent(reason) => Err(ChainError::RpcPermanent {
                chain: self.chain_name.clone(),
                reason,
            }),
        }
    }

    async fn wait_receipt(&self, _tx_hash: Digest, _deadline: Duration) -> Result<Receipt, ChainError> {
        self.receipt_behavior
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| ChainError::ReceiptTimeout(self.chain_name.clone()))
    }

    async fn balance(&self, _address: &str) -> Result<u128, ChainError> {
        Ok(1_000_000_000_000_000_000)
    }

    fn decode_event(&self, topic: &str, data: &[u8]) -> Result<serde_json::Value, ChainError> {
        Ok(serde_json::json!({ "topic": topic, "data_hex": hex::encode(data) }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_every_sent_op() {
        let client = FakeChainClient::new("sepolia");
        let op = AnchorOp {
            root: Digest::ZERO,
            leaf_count: 3,
            metadata: "batch-1".to_string(),
        };
        client.send(&op).await.unwrap();
        assert_eq!(client.sent_ops().len(), 1);
    }

    #[tokio::test]
    async fn fail_permanent_behavior_surfaces_as_rpc_permanent() {
        let client = FakeChainClient::new("bscTestnet").with_send_behavior(SendBehavior::FailPermanent(
            "revert".to_string(),
        ));
        let op = AnchorOp {
            root: Digest::ZERO,
            leaf_count: 1,
            metadata: String::new(),
        };
        let err = client.send(&op).await.unwrap_err();
        assert!(matches!(err, ChainError::RpcPermanent { .. }));
    }
}
