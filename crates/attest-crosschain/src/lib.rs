// Path: crates/attest-crosschain/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The cross-chain dispatcher (C7, `spec.md` §4.7): fans an anchor root out
//! to N configured chain clients in parallel, tracks each chain's outcome
//! independently, and spawns receipt watchers bounded by `CONFIRM_TIMEOUT`.
//!
//! Anchoring is independent per chain (`spec.md` §4.7): a majority-success
//! batch is never retried on failed chains automatically.

use attest_chain_client::{AnchorOp, ChainClient};
use attest_events::EventBus;
use attest_persistence::Store;
use attest_types::error::AttestError;
use attest_types::ids::{BatchId, Digest};
use attest_types::model::{AnchorStatus, ChainAnchor};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for a spawned receipt watcher (`spec.md` §4.7).
pub const DEFAULT_CONFIRM_TIMEOUT: Duration = Duration::from_secs(180);

/// The outcome of dispatching one chain's `send` call.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub chain: String,
    pub tx_hash: Option<Digest>,
    pub status: AnchorStatus,
    pub error: Option<String>,
}

/// Per-chain anchor status for a batch, plus the availability derived from
/// it (`spec.md` §4.7: "available if at least one chain is confirmed").
#[derive(Debug, Clone, Serialize)]
pub struct CrossChainStatus {
    pub batch_id: BatchId,
    pub anchors: BTreeMap<String, ChainAnchor>,
    pub available: bool,
}

/// The cross-chain dispatcher.
pub struct CrossChainDispatcher {
    clients: DashMap<String, Arc<dyn ChainClient>>,
    store: Arc<dyn Store>,
    events: Arc<EventBus>,
    confirm_timeout: Duration,
}

impl CrossChainDispatcher {
    pub fn new(store: Arc<dyn Store>, events: Arc<EventBus>, confirm_timeout: Duration) -> Self {
        Self {
            clients: DashMap::new(),
            store,
            events,
            confirm_timeout,
        }
    }

    /// Registers (or replaces) the client used to reach `chain_name`.
    pub fn register_client(&self, chain_name: impl Into<String>, client: Arc<dyn ChainClient>) {
        self.clients.insert(chain_name.into(), client);
    }

    /// Dispatches `(root, leaf_count, metadata)` to every chain in `chains`
    /// in parallel (`spec.md` §4.7 steps 1-3). Receipt watchers for
    /// successful sends are spawned as background tasks on `self` and keep
    /// updating the stored anchor record after this call returns.
    pub async fn dispatch(
        self: &Arc<Self>,
        batch_id: BatchId,
        root: Digest,
        leaf_count: u64,
        metadata: String,
        chains: &[String],
        now: u64,
    ) -> Vec<DispatchOutcome> {
        let op = AnchorOp {
            root,
            leaf_count,
            metadata,
        };
        let futures = chains.iter().map(|chain| {
            let chain = chain.clone();
            let op = op.clone();
            let this = Arc::clone(self);
            async move { this.dispatch_one(batch_id, chain, op, now).await }
        });
        futures::future::join_all(futures).await
    }

    async fn dispatch_one(self: &Arc<Self>, batch_id: BatchId, chain: String, op: AnchorOp, now: u64) -> DispatchOutcome {
        let Some(client) = self.clients.get(&chain).map(|entry| entry.clone()) else {
            let err = format!("unknown chain {chain}");
            let _ = self.store.update_anchor(batch_id, &chain, ChainAnchor::failed(err.clone())).await;
            self.publish_progress(batch_id, &chain, "failed", now);
            return DispatchOutcome {
                chain,
                tx_hash: None,
                status: AnchorStatus::Failed,
                error: Some(err),
            };
        };

        match client.send(&op).await {
            Ok(tx_hash) => {
                let _ = self
                    .store
                    .update_anchor(batch_id, &chain, ChainAnchor::pending(tx_hash))
                    .await;
                self.publish_progress(batch_id, &chain, "pending", now);
                attest_telemetry::chain_metrics().inc_anchor_dispatch(&chain, "pending");

                let dispatcher = Arc::clone(self);
                let chain_for_task = chain.clone();
                tokio::spawn(async move {
                    dispatcher.watch_receipt(batch_id, chain_for_task, tx_hash, now).await;
                });

                DispatchOutcome {
                    chain,
                    tx_hash: Some(tx_hash),
                    status: AnchorStatus::Pending,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                let _ = self
                    .store
                    .update_anchor(batch_id, &chain, ChainAnchor::failed(message.clone()))
                    .await;
                self.publish_progress(batch_id, &chain, "failed", now);
                attest_telemetry::chain_metrics().inc_anchor_dispatch(&chain, "failed");
                DispatchOutcome {
                    chain,
                    tx_hash: None,
                    status: AnchorStatus::Failed,
                    error: Some(message),
                }
            }
        }
    }

    async fn watch_receipt(&self, batch_id: BatchId, chain: String, tx_hash: Digest, now: u64) {
        let Some(client) = self.clients.get(&chain).map(|entry| entry.clone()) else {
            return;
        };
        let anchor = match client.wait_receipt(tx_hash, self.confirm_timeout).await {
            Ok(receipt) if receipt.status => ChainAnchor {
                tx_hash: Some(tx_hash),
                block_number: Some(receipt.block_number),
                gas_used: Some(receipt.gas_used),
                status: AnchorStatus::Confirmed,
                error: None,
            },
            Ok(_) => ChainAnchor {
                tx_hash: Some(tx_hash),
                block_number: None,
                gas_used: None,
                status: AnchorStatus::Failed,
                error: Some("transaction reverted".to_string()),
            },
            Err(e) => ChainAnchor {
                tx_hash: Some(tx_hash),
                block_number: None,
                gas_used: None,
                status: AnchorStatus::Failed,
                error: Some(e.to_string()),
            },
        };
        let status_label = match anchor.status {
            AnchorStatus::Confirmed => "confirmed",
            AnchorStatus::Failed => "failed",
            AnchorStatus::Pending => "pending",
        };
        let _ = self.store.update_anchor(batch_id, &chain, anchor).await;
        self.publish_progress(batch_id, &chain, status_label, now);
        attest_telemetry::chain_metrics().inc_anchor_dispatch(&chain, status_label);
    }

    fn publish_progress(&self, batch_id: BatchId, chain: &str, status: &str, now: u64) {
        self.events.publish(
            "BATCH_ANCHOR_PROGRESS",
            serde_json::json!({"batch_id": batch_id, "chain": chain, "status": status}),
            now,
        );
    }

    /// Reports, per batch, the set of chains where the anchor is confirmed,
    /// and whether the batch is "available" (`spec.md` §4.7: at least one
    /// confirmed anchor).
    pub async fn sync_status(&self, batch_id: BatchId) -> Result<CrossChainStatus, AttestError> {
        let batch = self.store.get_batch(batch_id).await?;
        let available = batch.anchors.values().any(|a| a.status == AnchorStatus::Confirmed);
        Ok(CrossChainStatus {
            batch_id,
            anchors: batch.anchors,
            available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attest_chain_client::fake::{FakeChainClient, SendBehavior};
    use attest_persistence::InMemoryStore;
    use attest_types::model::MerkleBatch;

    async fn store_with_batch() -> Arc<dyn Store> {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        store
            .create_batch_with_leaves(
                MerkleBatch {
                    batch_id: 1,
                    leaf_count: 1,
                    root: Digest::ZERO,
                    created_at: 0,
                    metadata: "m".to_string(),
                    leaves: vec![Digest::ZERO],
                    anchors: Default::default(),
                },
                &[],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn dispatch_records_pending_for_successful_send() {
        let store = store_with_batch().await;
        let events = Arc::new(EventBus::new(16, 8));
        let dispatcher = Arc::new(CrossChainDispatcher::new(store.clone(), events, DEFAULT_CONFIRM_TIMEOUT));
        dispatcher.register_client("sepolia", Arc::new(FakeChainClient::new("sepolia")));

        let outcomes = dispatcher
            .dispatch(1, Digest::ZERO, 1, "m".to_string(), &["sepolia".to_string()], 100)
            .await;

        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, AnchorStatus::Pending);
        assert!(outcomes[0].tx_hash.is_some());

        let batch = store.get_batch(1).await.unwrap();
        assert_eq!(batch.anchors.get("sepolia").unwrap().status, AnchorStatus::Pending);
    }

    #[tokio::test]
    async fn dispatch_records_failure_for_unknown_chain() {
        let store = store_with_batch().await;
        let events = Arc::new(EventBus::new(16, 8));
        let dispatcher = Arc::new(CrossChainDispatcher::new(store.clone(), events, DEFAULT_CONFIRM_TIMEOUT));

        let outcomes = dispatcher
            .dispatch(1, Digest::ZERO, 1, "m".to_string(), &["ghost-chain".to_string()], 100)
            .await;

        assert_eq!(outcomes[0].status, AnchorStatus::Failed);
        let batch = store.get_batch(1).await.unwrap();
        assert_eq!(batch.anchors.get("ghost-chain").unwrap().status, AnchorStatus::Failed);
    }

    #[tokio::test]
    async fn dispatch_records_failure_for_permanent_send_error() {
        let store = store_with_batch().await;
        let events = Arc::new(EventBus::new(16, 8));
        let dispatcher = Arc::new(CrossChainDispatcher::new(store.clone(), events, DEFAULT_CONFIRM_TIMEOUT));
        let client = FakeChainClient::new("sepolia").with_send_behavior(SendBehavior::FailPermanent("boom".to_string()));
        dispatcher.register_client("sepolia", Arc::new(client));

        let outcomes = dispatcher
            .dispatch(1, Digest::ZERO, 1, "m".to_string(), &["sepolia".to_string()], 100)
            .await;

        assert_eq!(outcomes[0].status, AnchorStatus::Failed);
    }

    #[tokio::test]
    async fn sync_status_is_unavailable_until_a_chain_confirms() {
        let store = store_with_batch().await;
        let status = {
            let events = Arc::new(EventBus::new(16, 8));
            let dispatcher = Arc::new(CrossChainDispatcher::new(store.clone(), events, DEFAULT_CONFIRM_TIMEOUT));
            dispatcher.sync_status(1).await.unwrap()
        };
        assert!(!status.available);

        store
            .update_anchor(
                1,
                "sepolia",
                ChainAnchor {
                    tx_hash: Some(Digest::ZERO),
                    block_number: Some(10),
                    gas_used: Some(21000),
                    status: AnchorStatus::Confirmed,
                    error: None,
                },
            )
            .await
            .unwrap();
        let events = Arc::new(EventBus::new(16, 8));
        let dispatcher = CrossChainDispatcher::new(store.clone(), events, DEFAULT_CONFIRM_TIMEOUT);
        let status = dispatcher.sync_status(1).await.unwrap();
        assert!(status.available);
    }
}
