// Path: crates/attest-chain-client/src/alloy_client.rs
//! The `alloy`-backed [`ChainClient`] implementation.
//!
//! One instance per configured network. Nonce allocation is serialized by
//! a per-instance `tokio::sync::Mutex` held only across build-sign-
//! broadcast (`spec.md` §4.4 "an instance serializes nonce allocation per
//! signing key"); estimate/wait/balance calls do not take the lock.

use crate::retry::{retry_transient, RetryPolicy};
use crate::{AnchorOp, ChainClient, GasEstimate, Receipt};
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use attest_types::error::ChainError;
use attest_types::ids::Digest;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

sol! {
    #[sol(rpc)]
    interface IAnchorRegistry {
        function anchor(bytes32 root, uint256 leafCount, string metadata) external;
    }
}

/// Construction parameters for one network's client.
#[derive(Debug, Clone)]
pub struct AlloyClientConfig {
    pub chain_name: String,
    pub rpc_url: String,
    pub signing_key_hex: String,
    pub contract_address: Address,
    pub retry_policy: RetryPolicy,
}

/// A live `alloy`-backed chain client for one network.
pub struct AlloyChainClient {
    chain_name: String,
    contract_address: Address,
    retry_policy: RetryPolicy,
    send_lock: Mutex<()>,
    provider: DynProvider,
}

impl AlloyChainClient {
    pub fn new(config: AlloyClientConfig) -> Result<Self, ChainError> {
        let signer: PrivateKeySigner = config.signing_key_hex.parse().map_err(|e| ChainError::Connect {
            chain: config.chain_name.clone(),
            reason: format!("invalid signing key: {e}"),
        })?;
        let wallet = EthereumWallet::from(signer);
        let url = config.rpc_url.parse().map_err(|e| ChainError::Connect {
            chain: config.chain_name.clone(),
            reason: format!("invalid rpc url: {e}"),
        })?;
        let provider = ProviderBuilder::new()
            .with_recommended_fillers()
            .wallet(wallet)
            .on_http(url)
            .erased();

        Ok(Self {
            chain_name: config.chain_name,
            contract_address: config.contract_address,
            retry_policy: config.retry_policy,
            send_lock: Mutex::new(()),
            provider,
        })
    }

    fn anchor_calldata(op: &AnchorOp) -> Bytes {
        let call = IAnchorRegistry::anchorCall {
            root: B256::from(*op.root.as_bytes()),
            leafCount: U256::from(op.leaf_count),
            metadata: op.metadata.clone(),
        };
        Bytes::from(call.abi_encode())
    }

    fn is_transient_message(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("timeout")
            || lower.contains("connection")
            || lower.contains("temporarily")
            || lower.contains("nonce too low")
            || lower.contains("rate limit")
    }
}

#[async_trait::async_trait]
impl ChainClient for AlloyChainClient {
    fn chain_name(&self) -> &str {
        &self.chain_name
    }

    async fn connect(&self) -> Result<(), ChainError> {
        self.provider
            .get_chain_id()
            .await
            .map(|_| ())
            .map_err(|e| ChainError::Connect {
                chain: self.chain_name.clone(),
                reason: e.to_string(),
            })
    }

    async fn estimate_gas(&self, op: &AnchorOp) -> Result<GasEstimate, ChainError> {
        let calldata = Self::anchor_calldata(op);
        let tx = TransactionRequest::default()
            .with_to(self.contract_address)
            .with_input(calldata);

        let chain = self.chain_name.clone();
        let gas_units = retry_transient(
            &self.retry_policy,
            |e: &String| Self::is_transient_message(e),
            || {
                let tx = tx.clone();
                let provider = &self.provider;
                async move {
                    provider
                        .estimate_gas(&tx)
                        .await
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await
        .map_err(|reason| ChainError::RpcPermanent {
            chain: chain.clone(),
            reason,
        })?;

        let gas_price_wei = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| ChainError::RpcPermanent {
                chain: chain.clone(),
                reason: e.to_string(),
            })?;

        Ok(GasEstimate {
            gas_units,
            gas_price_wei,
        })
    }

    async fn send(&self, op: &AnchorOp) -> Result<Digest, ChainError> {
        let _guard = self.send_lock.lock().await;
        let calldata = Self::anchor_calldata(op);
        let tx = TransactionRequest::default()
            .with_to(self.contract_address)
            .with_input(calldata);

        let chain = self.chain_name.clone();
        let tx_hash = retry_transient(
            &self.retry_policy,
            |e: &String| Self::is_transient_message(e),
            || {
                let tx = tx.clone();
                async move {
                    self.provider
                        .send_transaction(tx)
                        .await
                        .map(|pending| *pending.tx_hash())
                        .map_err(|e| e.to_string())
                }
            },
        )
        .await
        .map_err(|reason| ChainError::RpcPermanent { chain, reason })?;

        Ok(Digest::from_bytes(tx_hash.0))
    }

    async fn wait_receipt(&self, tx_hash: Digest, deadline: Duration) -> Result<Receipt, ChainError> {
        let hash = B256::from(*tx_hash.as_bytes());
        let started = Instant::now();
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(hash)
                .await
                .map_err(|e| ChainError::RpcPermanent {
                    chain: self.chain_name.clone(),
                    reason: e.to_string(),
                })?;
            if let Some(receipt) = receipt {
                return Ok(Receipt {
                    block_number: receipt.block_number.unwrap_or_default(),
                    gas_used: receipt.gas_used as u64,
                    status: receipt.status(),
                });
            }
            if started.elapsed() >= deadline {
                return Err(ChainError::ReceiptTimeout(self.chain_name.clone()));
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }
    }

    async fn balance(&self, address: &str) -> Result<u128, ChainError> {
        let addr: Address = address.parse().map_err(|_| ChainError::RpcPermanent {
            chain: self.chain_name.clone(),
            reason: format!("invalid address: {address}"),
        })?;
        let balance = self
            .provider
            .get_balance(addr)
            .await
            .map_err(|e| ChainError::RpcPermanent {
                chain: self.chain_name.clone(),
                reason: e.to_string(),
            })?;
        balance
            .try_into()
            .map_err(|_| ChainError::RpcPermanent {
                chain: self.chain_name.clone(),
                reason: "balance overflowed u128".to_string(),
            })
    }

    fn decode_event(&self, topic: &str, data: &[u8]) -> Result<serde_json::Value, ChainError> {
        // The exact contract ABI is a deployment input (`spec.md` §6), so
        // this client only offers a best-effort structural decode; callers
        // needing typed event decoding for a specific deployed ABI should
        // generate bindings with `alloy::sol!` against that ABI directly.
        Ok(serde_json::json!({
            "topic": topic,
            "data_hex": hex::encode(data),
        }))
    }
}
