// Path: crates/attest-chain-registry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The chain registry (C5, `spec.md` §4.5): a mapping of network name to
//! RPC/contract configuration, an "active" default, and per-network
//! deployment records.
//!
//! Readers observe a consistent snapshot (`spec.md` §5: "the active-network
//! selection and the chain registry are single-writer, multi-reader; readers
//! observe a consistent snapshot"); switching the active name is a single
//! atomic write guarded by a `std::sync::RwLock` over the whole map, which
//! is sufficient at this scale (config updates are rare, reads are cheap).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// Static configuration for one named network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainEntry {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
    pub native_decimals: u8,
    pub explorer_base: String,
    pub contract_addresses: BTreeMap<String, String>,
}

/// A record of what has been deployed to a network, keyed by network name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub chain_name: String,
    pub anchor_contract: String,
    pub deployed_at: u64,
    pub deployed_by_tx: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    chains: BTreeMap<String, ChainEntry>,
    deployments: BTreeMap<String, DeploymentRecord>,
    active: Option<String>,
}

/// The chain registry itself: construction-time dependency, injected into
/// the façade and cross-chain dispatcher (`spec.md` §9 redesign flag
/// against module-level singletons).
#[derive(Debug, Default)]
pub struct ChainRegistry {
    inner: RwLock<RegistryInner>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces a network entry.
    pub fn register(&self, entry: ChainEntry) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.chains.insert(entry.name.clone(), entry);
    }

    /// Returns a clone of the named network's configuration, if known.
    pub fn get(&self, name: &str) -> Option<ChainEntry> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).chains.get(name).cloned()
    }

    /// Lists every registered network, sorted by name.
    pub fn list(&self) -> Vec<ChainEntry> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .chains
            .values()
            .cloned()
            .collect()
    }

    /// Atomically switches the "active" default network. Returns `false`
    /// without changing anything if `name` is not registered.
    pub fn set_active(&self, name: &str) -> bool {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if !inner.chains.contains_key(name) {
            return false;
        }
        inner.active = Some(name.to_string());
        true
    }

    /// The currently active network name, if one has been set.
    pub fn active(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).active.clone()
    }

    /// Records (or replaces) a deployment for `chain_name`.
    pub fn record_deployment(&self, record: DeploymentRecord) {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.deployments.insert(record.chain_name.clone(), record);
    }

    /// Looks up the deployment record for `chain_name`, if any.
    pub fn deployment(&self, chain_name: &str) -> Option<DeploymentRecord> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .deployments
            .get(chain_name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> ChainEntry {
        ChainEntry {
            name: name.to_string(),
            chain_id: 11155111,
            rpc_url: format!("https://{name}.example"),
            native_decimals: 18,
            explorer_base: format!("https://explorer.{name}.example"),
            contract_addresses: BTreeMap::new(),
        }
    }

    #[test]
    fn set_active_requires_registration() {
        let registry = ChainRegistry::new();
        assert!(!registry.set_active("sepolia"));
        registry.register(entry("sepolia"));
        assert!(registry.set_active("sepolia"));
        assert_eq!(registry.active().as_deref(), Some("sepolia"));
    }

    #[test]
    fn list_returns_all_registered_networks() {
        let registry = ChainRegistry::new();
        registry.register(entry("sepolia"));
        registry.register(entry("polygonMumbai"));
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn deployment_round_trips() {
        let registry = ChainRegistry::new();
        registry.record_deployment(DeploymentRecord {
            chain_name: "sepolia".to_string(),
            anchor_contract: "0xabc".to_string(),
            deployed_at: 1_700_000_000,
            deployed_by_tx: None,
        });
        let record = registry.deployment("sepolia").unwrap();
        assert_eq!(record.anchor_contract, "0xabc");
        assert!(registry.deployment("unknown").is_none());
    }
}
