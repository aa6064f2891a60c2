// Path: crates/attest-types/src/config.rs
//! Environment-driven configuration, shared by every binary and service
//! crate (`spec.md` §6 "Configuration").
//!
//! Values are parsed with explicit `std::env::var` calls and typed
//! defaults rather than a derive macro, matching the teacher's convention
//! of keeping configuration loading inspectable and failure-explicit.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// A structured configuration error: which variable, and why it was rejected.
#[derive(Debug)]
pub struct ConfigError {
    pub variable: String,
    pub reason: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid configuration for {}: {}", self.variable, self.reason)
    }
}

impl std::error::Error for ConfigError {}

fn env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError {
            variable: name.to_string(),
            reason: format!("expected an integer, got {raw:?}"),
        }),
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Err(_) => Ok(default),
        Ok(raw) => raw.parse().map_err(|_| ConfigError {
            variable: name.to_string(),
            reason: format!("expected an integer, got {raw:?}"),
        }),
    }
}

fn env_string(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_list(name: &str) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Per-network RPC configuration, one entry per `<NET>_RPC_URL` triple
/// named in `spec.md` §6.
#[derive(Debug, Clone)]
pub struct ChainEnvConfig {
    pub name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    /// Hex-encoded private key material; never logged.
    pub signing_key: String,
    /// The deployed anchor-registry contract address for this network,
    /// `0x`-prefixed hex; empty if unset (a live client then fails fast
    /// when built, rather than this layer guessing a default).
    pub contract_address: String,
}

/// Top-level service configuration, populated from environment variables.
#[derive(Debug, Clone)]
pub struct AttestConfig {
    pub store_url: String,
    pub listen_addr: String,
    pub rpc_timeout: Duration,
    pub confirm_timeout: Duration,
    pub validity_window: Duration,
    pub live_window: Duration,
    pub idle_window: Duration,
    pub max_sub_queue: usize,
    pub event_history: usize,
    pub max_rpc_backoff: Duration,
    pub max_rpc_attempts: u32,
    pub cas_max_retries: u32,
    pub threshold_leaves: usize,
    pub threshold_age: Duration,
    pub presence_sweep_interval: Duration,
    pub chains: BTreeMap<String, ChainEnvConfig>,
    pub telemetry_addr: String,
    pub rate_limit_rps: u32,
    pub rate_limit_burst: u32,
    pub trusted_proxies: Vec<String>,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
    pub concurrency_limit: usize,
    /// `signer_id:hex_pubkey` pairs seeded into the multi-sig signer set at
    /// startup, since `spec.md` §6's wire surface has no endpoint to add one.
    pub bootstrap_signers: Vec<String>,
}

impl AttestConfig {
    /// Loads configuration from the process environment, using the
    /// defaults named in `spec.md` §4/§6 when a variable is unset.
    ///
    /// `known_networks` lists the network names to probe for
    /// `<NET>_RPC_URL` / `<NET>_CHAIN_ID` / `<NET>_SIGNING_KEY` triples;
    /// a network missing its `RPC_URL` is silently skipped rather than
    /// treated as a hard error, since a deployment may only anchor to a
    /// subset of the chains it's compiled to know about.
    pub fn from_env(known_networks: &[&str]) -> Result<Self, ConfigError> {
        let mut chains = BTreeMap::new();
        for name in known_networks {
            let upper = name.to_uppercase();
            let rpc_key = format!("{upper}_RPC_URL");
            let Ok(rpc_url) = std::env::var(&rpc_key) else {
                continue;
            };
            let chain_id = env_u64(&format!("{upper}_CHAIN_ID"), 0)?;
            let signing_key = env_string(&format!("{upper}_SIGNING_KEY"), "");
            let contract_address = env_string(&format!("{upper}_CONTRACT_ADDRESS"), "");
            chains.insert(
                name.to_string(),
                ChainEnvConfig {
                    name: name.to_string(),
                    rpc_url,
                    chain_id,
                    signing_key,
                    contract_address,
                },
            );
        }

        Ok(Self {
            store_url: env_string("STORE_URL", "memory://local"),
            listen_addr: env_string("LISTEN_ADDR", "0.0.0.0:8080"),
            rpc_timeout: Duration::from_secs(env_u64("RPC_TIMEOUT", 20)?),
            confirm_timeout: Duration::from_secs(env_u64("CONFIRM_TIMEOUT", 180)?),
            validity_window: Duration::from_secs(env_u64("VALIDITY_WINDOW", 300)?),
            live_window: Duration::from_secs(env_u64("LIVE_WINDOW", 60)?),
            idle_window: Duration::from_secs(env_u64("IDLE_WINDOW", 300)?),
            max_sub_queue: env_usize("MAX_SUB_QUEUE", 256)?,
            event_history: env_usize("EVENT_HISTORY", 100)?,
            max_rpc_backoff: Duration::from_secs(env_u64("MAX_RPC_BACKOFF", 30)?),
            max_rpc_attempts: env_u64("MAX_RPC_ATTEMPTS", 5)? as u32,
            cas_max_retries: env_u64("CAS_MAX_RETRIES", 5)? as u32,
            threshold_leaves: env_usize("THRESHOLD_LEAVES", 100)?,
            threshold_age: Duration::from_secs(env_u64("THRESHOLD_AGE", 60)?),
            presence_sweep_interval: Duration::from_secs(env_u64("PRESENCE_SWEEP_SECS", 15)?),
            chains,
            telemetry_addr: env_string("TELEMETRY_ADDR", "0.0.0.0:9090"),
            rate_limit_rps: env_u64("RATE_LIMIT_RPS", 50)? as u32,
            rate_limit_burst: env_u64("RATE_LIMIT_BURST", 100)? as u32,
            trusted_proxies: env_list("TRUSTED_PROXIES"),
            request_timeout: Duration::from_secs(env_u64("REQUEST_TIMEOUT", 15)?),
            max_body_bytes: env_usize("MAX_BODY_BYTES", 1_048_576)?,
            concurrency_limit: env_usize("CONCURRENCY_LIMIT", 512)?,
            bootstrap_signers: env_list("BOOTSTRAP_SIGNERS"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        // SAFETY-of-intent: no test in this module sets a variable this one
        // reads, across the whole suite, by convention (prefixed ATTEST_TEST_).
        let cfg = AttestConfig::from_env(&[]).unwrap();
        assert_eq!(cfg.rpc_timeout, Duration::from_secs(20));
        assert_eq!(cfg.max_sub_queue, 256);
        assert!(cfg.chains.is_empty());
    }

    #[test]
    fn skips_networks_without_rpc_url() {
        let cfg = AttestConfig::from_env(&["sepolia", "polygonMumbai"]).unwrap();
        assert!(cfg.chains.is_empty());
    }
}
