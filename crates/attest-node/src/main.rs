// Path: crates/attest-node/src/main.rs
//! The service binary: wires every engine crate behind `attest-api`,
//! grounded on the teacher's node binaries for CLI shape (`clap::Parser`,
//! `tokio::main`, `tracing` init near the top, `ctrl_c` shutdown) though
//! none of them are a close domain match for an HTTP façade host.

use anyhow::{Context, Result};
use attest_anchor::{AnchorPipeline, TriggerPolicy};
use attest_api::executors::DeviceRegistrationExecutor;
use attest_api::secret_cipher::SecretCipherKey;
use attest_api::AppState;
use attest_chain_client::fake::FakeChainClient;
use attest_chain_client::retry::RetryPolicy;
use attest_chain_client::{AlloyChainClient, AlloyClientConfig, ChainClient};
use attest_chain_registry::{ChainEntry, ChainRegistry};
use attest_crosschain::CrossChainDispatcher;
use attest_crypto::ReplayCache;
use attest_events::EventBus;
use attest_multisig::{Ed25519SignaturePredicate, MultisigEngine};
use attest_persistence::{InMemoryStore, Store};
use attest_presence::{PresenceTracker, PresenceWindows};
use attest_types::config::AttestConfig;
use attest_types::model::Signer;
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;

/// Networks this binary knows how to configure via `<NET>_RPC_URL` triples
/// (`spec.md` §9's worked cross-chain example names exactly these three).
const KNOWN_NETWORKS: &[&str] = &["sepolia", "polygonMumbai", "bscTestnet"];

#[derive(Parser, Debug)]
#[command(name = "attest-node", version, about = "The attestation kernel service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the HTTP/WebSocket façade and telemetry server until signaled to stop.
    Serve {
        /// Use an in-process fake chain client for every configured network
        /// instead of a live `alloy` RPC connection. Useful for demos and
        /// local development without funded signing keys.
        #[arg(long)]
        fake_chains: bool,
    },
    /// Loads configuration from the environment and reports what was found, without serving.
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    attest_telemetry::init::init_tracing().context("failed to initialize tracing")?;
    attest_telemetry::prometheus::install().context("failed to install prometheus sink")?;

    let cli = Cli::parse();
    let config = AttestConfig::from_env(KNOWN_NETWORKS).context("failed to load configuration")?;

    match cli.command {
        Commands::CheckConfig => {
            tracing::info!(
                listen_addr = %config.listen_addr,
                telemetry_addr = %config.telemetry_addr,
                chains = ?config.chains.keys().collect::<Vec<_>>(),
                "configuration loaded"
            );
            Ok(())
        }
        Commands::Serve { fake_chains } => serve(config, fake_chains).await,
    }
}

async fn serve(config: AttestConfig, fake_chains: bool) -> Result<()> {
    let config = Arc::new(config);

    let store: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let events = Arc::new(EventBus::new(config.event_history, config.max_sub_queue));
    let replay = Arc::new(ReplayCache::new());

    let anchor = Arc::new(AnchorPipeline::new(
        store.clone(),
        TriggerPolicy {
            threshold_leaves: config.threshold_leaves,
            threshold_age: config.threshold_age,
        },
    ));

    let dispatcher = Arc::new(CrossChainDispatcher::new(store.clone(), events.clone(), config.confirm_timeout));
    let chains = Arc::new(ChainRegistry::new());
    for (name, chain_cfg) in &config.chains {
        let mut contract_addresses = BTreeMap::new();
        if !chain_cfg.contract_address.is_empty() {
            contract_addresses.insert("anchor_registry".to_string(), chain_cfg.contract_address.clone());
        }
        chains.register(ChainEntry {
            name: name.clone(),
            chain_id: chain_cfg.chain_id,
            rpc_url: chain_cfg.rpc_url.clone(),
            native_decimals: 18,
            explorer_base: String::new(),
            contract_addresses,
        });

        let client: Arc<dyn ChainClient> = if fake_chains {
            Arc::new(FakeChainClient::new(name.clone()))
        } else {
            let contract_address: alloy::primitives::Address = chain_cfg
                .contract_address
                .parse()
                .with_context(|| format!("invalid {name}_CONTRACT_ADDRESS"))?;
            let retry_policy = RetryPolicy::from_env_defaults(config.max_rpc_backoff, config.max_rpc_attempts);
            let client_config = AlloyClientConfig {
                chain_name: name.clone(),
                rpc_url: chain_cfg.rpc_url.clone(),
                signing_key_hex: chain_cfg.signing_key.clone(),
                contract_address,
                retry_policy,
            };
            Arc::new(AlloyChainClient::new(client_config).with_context(|| format!("failed to build chain client for {name}"))?)
        };
        dispatcher.register_client(name.clone(), client);
    }

    let multisig = Arc::new(MultisigEngine::new(store.clone(), events.clone(), Arc::new(Ed25519SignaturePredicate)));

    let cipher_key = SecretCipherKey::new(load_or_generate_cipher_key());

    let app_state = Arc::new(AppState {
        store: store.clone(),
        replay,
        config: config.clone(),
        anchor: anchor.clone(),
        dispatcher,
        multisig: multisig.clone(),
        presence: Arc::new(PresenceTracker::new(
            PresenceWindows {
                live_window: config.live_window,
                idle_window: config.idle_window,
            },
            events.clone(),
        )),
        events,
        chains,
        secret_cipher_key: cipher_key.clone(),
    });

    multisig.register_executor(
        "REGISTER_DEVICE",
        Arc::new(DeviceRegistrationExecutor::new(app_state.clone(), cipher_key)),
    );

    bootstrap_signers(&store, &config.bootstrap_signers, now_secs()).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let telemetry_addr: SocketAddr = config
        .telemetry_addr
        .parse()
        .context("invalid TELEMETRY_ADDR")?;
    let telemetry_shutdown = shutdown_rx.clone();
    let telemetry_task = tokio::spawn(async move {
        attest_telemetry::http::run_server(telemetry_addr, telemetry_shutdown).await;
    });

    let sweep_state = app_state.clone();
    let sweep_interval = config.presence_sweep_interval;
    let mut sweep_shutdown = shutdown_rx.clone();
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let now = sweep_state.now();
                    sweep_state.presence.sweep(now);
                    if let Err(e) = sweep_state.multisig.sweep_expired(now).await {
                        tracing::warn!(error = %e, "proposal expiry sweep failed");
                    }
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    let api_config = config.clone();
    let api_result = attest_api::serve(app_state, &api_config, shutdown_rx).await;

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(telemetry_task, sweep_task);

    api_result
}

/// Inserts the configured bootstrap signers (`signer_id:hex_pubkey` pairs)
/// so the multi-sig engine has an initial signer set; `spec.md` §6's wire
/// surface has no endpoint to add one, so this is the only way in.
async fn bootstrap_signers(store: &Arc<InMemoryStore>, entries: &[String], now: u64) -> Result<()> {
    for entry in entries {
        let (signer_id, pubkey_hex) = entry
            .split_once(':')
            .with_context(|| format!("malformed BOOTSTRAP_SIGNERS entry {entry:?}, expected signer_id:hex_pubkey"))?;
        let public_key = hex::decode(pubkey_hex).with_context(|| format!("invalid hex pubkey for signer {signer_id}"))?;
        store
            .add_signer(Signer {
                signer_id: signer_id.to_string(),
                public_key,
                added_at: now,
                is_active: true,
            })
            .await
            .with_context(|| format!("failed to bootstrap signer {signer_id}"))?;
    }
    Ok(())
}

/// A process-lifetime key for `attest-api::secret_cipher`. Read from
/// `SECRET_CIPHER_KEY` (hex) when set so that a restarted process can still
/// decrypt proposals created before the restart; otherwise a fresh random
/// key is generated and a warning logged, since an in-memory store has
/// nothing to decrypt across a restart anyway.
fn load_or_generate_cipher_key() -> Vec<u8> {
    match std::env::var("SECRET_CIPHER_KEY") {
        Ok(hex_key) => match hex::decode(&hex_key) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "SECRET_CIPHER_KEY is not valid hex, generating a random key instead");
                random_key()
            }
        },
        Err(_) => {
            tracing::warn!("SECRET_CIPHER_KEY not set, generating a random key for this process");
            random_key()
        }
    }
}

fn random_key() -> Vec<u8> {
    use rand::RngCore;
    let mut key = vec![0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);
    key
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
