// Path: crates/attest-api/src/state.rs
//! Shared application state handed to every handler (`spec.md` §4.12
//! dataflow: the façade composes every engine crate behind one surface).

use crate::error::AppError;
use crate::secret_cipher::SecretCipherKey;
use attest_anchor::AnchorPipeline;
use attest_chain_registry::ChainRegistry;
use attest_crosschain::CrossChainDispatcher;
use attest_crypto::ReplayCache;
use attest_events::EventBus;
use attest_multisig::MultisigEngine;
use attest_persistence::Store;
use attest_presence::PresenceTracker;
use attest_types::config::AttestConfig;
use attest_types::error::{AttestError, AuthError};
use attest_types::ids::DeviceId;
use attest_types::model::{Device, Proof};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Everything a handler needs, cloned cheaply via `Arc` fields.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub replay: Arc<ReplayCache>,
    pub config: Arc<AttestConfig>,
    pub anchor: Arc<AnchorPipeline>,
    pub dispatcher: Arc<CrossChainDispatcher>,
    pub multisig: Arc<MultisigEngine>,
    pub presence: Arc<PresenceTracker>,
    pub events: Arc<EventBus>,
    pub chains: Arc<ChainRegistry>,
    pub secret_cipher_key: SecretCipherKey,
}

impl AppState {
    /// The current wall-clock time as Unix seconds; the one place this
    /// façade converts `SystemTime` into the `u64` clock every engine
    /// crate's API takes explicitly.
    pub fn now(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Registers a brand-new device: computes its commitment, persists it,
    /// and publishes `DEVICE_REGISTERED` (`spec.md` §4.2 "Registration").
    /// Shared by the direct `/devices/register` handler and the
    /// `REGISTER_DEVICE` multi-sig executor.
    pub async fn register_device(
        &self,
        device_id: DeviceId,
        device_name: String,
        device_type: String,
        secret: &[u8],
        now: u64,
    ) -> Result<Device, AttestError> {
        if self.store.get_device(&device_id).await.is_ok() {
            return Err(AuthError::DeviceExists.into());
        }
        let public_commitment = attest_crypto::commitment(&device_id, secret);
        let device = Device {
            device_id: device_id.clone(),
            device_name,
            device_type,
            public_commitment,
            registered_at: now,
            last_authenticated_at: None,
            is_active: true,
            total_data_submitted: 0,
        };
        self.store.put_new_device(device.clone()).await?;
        attest_telemetry::auth_metrics().inc_registration();
        self.events.publish(
            "DEVICE_REGISTERED",
            attest_events::device_topic_payload(&device_id, serde_json::json!({})),
            now,
        );
        Ok(device)
    }

    /// Authenticates `proof`, enforcing the exact check ordering
    /// `spec.md` §4.2 prescribes: staleness first, then device lookup
    /// (`UNKNOWN_DEVICE`/`INACTIVE_DEVICE`), then the pure commitment and
    /// replay checks `attest_crypto::verify` performs.
    pub async fn authenticate(&self, proof: Proof, now: u64) -> Result<attest_crypto::Verified, AppError> {
        let delta = now.abs_diff(proof.timestamp);
        if delta > self.config.validity_window.as_secs() {
            attest_telemetry::auth_metrics().inc_auth_attempt("stale_proof");
            return Err(AttestError::from(AuthError::StaleProof).into());
        }

        let device = self
            .store
            .get_device(&proof.device_id)
            .await
            .map_err(|_| AppError::from(AttestError::from(AuthError::UnknownDevice)))?;
        if !device.is_active {
            attest_telemetry::auth_metrics().inc_auth_attempt("inactive_device");
            return Err(AttestError::from(AuthError::InactiveDevice).into());
        }

        let verified = attest_crypto::verify(
            &self.replay,
            &proof,
            &device.public_commitment,
            now,
            self.config.validity_window,
        )
        .map_err(|e| {
            let outcome = match e {
                AuthError::BadProof => "bad_proof",
                AuthError::Replay => "replay",
                _ => "rejected",
            };
            attest_telemetry::auth_metrics().inc_auth_attempt(outcome);
            AppError::from(AttestError::from(e))
        })?;

        self.store.touch_authenticated(&proof.device_id, verified.at).await?;
        attest_telemetry::auth_metrics().inc_auth_attempt("ok");
        self.events.publish(
            "DEVICE_AUTHENTICATED",
            attest_events::device_topic_payload(&proof.device_id, serde_json::json!({})),
            now,
        );
        Ok(verified)
    }
}
