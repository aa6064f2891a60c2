// Path: crates/attest-api/src/executors.rs
//! Façade-level [`ProposalExecutor`] implementations, looked up by
//! `attest_multisig::MultisigEngine` via `ProposalKind::kind_name()`
//! (`spec.md` §4.8).

use crate::secret_cipher::{self, SecretCipherKey};
use crate::state::AppState;
use attest_multisig::ProposalExecutor;
use attest_types::error::MultisigError;
use attest_types::model::ProposalKind;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Executes `REGISTER_DEVICE` proposals once they reach APPROVED: decrypts
/// the carried secret and calls [`AppState::register_device`].
///
/// `ProposalExecutor::execute` takes no explicit clock, unlike the rest of
/// this kernel's engine APIs — the FSM that calls it is the one boundary
/// where "now" is the moment of execution itself, not a value the caller
/// already had in hand, so this reads the wall clock directly rather than
/// threading a `now` parameter through the trait.
pub struct DeviceRegistrationExecutor {
    state: Arc<AppState>,
    cipher_key: SecretCipherKey,
}

impl DeviceRegistrationExecutor {
    pub fn new(state: Arc<AppState>, cipher_key: SecretCipherKey) -> Self {
        Self { state, cipher_key }
    }
}

#[async_trait::async_trait]
impl ProposalExecutor for DeviceRegistrationExecutor {
    async fn execute(&self, kind: &ProposalKind) -> Result<String, MultisigError> {
        let ProposalKind::RegisterDevice {
            device_id,
            device_name,
            device_type,
            secret_ciphertext,
        } = kind;

        let secret = secret_cipher::decrypt(&self.cipher_key, secret_ciphertext);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        self.state
            .register_device(device_id.clone(), device_name.clone(), device_type.clone(), &secret, now)
            .await
            .map(|device| device.device_id.as_str().to_string())
            .map_err(|e| MultisigError::ExecutionFailed(e.to_string()))
    }
}
