// Path: crates/attest-api/src/routes/devices.rs
//! `/devices/*` handlers (`spec.md` §6).

use crate::error::AppError;
use crate::state::AppState;
use attest_types::error::{AttestError, AuthError};
use attest_types::ids::DeviceId;
use attest_types::model::{Proof, ProposalKind};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    /// Hex-encoded device secret (`spec.md` §4.2 registration input).
    pub secret: String,
}

#[derive(Serialize)]
pub struct RegisterResponse {
    pub device_id: String,
    pub public_commitment: String,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = DeviceId::new(req.device_id).map_err(AppError::BadRequest)?;
    let secret = hex::decode(&req.secret).map_err(|e| AppError::BadRequest(format!("secret: {e}")))?;
    let now = state.now();
    let device = state
        .register_device(device_id, req.device_name, req.device_type, &secret, now)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            device_id: device.device_id.as_str().to_string(),
            public_commitment: device.public_commitment.to_string(),
        }),
    ))
}

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    pub proof: Proof,
}

#[derive(Serialize)]
pub struct AuthenticateResponse {
    pub ok: bool,
    pub at: u64,
}

pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AuthenticateRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = state.now();
    let verified = state.authenticate(req.proof, now).await?;
    Ok(Json(AuthenticateResponse { ok: true, at: verified.at }))
}

#[derive(Deserialize)]
pub struct SubmitDataRequest {
    pub device_id: String,
    pub payload: serde_json::Value,
}

#[derive(Serialize)]
pub struct SubmitDataResponse {
    pub accepted: bool,
    pub pending_count: usize,
}

pub async fn submit_data(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SubmitDataRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = DeviceId::new(req.device_id).map_err(AppError::BadRequest)?;
    let device = state
        .store
        .get_device(&device_id)
        .await
        .map_err(|_| AppError::from(AttestError::from(AuthError::UnknownDevice)))?;
    if !device.is_active {
        return Err(AppError::from(AttestError::from(AuthError::InactiveDevice)));
    }

    let now = state.now();
    state.anchor.submit(device_id.clone(), req.payload, now).await?;
    state.store.bump_device_counter(&device_id, 1).await?;
    let pending_count = state.store.list_pending_ordered().await?.len();
    state.events.publish(
        "DATA_SUBMITTED",
        attest_events::device_topic_payload(&device_id, serde_json::json!({})),
        now,
    );
    attest_telemetry::anchor_metrics().set_pending_depth(pending_count as u64);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitDataResponse {
            accepted: true,
            pending_count,
        }),
    ))
}

#[derive(Serialize)]
pub struct DeviceView {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    pub public_commitment: String,
    pub registered_at: u64,
    pub last_authenticated_at: Option<u64>,
    pub is_active: bool,
    pub total_data_submitted: u64,
}

impl From<attest_types::model::Device> for DeviceView {
    fn from(d: attest_types::model::Device) -> Self {
        Self {
            device_id: d.device_id.as_str().to_string(),
            device_name: d.device_name,
            device_type: d.device_type,
            public_commitment: d.public_commitment.to_string(),
            registered_at: d.registered_at,
            last_authenticated_at: d.last_authenticated_at,
            is_active: d.is_active,
            total_data_submitted: d.total_data_submitted,
        }
    }
}

pub async fn list(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let devices = state.store.list_devices().await?;
    let views: Vec<DeviceView> = devices.into_iter().map(DeviceView::from).collect();
    Ok(Json(views))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = DeviceId::new(id).map_err(AppError::BadRequest)?;
    let device = state.store.get_device(&device_id).await?;
    Ok(Json(DeviceView::from(device)))
}

/// Builds a `REGISTER_DEVICE` multi-sig proposal kind — used by deployments
/// that require threshold approval for new enrollments (`spec.md` §4.8)
/// instead of the direct `/devices/register` path. Called by
/// `crate::routes::multisig::propose`, which supplies the already-encrypted
/// secret.
pub fn register_proposal_kind(
    device_id: DeviceId,
    device_name: String,
    device_type: String,
    secret_ciphertext: Vec<u8>,
) -> ProposalKind {
    ProposalKind::RegisterDevice {
        device_id,
        device_name,
        device_type,
        secret_ciphertext,
    }
}
