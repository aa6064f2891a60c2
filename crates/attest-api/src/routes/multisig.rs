// Path: crates/attest-api/src/routes/multisig.rs
//! `/multisig/*` handlers (`spec.md` §6, §4.8).

use crate::error::AppError;
use crate::routes::devices::register_proposal_kind;
use crate::secret_cipher;
use crate::state::AppState;
use attest_types::ids::{DeviceId, ProposalId};
use attest_types::model::{ProposalKind, ProposalState, Signer};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ProposeRegisterDeviceRequest {
    pub device_id: String,
    pub device_name: String,
    pub device_type: String,
    /// Hex-encoded device secret; encrypted server-side before it is
    /// persisted as `secret_ciphertext` (`spec.md` §4.8, never stored in
    /// the clear inside a proposal).
    pub secret: String,
    pub required_approvals: u32,
    pub proposer: String,
}

#[derive(Serialize)]
pub struct ProposeResponse {
    pub proposal_id: String,
    pub expires_at: u64,
}

pub async fn propose(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProposeRegisterDeviceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let device_id = DeviceId::new(req.device_id).map_err(AppError::BadRequest)?;
    let secret = hex::decode(&req.secret).map_err(|e| AppError::BadRequest(format!("secret: {e}")))?;
    let ciphertext = secret_cipher::encrypt(&state.secret_cipher_key, &secret);
    let kind = register_proposal_kind(device_id, req.device_name, req.device_type, ciphertext);

    let now = state.now();
    let proposal = state
        .multisig
        .propose(kind, req.required_approvals, req.proposer, now)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProposeResponse {
            proposal_id: proposal.proposal_id.to_string(),
            expires_at: proposal.expires_at,
        }),
    ))
}

#[derive(Deserialize)]
pub struct ApprovalRequest {
    pub proposal_id: String,
    pub signer_id: String,
    /// Hex-encoded signature over `attest_multisig::approval_message`.
    pub signature: String,
}

#[derive(Serialize)]
pub struct FsmResponse {
    pub state: ProposalState,
}

pub async fn approve(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApprovalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let proposal_id = ProposalId::from_str(&req.proposal_id).map_err(AppError::BadRequest)?;
    let signature = hex::decode(&req.signature).map_err(|e| AppError::BadRequest(format!("signature: {e}")))?;
    let now = state.now();
    let proposal = state.multisig.approve(proposal_id, &req.signer_id, &signature, now).await?;
    Ok(Json(FsmResponse { state: proposal.state }))
}

pub async fn reject(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ApprovalRequest>,
) -> Result<impl IntoResponse, AppError> {
    let proposal_id = ProposalId::from_str(&req.proposal_id).map_err(AppError::BadRequest)?;
    let signature = hex::decode(&req.signature).map_err(|e| AppError::BadRequest(format!("signature: {e}")))?;
    let now = state.now();
    let proposal = state.multisig.reject(proposal_id, &req.signer_id, &signature, now).await?;
    Ok(Json(FsmResponse { state: proposal.state }))
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    pub executed: bool,
    pub artifact: Option<String>,
}

pub async fn execute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let proposal_id = ProposalId::from_str(&id).map_err(AppError::BadRequest)?;
    let now = state.now();
    let proposal = state.multisig.execute(proposal_id, now).await?;
    Ok(Json(ExecuteResponse {
        executed: true,
        artifact: proposal.executed_artifact,
    }))
}

#[derive(Serialize)]
pub struct ProposalView {
    pub proposal_id: String,
    pub kind: ProposalKind,
    pub required_approvals: u32,
    pub approvals: Vec<String>,
    pub rejections: Vec<String>,
    pub state: ProposalState,
    pub created_at: u64,
    pub expires_at: u64,
    pub proposer: String,
    pub executed_artifact: Option<String>,
}

impl From<attest_types::model::MultiSigProposal> for ProposalView {
    fn from(p: attest_types::model::MultiSigProposal) -> Self {
        Self {
            proposal_id: p.proposal_id.to_string(),
            kind: p.kind,
            required_approvals: p.required_approvals,
            approvals: p.approvals.into_iter().collect(),
            rejections: p.rejections.into_iter().collect(),
            state: p.state,
            created_at: p.created_at,
            expires_at: p.expires_at,
            proposer: p.proposer,
            executed_artifact: p.executed_artifact,
        }
    }
}

pub async fn list_proposals(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let proposals = state.store.list_proposals().await?;
    let views: Vec<ProposalView> = proposals.into_iter().map(ProposalView::from).collect();
    Ok(Json(views))
}

pub async fn list_signers(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let signers: Vec<Signer> = state.store.list_all_signers().await?;
    Ok(Json(signers))
}
