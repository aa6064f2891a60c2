// Path: crates/attest-api/src/routes/merkle.rs
//! `/merkle/*` handlers (`spec.md` §6).

use crate::error::AppError;
use crate::state::AppState;
use attest_types::ids::{BatchId, Digest};
use attest_types::model::{AnchorStatus, ChainAnchor, MerkleBatch};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::str::FromStr;

#[derive(Deserialize)]
pub struct AnchorRequest {
    #[serde(default)]
    pub metadata: String,
    /// Chains to dispatch to; defaults to every chain the registry knows
    /// about if omitted.
    #[serde(default)]
    pub chains: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct DispatchedEntry {
    pub chain: String,
    pub tx_hash: Option<String>,
    pub status: AnchorStatus,
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct AnchorResponse {
    pub batch_id: BatchId,
    pub leaf_count: u32,
    pub root: String,
    pub dispatched: Vec<DispatchedEntry>,
}

pub async fn anchor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AnchorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let now = state.now();
    let batch = state.anchor.assemble_batch(now, req.metadata).await?;
    state.events.publish(
        "BATCH_CREATED",
        serde_json::json!({"batch_id": batch.batch_id, "leaf_count": batch.leaf_count, "root": batch.root.to_string()}),
        now,
    );

    let chains = req.chains.unwrap_or_else(|| state.chains.list().into_iter().map(|c| c.name).collect());
    let dispatched = if chains.is_empty() {
        Vec::new()
    } else {
        state
            .dispatcher
            .dispatch(batch.batch_id, batch.root, batch.leaf_count as u64, batch.metadata.clone(), &chains, now)
            .await
    };

    Ok(Json(AnchorResponse {
        batch_id: batch.batch_id,
        leaf_count: batch.leaf_count,
        root: batch.root.to_string(),
        dispatched: dispatched
            .into_iter()
            .map(|o| DispatchedEntry {
                chain: o.chain,
                tx_hash: o.tx_hash.map(|h| h.to_string()),
                status: o.status,
                error: o.error,
            })
            .collect(),
    }))
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    pub batch_id: BatchId,
    pub leaf_hash: String,
    pub proof: Vec<attest_merkle::ProofStep>,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
}

pub async fn verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let leaf_hash = Digest::from_str(&req.leaf_hash).map_err(AppError::BadRequest)?;
    let valid = state.anchor.verify_inclusion(req.batch_id, leaf_hash, &req.proof).await?;
    Ok(Json(VerifyResponse { valid }))
}

#[derive(Serialize)]
pub struct BatchView {
    pub batch_id: BatchId,
    pub leaf_count: u32,
    pub root: String,
    pub created_at: u64,
    pub metadata: String,
    pub anchors: BTreeMap<String, ChainAnchor>,
}

impl From<MerkleBatch> for BatchView {
    fn from(b: MerkleBatch) -> Self {
        Self {
            batch_id: b.batch_id,
            leaf_count: b.leaf_count,
            root: b.root.to_string(),
            created_at: b.created_at,
            metadata: b.metadata,
            anchors: b.anchors,
        }
    }
}

pub async fn list_batches(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let batches = state.store.list_batches().await?;
    let views: Vec<BatchView> = batches.into_iter().map(BatchView::from).collect();
    Ok(Json(views))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<BatchId>,
) -> Result<impl IntoResponse, AppError> {
    let batch = state.store.get_batch(id).await?;
    Ok(Json(BatchView::from(batch)))
}
