// Path: crates/attest-api/src/routes/crosschain.rs
//! `/cross-chain/*` handlers (`spec.md` §6).

use crate::error::AppError;
use crate::routes::merkle::DispatchedEntry;
use crate::state::AppState;
use attest_types::ids::{BatchId, Digest};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CrossChainAnchorRequest {
    pub batch_id: BatchId,
    pub chains: Vec<String>,
}

#[derive(Serialize)]
pub struct CrossChainAnchorResponse {
    pub batch_id: BatchId,
    pub dispatched: Vec<DispatchedEntry>,
}

pub async fn anchor(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CrossChainAnchorRequest>,
) -> Result<impl IntoResponse, AppError> {
    let batch = state.store.get_batch(req.batch_id).await?;
    let now = state.now();
    let dispatched = state
        .dispatcher
        .dispatch(batch.batch_id, batch.root, batch.leaf_count as u64, batch.metadata.clone(), &req.chains, now)
        .await;

    Ok(Json(CrossChainAnchorResponse {
        batch_id: batch.batch_id,
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

#[derive(Serialize)]
pub struct CrossChainStatusResponse {
    pub batch_id: BatchId,
    pub anchors: BTreeMap<String, attest_types::model::ChainAnchor>,
    pub available: bool,
}

pub async fn status_by_root(
    State(state): State<Arc<AppState>>,
    Path(root): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let root = Digest::from_str(&root).map_err(AppError::BadRequest)?;
    let batch = state.store.get_batch_by_root(root).await?;
    let status = state.dispatcher.sync_status(batch.batch_id).await?;
    Ok(Json(CrossChainStatusResponse {
        batch_id: status.batch_id,
        anchors: status.anchors,
        available: status.available,
    }))
}
