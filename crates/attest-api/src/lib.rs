// Path: crates/attest-api/src/lib.rs
#![forbid(unsafe_code)]

//! The HTTP/WebSocket façade (C12, `spec.md` §4.12): request/response
//! mapping over every engine crate behind one Axum router, grounded on
//! the teacher's `http-rpc-gateway` for its middleware stack, rate
//! limiter, and graceful-shutdown wiring.

pub mod error;
pub mod executors;
pub mod rate_limit;
pub mod routes;
pub mod secret_cipher;
pub mod state;

pub use error::AppError;
pub use state::AppState;

use anyhow::Result;
use attest_types::config::AttestConfig;
use axum::error_handling::HandleErrorLayer;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::{middleware, Router};
use rate_limit::IpLimiter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::{limit::ConcurrencyLimitLayer, load_shed::LoadShedLayer, timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{catch_panic::CatchPanicLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Small helper used by `HandleErrorLayer` to produce a structured
/// response for errors raised by the fallible middleware layers
/// (timeout, load-shed, concurrency limit) rather than by a handler.
async fn map_middleware_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(serde_json::json!({
                "error": { "code": "TIMEOUT", "message": "request timed out" }
            })),
        )
    } else if err.is::<tower::load_shed::error::Overloaded>() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "error": { "code": "OVERLOADED", "message": "server is overloaded" }
            })),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "error": { "code": "INTERNAL", "message": "an internal error occurred" }
            })),
        )
    }
}

/// Builds the full Axum router over `state`, with the same layered
/// tower stack (rate limit route-layer, then `HandleErrorLayer` wrapping
/// load-shed/concurrency-limit/timeout, then the infallible
/// trace/catch-panic/body-limit layers) the teacher's gateway uses.
pub fn router(state: Arc<AppState>, config: &AttestConfig) -> Router {
    let cidrs = rate_limit::parse_trusted_proxies(&config.trusted_proxies);
    let limiter = IpLimiter::new(config.rate_limit_rps, config.rate_limit_burst, cidrs);

    Router::new()
        .route("/devices/register", post(routes::devices::register))
        .route("/devices/authenticate", post(routes::devices::authenticate))
        .route("/devices/data", post(routes::devices::submit_data))
        .route("/devices", get(routes::devices::list))
        .route("/devices/:id", get(routes::devices::get))
        .route("/merkle/anchor", post(routes::merkle::anchor))
        .route("/merkle/verify", post(routes::merkle::verify))
        .route("/merkle/batches", get(routes::merkle::list_batches))
        .route("/merkle/batches/:id", get(routes::merkle::get_batch))
        .route("/cross-chain/anchor", post(routes::crosschain::anchor))
        .route("/cross-chain/status/:root", get(routes::crosschain::status_by_root))
        .route("/realtime/device/:id/heartbeat", post(routes::realtime::heartbeat))
        .route("/realtime/devices/status", get(routes::realtime::devices_status))
        .route("/realtime/events", get(routes::realtime::recent_events))
        .route("/ws/:client_id", get(routes::realtime::ws_handler))
        .route("/multisig/propose", post(routes::multisig::propose))
        .route("/multisig/approve", post(routes::multisig::approve))
        .route("/multisig/reject", post(routes::multisig::reject))
        .route("/multisig/execute/:id", post(routes::multisig::execute))
        .route("/multisig/proposals", get(routes::multisig::list_proposals))
        .route("/multisig/signers", get(routes::multisig::list_signers))
        .route_layer(middleware::from_fn_with_state(limiter.clone(), rate_limit::rate_limit_middleware))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(map_middleware_error))
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(config.concurrency_limit))
                .layer(TimeoutLayer::new(config.request_timeout)),
        )
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
}

/// Binds `config.listen_addr` and serves `router` until `shutdown_rx`
/// signals a graceful stop (`spec.md` §4.12 dataflow).
pub async fn serve(state: Arc<AppState>, config: &AttestConfig, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
    let app = router(state, config);
    let addr: SocketAddr = config.listen_addr.parse()?;
    tracing::info!(%addr, "attest-api listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            shutdown_rx.changed().await.ok();
            tracing::info!("attest-api shutting down gracefully");
        })
        .await?;

    Ok(())
}
