// Path: crates/attest-api/src/error.rs
//! Uniform error-to-HTTP mapping (`spec.md` §4.12, §7 taxonomy), grounded
//! on the teacher's `http-rpc-gateway::AppError` (one enum, one
//! `IntoResponse` impl, never a per-handler match on status codes).

use attest_types::error::{AttestError, ErrorCode, PersistError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Every error an `attest-api` handler can return.
#[derive(Debug)]
pub enum AppError {
    /// An engine-crate error, already carrying a stable wire code.
    Attest(AttestError),
    /// A request did not parse into the shape a handler expects.
    BadRequest(String),
}

impl From<AttestError> for AppError {
    fn from(e: AttestError) -> Self {
        Self::Attest(e)
    }
}

/// Lets handlers `?`-propagate a bare `Store` call without an explicit
/// `AttestError::from` at every call site.
impl From<PersistError> for AppError {
    fn from(e: PersistError) -> Self {
        Self::Attest(AttestError::from(e))
    }
}

/// Maps a stable wire code to its HTTP status, per `spec.md` §7.
fn status_for_code(code: &str) -> StatusCode {
    match code {
        "UNKNOWN_DEVICE" | "NOT_FOUND" | "BATCH_NOT_FOUND" | "LEAF_NOT_FOUND" | "UNKNOWN_CHAIN" => {
            StatusCode::NOT_FOUND
        }
        "INACTIVE_DEVICE" | "FORBIDDEN" => StatusCode::FORBIDDEN,
        "BAD_PROOF" | "STALE_PROOF" | "REPLAY" | "UNAUTHENTICATED" => StatusCode::UNAUTHORIZED,
        "DEVICE_EXISTS" | "CONFLICT_STATE" | "PERSIST_CONFLICT" | "NO_PENDING" => StatusCode::CONFLICT,
        "MERKLE_EMPTY_LEAF_SET" | "VALIDATION" => StatusCode::BAD_REQUEST,
        "RPC_TRANSIENT" => StatusCode::SERVICE_UNAVAILABLE,
        "RPC_PERMANENT" => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, "VALIDATION", message),
            AppError::Attest(e) => {
                let code = e.code();
                let status = status_for_code(code);
                if status == StatusCode::INTERNAL_SERVER_ERROR {
                    tracing::error!(error = %e, code, "internal error serving request");
                    (status, code, "an internal error occurred".to_string())
                } else {
                    (status, code, e.to_string())
                }
            }
        };
        let body = Json(serde_json::json!({
            "error": { "code": code, "message": message }
        }));
        (status, body).into_response()
    }
}
