// Path: crates/attest-telemetry/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! # Attest Kernel Telemetry
//!
//! Observability infrastructure shared by every service in the kernel:
//! structured logging initialization, a Prometheus metrics endpoint, and
//! abstract sinks that decouple domain crates from the concrete metrics
//! backend. Grounded on the teacher's `ioi-telemetry` crate.

/// A lightweight HTTP server exposing `/metrics` and `/healthz`.
pub mod http;
/// The initialization routine for global structured logging.
pub mod init;
/// The concrete Prometheus-backed `MetricsSink` implementation.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) defining the contract for metrics reporting.
pub mod sinks;
/// A simple RAII timer for measuring the duration of a scope.
pub mod time;

pub use sinks::{anchor_metrics, auth_metrics, chain_metrics, event_metrics, multisig_metrics, presence_metrics};
