// Path: crates/attest-telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram_vec, register_int_counter,
    register_int_counter_vec, Gauge, HistogramVec, IntCounter, IntCounterVec,
};

static AUTH_ATTEMPTS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static REGISTRATIONS_TOTAL: OnceCell<IntCounter> = OnceCell::new();

static BATCH_SIZE: OnceCell<HistogramVec> = OnceCell::new();
static PENDING_DEPTH: OnceCell<Gauge> = OnceCell::new();
static BATCHES_CREATED_TOTAL: OnceCell<IntCounter> = OnceCell::new();

static RPC_CALLS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static RPC_LATENCY_SECONDS: OnceCell<HistogramVec> = OnceCell::new();
static ANCHOR_DISPATCH_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static MULTISIG_TRANSITIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static PRESENCE_TRANSITIONS_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

static EVENTS_PUBLISHED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static SUBSCRIBERS_DROPPED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static SUBSCRIBER_COUNT: OnceCell<Gauge> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Fetches a metric collector, panicking if `install()` was never called.
/// Intentional: a sink call before install indicates a startup ordering bug.
macro_rules! get_metric {
    ($metric:ident) => {
        $metric
            .get()
            .expect("prometheus sink not initialized; call attest_telemetry::prometheus::install() first")
    };
}

impl AuthMetricsSink for PrometheusSink {
    fn inc_auth_attempt(&self, outcome: &str) {
        get_metric!(AUTH_ATTEMPTS_TOTAL)
            .with_label_values(&[outcome])
            .inc();
    }
    fn inc_registration(&self) {
        get_metric!(REGISTRATIONS_TOTAL).inc();
    }
}

impl AnchorMetricsSink for PrometheusSink {
    fn observe_batch_size(&self, leaf_count: u32) {
        get_metric!(BATCH_SIZE)
            .with_label_values(&["leaves"])
            .observe(leaf_count as f64);
    }
    fn set_pending_depth(&self, depth: u64) {
        get_metric!(PENDING_DEPTH).set(depth as f64);
    }
    fn inc_batches_created(&self) {
        get_metric!(BATCHES_CREATED_TOTAL).inc();
    }
}

impl ChainMetricsSink for PrometheusSink {
    fn inc_rpc_call(&self, chain: &str, method: &str, result: &str) {
        get_metric!(RPC_CALLS_TOTAL)
            .with_label_values(&[chain, method, result])
            .inc();
    }
    fn observe_rpc_latency(&self, chain: &str, method: &str, secs: f64) {
        get_metric!(RPC_LATENCY_SECONDS)
            .with_label_values(&[chain, method])
            .observe(secs);
    }
    fn inc_anchor_dispatch(&self, chain: &str, status: &str) {
        get_metric!(ANCHOR_DISPATCH_TOTAL)
            .with_label_values(&[chain, status])
            .inc();
    }
}

impl MultisigMetricsSink for PrometheusSink {
    fn inc_transition(&self, to_state: &str) {
        get_metric!(MULTISIG_TRANSITIONS_TOTAL)
            .with_label_values(&[to_state])
            .inc();
    }
}

impl PresenceMetricsSink for PrometheusSink {
    fn inc_status_transition(&self, to_status: &str) {
        get_metric!(PRESENCE_TRANSITIONS_TOTAL)
            .with_label_values(&[to_status])
            .inc();
    }
}

impl EventMetricsSink for PrometheusSink {
    fn inc_published(&self, topic: &str) {
        get_metric!(EVENTS_PUBLISHED_TOTAL)
            .with_label_values(&[topic])
            .inc();
    }
    fn inc_subscriber_dropped(&self) {
        get_metric!(SUBSCRIBERS_DROPPED_TOTAL).inc();
    }
    fn set_subscriber_count(&self, count: u64) {
        get_metric!(SUBSCRIBER_COUNT).set(count as f64);
    }
}

/// Registers every collector and returns a static reference usable with
/// [`crate::sinks::SINK`]. Must be called exactly once at process startup,
/// before any of the `*_metrics()` accessors are used.
#[allow(clippy::expect_used)]
pub fn install() -> Result<&'static dyn MetricsSink, prometheus::Error> {
    AUTH_ATTEMPTS_TOTAL
        .set(register_int_counter_vec!(
            "attest_auth_attempts_total",
            "Total authentication attempts, labeled by outcome.",
            &["outcome"]
        )?)
        .expect("static already initialized");
    REGISTRATIONS_TOTAL
        .set(register_int_counter!(
            "attest_registrations_total",
            "Total device registrations."
        )?)
        .expect("static already initialized");
    BATCH_SIZE
        .set(register_histogram_vec!(
            "attest_anchor_batch_size",
            "Leaf count of assembled anchor batches.",
            &["dimension"],
            exponential_buckets(1.0, 2.0, 12)?
        )?)
        .expect("static already initialized");
    PENDING_DEPTH
        .set(register_gauge!(
            "attest_anchor_pending_depth",
            "Current number of pending data items buffered for anchoring."
        )?)
        .expect("static already initialized");
    BATCHES_CREATED_TOTAL
        .set(register_int_counter!(
            "attest_anchor_batches_created_total",
            "Total Merkle batches assembled."
        )?)
        .expect("static already initialized");
    RPC_CALLS_TOTAL
        .set(register_int_counter_vec!(
            "attest_chain_rpc_calls_total",
            "Total chain RPC calls, labeled by chain, method, and result.",
            &["chain", "method", "result"]
        )?)
        .expect("static already initialized");
    RPC_LATENCY_SECONDS
        .set(register_histogram_vec!(
            "attest_chain_rpc_latency_seconds",
            "Latency of chain RPC calls.",
            &["chain", "method"],
            exponential_buckets(0.01, 2.0, 14)?
        )?)
        .expect("static already initialized");
    ANCHOR_DISPATCH_TOTAL
        .set(register_int_counter_vec!(
            "attest_crosschain_dispatch_total",
            "Total cross-chain anchor dispatch outcomes, labeled by chain and status.",
            &["chain", "status"]
        )?)
        .expect("static already initialized");
    MULTISIG_TRANSITIONS_TOTAL
        .set(register_int_counter_vec!(
            "attest_multisig_transitions_total",
            "Total multi-sig proposal state transitions, labeled by destination state.",
            &["to_state"]
        )?)
        .expect("static already initialized");
    PRESENCE_TRANSITIONS_TOTAL
        .set(register_int_counter_vec!(
            "attest_presence_transitions_total",
            "Total presence status transitions, labeled by destination status.",
            &["to_status"]
        )?)
        .expect("static already initialized");
    EVENTS_PUBLISHED_TOTAL
        .set(register_int_counter_vec!(
            "attest_events_published_total",
            "Total events published, labeled by topic.",
            &["topic"]
        )?)
        .expect("static already initialized");
    SUBSCRIBERS_DROPPED_TOTAL
        .set(register_int_counter!(
            "attest_events_subscribers_dropped_total",
            "Total subscribers disconnected for exceeding the bounded send queue."
        )?)
        .expect("static already initialized");
    SUBSCRIBER_COUNT
        .set(register_gauge!(
            "attest_events_subscriber_count",
            "Current number of connected event subscribers."
        )?)
        .expect("static already initialized");

    static SINK: PrometheusSink = PrometheusSink;
    Ok(&SINK)
}
