// Path: crates/attest-telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling domain crates
//! from the concrete Prometheus backend (`crate::prometheus`).

use once_cell::sync::OnceCell;

/// A no-op sink used in tests or when telemetry has not been installed.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the installed `MetricsSink`.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// The union of every domain sink trait; one object implements them all.
pub trait MetricsSink:
    AuthMetricsSink + AnchorMetricsSink + ChainMetricsSink + MultisigMetricsSink + PresenceMetricsSink + EventMetricsSink + Send + Sync + std::fmt::Debug
{
}

/// Returns the installed authentication metrics sink, or a no-op.
pub fn auth_metrics() -> &'static dyn AuthMetricsSink {
    SINK.get().copied().map_or(&NOP_SINK, |s| s as &dyn AuthMetricsSink)
}

/// Returns the installed anchor pipeline metrics sink, or a no-op.
pub fn anchor_metrics() -> &'static dyn AnchorMetricsSink {
    SINK.get().copied().map_or(&NOP_SINK, |s| s as &dyn AnchorMetricsSink)
}

/// Returns the installed chain client / dispatcher metrics sink, or a no-op.
pub fn chain_metrics() -> &'static dyn ChainMetricsSink {
    SINK.get().copied().map_or(&NOP_SINK, |s| s as &dyn ChainMetricsSink)
}

/// Returns the installed multi-sig FSM metrics sink, or a no-op.
pub fn multisig_metrics() -> &'static dyn MultisigMetricsSink {
    SINK.get().copied().map_or(&NOP_SINK, |s| s as &dyn MultisigMetricsSink)
}

/// Returns the installed presence tracker metrics sink, or a no-op.
pub fn presence_metrics() -> &'static dyn PresenceMetricsSink {
    SINK.get().copied().map_or(&NOP_SINK, |s| s as &dyn PresenceMetricsSink)
}

/// Returns the installed event bus metrics sink, or a no-op.
pub fn event_metrics() -> &'static dyn EventMetricsSink {
    SINK.get().copied().map_or(&NOP_SINK, |s| s as &dyn EventMetricsSink)
}

/// Metrics for the ZKP authentication protocol (C2).
pub trait AuthMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments authentication attempts, labeled by outcome
    /// (`ok`, `bad_proof`, `stale_proof`, `replay`, `unknown_device`, `inactive_device`).
    fn inc_auth_attempt(&self, outcome: &str);
    /// Increments device registrations.
    fn inc_registration(&self);
}
impl AuthMetricsSink for NopSink {
    fn inc_auth_attempt(&self, _outcome: &str) {}
    fn inc_registration(&self) {}
}

/// Metrics for the anchor pipeline (C6).
pub trait AnchorMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the leaf count of a newly assembled batch.
    fn observe_batch_size(&self, leaf_count: u32);
    /// Increments the count of pending data currently buffered.
    fn set_pending_depth(&self, depth: u64);
    /// Increments batches assembled.
    fn inc_batches_created(&self);
}
impl AnchorMetricsSink for NopSink {
    fn observe_batch_size(&self, _leaf_count: u32) {}
    fn set_pending_depth(&self, _depth: u64) {}
    fn inc_batches_created(&self) {}
}

/// Metrics for chain clients and the cross-chain dispatcher (C4, C5, C7).
pub trait ChainMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments RPC calls, labeled by chain, method, and result.
    fn inc_rpc_call(&self, chain: &str, method: &str, result: &str);
    /// Observes RPC call latency in seconds, labeled by chain and method.
    fn observe_rpc_latency(&self, chain: &str, method: &str, secs: f64);
    /// Increments anchor dispatch outcomes, labeled by chain and status.
    fn inc_anchor_dispatch(&self, chain: &str, status: &str);
}
impl ChainMetricsSink for NopSink {
    fn inc_rpc_call(&self, _chain: &str, _method: &str, _result: &str) {}
    fn observe_rpc_latency(&self, _chain: &str, _method: &str, _secs: f64) {}
    fn inc_anchor_dispatch(&self, _chain: &str, _status: &str) {}
}

/// Metrics for the multi-sig FSM (C8).
pub trait MultisigMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments proposal transitions, labeled by `to` state.
    fn inc_transition(&self, to_state: &str);
}
impl MultisigMetricsSink for NopSink {
    fn inc_transition(&self, _to_state: &str) {}
}

/// Metrics for the presence tracker (C9).
pub trait PresenceMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments status transitions, labeled by `to` status.
    fn inc_status_transition(&self, to_status: &str);
}
impl PresenceMetricsSink for NopSink {
    fn inc_status_transition(&self, _to_status: &str) {}
}

/// Metrics for the event bus (C10).
pub trait EventMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments events published, labeled by topic.
    fn inc_published(&self, topic: &str);
    /// Increments subscribers disconnected for exceeding `MAX_SUB_QUEUE`.
    fn inc_subscriber_dropped(&self);
    /// Sets the current number of connected subscribers.
    fn set_subscriber_count(&self, count: u64);
}
impl EventMetricsSink for NopSink {
    fn inc_published(&self, _topic: &str) {}
    fn inc_subscriber_dropped(&self) {}
    fn set_subscriber_count(&self, _count: u64) {}
}
