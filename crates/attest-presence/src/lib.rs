// Path: crates/attest-presence/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::indexing_slicing
    )
)]

//! The presence tracker (C9, `spec.md` §4.9): heartbeat ingest and a
//! liveness sweep, with status always recomputed from `last_heartbeat_at`
//! and the clock rather than cached.
//!
//! Presence owns its state directly (`spec.md` §3 ownership note) and is
//! not routed through `attest-persistence` — it has no durability
//! requirement, only liveness at the current moment.

use attest_events::EventBus;
use attest_types::ids::DeviceId;
use attest_types::model::{PresenceRecord, PresenceStatus};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

/// Windows used to classify a device's liveness from the age of its last
/// heartbeat (`spec.md` §3 "PresenceRecord").
#[derive(Debug, Clone, Copy)]
pub struct PresenceWindows {
    pub live_window: Duration,
    pub idle_window: Duration,
}

impl Default for PresenceWindows {
    fn default() -> Self {
        Self {
            live_window: Duration::from_secs(60),
            idle_window: Duration::from_secs(300),
        }
    }
}

fn classify(age_secs: u64, windows: &PresenceWindows) -> PresenceStatus {
    if age_secs <= windows.live_window.as_secs() {
        PresenceStatus::Online
    } else if age_secs <= windows.idle_window.as_secs() {
        PresenceStatus::Idle
    } else {
        PresenceStatus::Offline
    }
}

/// The presence tracker: an in-memory map of `device_id -> last_heartbeat_at`
/// plus a recomputed-on-read status.
pub struct PresenceTracker {
    last_heartbeat: DashMap<DeviceId, u64>,
    last_known_status: DashMap<DeviceId, PresenceStatus>,
    windows: PresenceWindows,
    events: Arc<EventBus>,
}

impl PresenceTracker {
    pub fn new(windows: PresenceWindows, events: Arc<EventBus>) -> Self {
        Self {
            last_heartbeat: DashMap::new(),
            last_known_status: DashMap::new(),
            windows,
            events,
        }
    }

    /// Records a heartbeat for `device_id` at `now`. Emits
    /// `DEVICE_STATUS_CHANGE` if the device was previously OFFLINE or IDLE
    /// and a fresh heartbeat makes it ONLINE again (`spec.md` §4.9).
    ///
    /// A `now` that does not strictly exceed the stored `last_heartbeat_at`
    /// is ignored entirely: no mutation, metric, or event (`spec.md` §8
    /// testable property: heartbeats only ever advance the clock).
    pub fn heartbeat(&self, device_id: DeviceId, now: u64) {
        if let Some(existing) = self.last_heartbeat.get(&device_id) {
            if now <= *existing {
                return;
            }
        }

        let was_offline_or_idle = self
            .last_known_status
            .get(&device_id)
            .map(|s| matches!(*s, PresenceStatus::Offline | PresenceStatus::Idle))
            .unwrap_or(true);

        self.last_heartbeat.insert(device_id.clone(), now);
        self.last_known_status.insert(device_id.clone(), PresenceStatus::Online);

        attest_telemetry::presence_metrics().inc_status_transition("ONLINE");

        if was_offline_or_idle {
            self.events.publish(
                "DEVICE_STATUS_CHANGE",
                attest_events::device_topic_payload(
                    &device_id,
                    serde_json::json!({"status": "ONLINE"}),
                ),
                now,
            );
        }
    }

    /// The device's current status, computed live from `now`.
    pub fn status(&self, device_id: &DeviceId, now: u64) -> Option<PresenceRecord> {
        let last_heartbeat_at = *self.last_heartbeat.get(device_id)?;
        let age = now.saturating_sub(last_heartbeat_at);
        Some(PresenceRecord {
            device_id: device_id.clone(),
            last_heartbeat_at,
            status: classify(age, &self.windows),
        })
    }

    /// Every known device's current status, computed live from `now`.
    pub fn list_statuses(&self, now: u64) -> Vec<PresenceRecord> {
        self.last_heartbeat
            .iter()
            .map(|entry| {
                let device_id = entry.key().clone();
                let last_heartbeat_at = *entry.value();
                let age = now.saturating_sub(last_heartbeat_at);
                PresenceRecord {
                    device_id,
                    last_heartbeat_at,
                    status: classify(age, &self.windows),
                }
            })
            .collect()
    }

    /// Recomputes status for every known device and emits
    /// `DEVICE_STATUS_CHANGE` for each one whose class boundary was
    /// crossed since the last sweep (`spec.md` §4.9). Intended to be
    /// called at a fixed cadence (default 15s) by a background task.
    pub fn sweep(&self, now: u64) {
        let snapshot: Vec<(DeviceId, u64)> = self
            .last_heartbeat
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();

        for (device_id, last_heartbeat_at) in snapshot {
            let age = now.saturating_sub(last_heartbeat_at);
            let new_status = classify(age, &self.windows);
            let prev_status = self.last_known_status.get(&device_id).map(|s| *s);

            if prev_status != Some(new_status) {
                self.last_known_status.insert(device_id.clone(), new_status);
                attest_telemetry::presence_metrics().inc_status_transition(status_label(new_status));
                self.events.publish(
                    "DEVICE_STATUS_CHANGE",
                    attest_events::device_topic_payload(
                        &device_id,
                        serde_json::json!({"status": status_label(new_status)}),
                    ),
                    now,
                );
            }
        }
    }
}

fn status_label(status: PresenceStatus) -> &'static str {
    match status {
        PresenceStatus::Online => "ONLINE",
        PresenceStatus::Idle => "IDLE",
        PresenceStatus::Offline => "OFFLINE",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> PresenceTracker {
        PresenceTracker::new(PresenceWindows::default(), Arc::new(EventBus::new(16, 8)))
    }

    #[test]
    fn status_is_online_right_after_heartbeat() {
        let tracker = tracker();
        let device_id = DeviceId::new("dev-1").unwrap();
        tracker.heartbeat(device_id.clone(), 1_000);
        let record = tracker.status(&device_id, 1_010).unwrap();
        assert_eq!(record.status, PresenceStatus::Online);
    }

    #[test]
    fn status_degrades_to_idle_then_offline_purely_from_clock() {
        let tracker = tracker();
        let device_id = DeviceId::new("dev-1").unwrap();
        tracker.heartbeat(device_id.clone(), 1_000);

        let idle = tracker.status(&device_id, 1_000 + 120).unwrap();
        assert_eq!(idle.status, PresenceStatus::Idle);

        let offline = tracker.status(&device_id, 1_000 + 400).unwrap();
        assert_eq!(offline.status, PresenceStatus::Offline);
    }

    #[test]
    fn stale_heartbeat_is_ignored() {
        let tracker = tracker();
        let device_id = DeviceId::new("dev-1").unwrap();
        tracker.heartbeat(device_id.clone(), 1_000);
        tracker.heartbeat(device_id.clone(), 500);

        let record = tracker.status(&device_id, 1_000).unwrap();
        assert_eq!(record.last_heartbeat_at, 1_000);
    }

    #[test]
    fn unknown_device_has_no_status() {
        let tracker = tracker();
        let device_id = DeviceId::new("dev-ghost").unwrap();
        assert!(tracker.status(&device_id, 1_000).is_none());
    }

    #[test]
    fn sweep_emits_status_change_on_boundary_cross() {
        let tracker = tracker();
        let device_id = DeviceId::new("dev-1").unwrap();
        tracker.heartbeat(device_id.clone(), 1_000);

        tracker.sweep(1_000 + 120);
        let events = tracker.events.recent_events(10);
        assert!(events.iter().any(|e| e.kind == "DEVICE_STATUS_CHANGE"
            && e.payload["status"] == "IDLE"));
    }

    #[test]
    fn list_statuses_covers_every_known_device() {
        let tracker = tracker();
        tracker.heartbeat(DeviceId::new("dev-1").unwrap(), 1_000);
        tracker.heartbeat(DeviceId::new("dev-2").unwrap(), 1_000);
        let statuses = tracker.list_statuses(1_000);
        assert_eq!(statuses.len(), 2);
    }
}
