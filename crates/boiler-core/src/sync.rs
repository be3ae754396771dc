use crate::telemetry::Heating;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// What the loop last saw, for readers on other threads (metrics).
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorSnapshot {
    pub timestamp_ms: u64,
    pub iterations: u64,
    pub pump_active: bool,
    pub shot_ms: u64,
    pub last_shot_ms: Option<u64>,
    pub steam_temp: Option<i32>,
    pub temp_target: Option<i32>,
    pub boiler_temp: Option<i32>,
    pub counter: Option<i32>,
    pub heating: Heating,
    pub online: bool,
    pub pump_transitions: u64,
    pub lines_accepted: u64,
    pub lines_rejected: u64,
    pub lines_discarded: u64,
    pub telemetry_events: u64,
    pub heartbeats: u64,
    pub reconnects: u64,
}

pub struct SnapshotExchange {
    latest: Mutex<MonitorSnapshot>,
    session_restarts: AtomicU64,
}

impl SnapshotExchange {
    pub fn new() -> Self {
        Self {
            latest: Mutex::new(MonitorSnapshot::default()),
            session_restarts: AtomicU64::new(0),
        }
    }

    /// Called by the loop every iteration.
    pub fn publish(&self, snapshot: MonitorSnapshot) {
        let mut latest = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *latest = snapshot;
    }

    pub fn read(&self) -> MonitorSnapshot {
        *self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Called by the supervisor.
    pub fn note_restart(&self) {
        self.session_restarts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_restarts(&self) -> u64 {
        self.session_restarts.load(Ordering::Relaxed)
    }
}

impl Default for SnapshotExchange {
    fn default() -> Self {
        Self::new()
    }
}
