//! Outbound events on the message bus.
//!
//! Telemetry is always sent as a full snapshot, so a subscriber never has to
//! assemble partial updates.

use crate::error::TransportError;
use crate::hal::BusClient;
use crate::state::{ChangeSet, MachineState};
use crate::tags;
use crate::timebase::{elapsed_ms, Millis};
use log::{debug, info, warn};
use serde::Serialize;

pub const PUMP_ON: &str = "on";
pub const PUMP_OFF: &str = "off";
pub const OFFLINE: &str = "offline";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub pump: String,
    pub telemetry: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self {
            pump: "boiler/pump".to_string(),
            telemetry: "boiler/telemetry".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryPayload {
    pub steam_temp: Option<i32>,
    pub temp_target: Option<i32>,
    pub boiler_temp: Option<i32>,
    pub heating: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<i32>,
}

/// What goes out on the telemetry topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryMessage {
    Offline,
    Snapshot(TelemetryPayload),
}

impl TelemetryMessage {
    pub fn from_state(state: &MachineState) -> Self {
        if state.is_offline() {
            return TelemetryMessage::Offline;
        }
        TelemetryMessage::Snapshot(TelemetryPayload {
            steam_temp: state.steam_temp,
            temp_target: state.temp_target,
            boiler_temp: state.boiler_temp,
            heating: state.heating.as_flag(),
            counter: state.counter,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            TelemetryMessage::Offline => Ok(OFFLINE.as_bytes().to_vec()),
            TelemetryMessage::Snapshot(payload) => serde_json::to_vec(payload),
        }
    }
}

#[derive(Clone, Default, Debug)]
pub struct PublishStats {
    pub pump_events: u64,
    pub telemetry_events: u64,
    pub heartbeats: u64,
    pub reconnects: u64,
}

pub struct Publisher<B: BusClient> {
    bus: B,
    topics: Topics,
    last_heartbeat_at: Millis,
    stats: PublishStats,
}

impl<B: BusClient> Publisher<B> {
    pub fn new(bus: B, topics: Topics, now: Millis) -> Self {
        Self {
            bus,
            topics,
            last_heartbeat_at: now,
            stats: PublishStats::default(),
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn stats(&self) -> &PublishStats {
        &self.stats
    }

    /// Restarts the keepalive interval, e.g. for a new session.
    pub fn reset_heartbeat(&mut self, now: Millis) {
        self.last_heartbeat_at = now;
    }

    /// Services the bus connection once per iteration.
    pub fn maintain(&mut self) -> Result<(), TransportError> {
        self.with_retry("poll", |bus| bus.poll())
    }

    /// Called once per debounced pump transition.
    pub fn publish_pump_change(&mut self, active: bool) -> Result<(), TransportError> {
        let payload = if active { PUMP_ON } else { PUMP_OFF };
        let topic = self.topics.pump.clone();
        self.with_retry("publish", |bus| bus.publish(&topic, payload.as_bytes()))?;
        self.stats.pump_events += 1;
        info!("pump {}", payload);
        Ok(())
    }

    /// Sends the full telemetry snapshot, or the offline marker. The payload
    /// depends on `state` alone; `changes` only feeds the debug log.
    pub fn publish_telemetry_change(
        &mut self,
        state: &MachineState,
        changes: &ChangeSet,
    ) -> Result<(), TransportError> {
        let topic = self.topics.telemetry.clone();
        let message = TelemetryMessage::from_state(state);
        let payload = message.encode().map_err(|e| TransportError::Publish {
            topic: topic.clone(),
            reason: e.to_string(),
        })?;

        let changed: Vec<&str> = changes.iter().map(|f| tags::for_field(f).key).collect();
        debug!(
            "telemetry changed [{}]: {}",
            changed.join(","),
            String::from_utf8_lossy(&payload)
        );

        self.with_retry("publish", |bus| bus.publish(&topic, &payload))?;
        self.stats.telemetry_events += 1;
        Ok(())
    }

    /// Pings the broker once `interval_ms` has passed since the last ping.
    /// Returns whether a ping was sent.
    pub fn heartbeat(&mut self, now: Millis, interval_ms: u32) -> Result<bool, TransportError> {
        if elapsed_ms(now, self.last_heartbeat_at) <= u64::from(interval_ms) {
            return Ok(false);
        }
        debug!("bus keepalive");
        self.with_retry("ping", |bus| bus.ping())?;
        self.last_heartbeat_at = now;
        self.stats.heartbeats += 1;
        Ok(true)
    }

    /// One reconnect and one retry; a second failure is returned.
    fn with_retry<T>(
        &mut self,
        op: &str,
        mut f: impl FnMut(&mut B) -> Result<T, TransportError>,
    ) -> Result<T, TransportError> {
        match f(&mut self.bus) {
            Ok(value) => Ok(value),
            Err(first) => {
                warn!("bus {} failed ({}), reconnecting", op, first);
                self.stats.reconnects += 1;
                self.bus.reconnect()?;
                f(&mut self.bus)
            }
        }
    }
}
