use boiler_core::{Heating, MonitorSnapshot, SnapshotExchange};
use boiler_io::metrics::{
    init_metrics, serve_metrics, BOILER_TEMP, BUS_RECONNECTS, CONTROLLER_ONLINE, COUNTER,
    HEARTBEATS, HEATING, LAST_SHOT_SECONDS, LINES_ACCEPTED, LINES_DISCARDED, LINES_REJECTED,
    LOOP_ITERATIONS, PUMP_ACTIVE, PUMP_TRANSITIONS, SESSION_RESTARTS, SHOT_DURATION_SECONDS,
    STEAM_TEMP, TELEMETRY_PUBLISHES, TEMP_TARGET,
};
use prometheus::IntCounter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::info;

const UPDATE_INTERVAL: Duration = Duration::from_millis(200);

pub fn init() {
    init_metrics();
}

pub fn start_metrics_server(addr: &Option<String>) -> Option<thread::JoinHandle<()>> {
    addr.as_ref().map(|addr| {
        info!(addr = %addr, "Starting metrics server");
        serve_metrics(addr.clone())
    })
}

/// Copies loop snapshots into the Prometheus metrics until `stop` is set.
pub fn start_metrics_updater(
    exchange: Arc<SnapshotExchange>,
    stop: Arc<AtomicBool>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut cursor = MetricsCursor::default();
        while !stop.load(Ordering::Relaxed) {
            cursor.record(&exchange.read(), exchange.session_restarts());
            thread::sleep(UPDATE_INTERVAL);
        }
        cursor.record(&exchange.read(), exchange.session_restarts());
    })
}

/// Last counter values seen, so only the increase is added.
#[derive(Debug, Default)]
struct MetricsCursor {
    iterations: u64,
    pump_transitions: u64,
    lines_accepted: u64,
    lines_rejected: u64,
    lines_discarded: u64,
    telemetry_events: u64,
    heartbeats: u64,
    reconnects: u64,
    restarts: u64,
    last_shot_ms: Option<u64>,
}

impl MetricsCursor {
    fn record(&mut self, snapshot: &MonitorSnapshot, restarts: u64) {
        advance(&LOOP_ITERATIONS, &mut self.iterations, snapshot.iterations);
        advance(&PUMP_TRANSITIONS, &mut self.pump_transitions, snapshot.pump_transitions);
        advance(&LINES_ACCEPTED, &mut self.lines_accepted, snapshot.lines_accepted);
        advance(&LINES_REJECTED, &mut self.lines_rejected, snapshot.lines_rejected);
        advance(&LINES_DISCARDED, &mut self.lines_discarded, snapshot.lines_discarded);
        advance(&TELEMETRY_PUBLISHES, &mut self.telemetry_events, snapshot.telemetry_events);
        advance(&HEARTBEATS, &mut self.heartbeats, snapshot.heartbeats);
        advance(&BUS_RECONNECTS, &mut self.reconnects, snapshot.reconnects);
        advance(&SESSION_RESTARTS, &mut self.restarts, restarts);

        STEAM_TEMP.set(gauge_value(snapshot.steam_temp));
        TEMP_TARGET.set(gauge_value(snapshot.temp_target));
        BOILER_TEMP.set(gauge_value(snapshot.boiler_temp));
        COUNTER.set(gauge_value(snapshot.counter));
        HEATING.set(match snapshot.heating {
            Heating::On => 1.0,
            Heating::Off => 0.0,
            Heating::Unknown => -1.0,
        });
        PUMP_ACTIVE.set(if snapshot.pump_active { 1.0 } else { 0.0 });
        CONTROLLER_ONLINE.set(if snapshot.online { 1.0 } else { 0.0 });

        if snapshot.last_shot_ms != self.last_shot_ms {
            if let Some(ms) = snapshot.last_shot_ms {
                let seconds = ms as f64 / 1_000.0;
                LAST_SHOT_SECONDS.set(seconds);
                SHOT_DURATION_SECONDS.observe(seconds);
            }
            self.last_shot_ms = snapshot.last_shot_ms;
        }
    }
}

fn advance(counter: &IntCounter, seen: &mut u64, current: u64) {
    if current > *seen {
        counter.inc_by(current - *seen);
        *seen = current;
    }
}

fn gauge_value(value: Option<i32>) -> f64 {
    value.map_or(f64::NAN, f64::from)
}
