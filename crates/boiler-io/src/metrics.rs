//! Prometheus metrics for the boiler monitor.
//!
//! Counters follow the monitoring loop; gauges mirror the machine state and
//! read NaN while a value is unknown.

use boiler_core::tags;
use prometheus::{Encoder, Gauge, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder};
use std::sync::LazyLock;
use std::thread;
use tiny_http::{Header, Response, Server};

/// Global metrics registry
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

fn counter(name: &str, help: &str) -> IntCounter {
    let counter = IntCounter::new(name, help).unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
}

fn gauge(tag: tags::Tag) -> Gauge {
    let gauge = Gauge::new(tag.metric, tag.help).unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
}

// ============================================================================
// Loop Metrics
// ============================================================================

pub static LOOP_ITERATIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_loop_iterations_total",
        "Monitoring loop iterations executed",
    )
});

pub static PUMP_TRANSITIONS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_pump_transitions_total",
        "Debounced pump on/off transitions",
    )
});

pub static LINES_ACCEPTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_telemetry_lines_accepted_total",
        "Telemetry lines decoded with every field valid",
    )
});

pub static LINES_REJECTED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_telemetry_lines_rejected_total",
        "Telemetry lines with at least one invalid field",
    )
});

pub static LINES_DISCARDED: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_telemetry_lines_discarded_total",
        "Empty or unreadable telemetry lines",
    )
});

pub static SESSION_RESTARTS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_session_restarts_total",
        "Monitoring sessions restarted after a fatal error",
    )
});

/// Shot durations with the debounce hold taken out
pub static SHOT_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    let histogram = Histogram::with_opts(
        HistogramOpts::new(
            "boiler_shot_duration_seconds",
            "Distribution of completed shot durations",
        )
        .buckets(vec![5.0, 10.0, 15.0, 20.0, 25.0, 30.0, 35.0, 45.0, 60.0]),
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

// ============================================================================
// Bus Metrics
// ============================================================================

pub static TELEMETRY_PUBLISHES: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_telemetry_publishes_total",
        "Telemetry snapshots published on the bus",
    )
});

pub static HEARTBEATS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter("boiler_bus_heartbeats_total", "Bus keepalive checks sent")
});

pub static BUS_RECONNECTS: LazyLock<IntCounter> = LazyLock::new(|| {
    counter(
        "boiler_bus_reconnects_total",
        "Reconnect attempts after a failed bus operation",
    )
});

// ============================================================================
// Machine State Metrics
// ============================================================================

pub static STEAM_TEMP: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::STEAM_TEMP));
pub static TEMP_TARGET: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::TEMP_TARGET));
pub static BOILER_TEMP: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::BOILER_TEMP));
pub static COUNTER: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::COUNTER));
pub static HEATING: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::HEATING));
pub static PUMP_ACTIVE: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::PUMP_ACTIVE));
pub static LAST_SHOT_SECONDS: LazyLock<Gauge> = LazyLock::new(|| gauge(tags::LAST_SHOT_SECONDS));

/// Controller link status (1 = telemetry known, 0 = offline)
pub static CONTROLLER_ONLINE: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        "boiler_controller_online",
        "Boiler controller telemetry status (1=online, 0=offline)",
    )
    .unwrap();
    REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Metrics HTTP Server
// ============================================================================

fn render_metrics() -> Result<Vec<u8>, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(buffer)
}

/// Start the metrics HTTP server on the given address.
/// Returns a join handle for the server thread.
pub fn serve_metrics(bind_addr: String) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let server = match Server::http(&bind_addr) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("Failed to start metrics server on {}: {}", bind_addr, e);
                return;
            }
        };

        tracing::info!("Metrics server listening on http://{}/metrics", bind_addr);

        for request in server.incoming_requests() {
            let response = match request.url() {
                "/metrics" => match render_metrics() {
                    Ok(buffer) => {
                        let mut response = Response::from_data(buffer);
                        if let Ok(header) = Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/plain; version=0.0.4"[..],
                        ) {
                            response = response.with_header(header);
                        }
                        response
                    }
                    Err(e) => {
                        tracing::warn!("Failed to encode metrics: {}", e);
                        Response::from_string("Internal Server Error").with_status_code(500)
                    }
                },
                "/health" => Response::from_string("OK"),
                // Ready once the loop has run at least once
                "/ready" if LOOP_ITERATIONS.get() > 0 => Response::from_string("Ready"),
                "/ready" => Response::from_string("Not Ready").with_status_code(503),
                _ => Response::from_string("Not Found").with_status_code(404),
            };
            let _ = request.respond(response);
        }
    })
}

/// Initialize all metrics (forces lazy initialization)
pub fn init_metrics() {
    let _ = LOOP_ITERATIONS.get();
    let _ = PUMP_TRANSITIONS.get();
    let _ = LINES_ACCEPTED.get();
    let _ = LINES_REJECTED.get();
    let _ = LINES_DISCARDED.get();
    let _ = SESSION_RESTARTS.get();
    let _ = SHOT_DURATION_SECONDS.get_sample_count();
    let _ = TELEMETRY_PUBLISHES.get();
    let _ = HEARTBEATS.get();
    let _ = BUS_RECONNECTS.get();
    for gauge in [
        &*STEAM_TEMP,
        &*TEMP_TARGET,
        &*BOILER_TEMP,
        &*COUNTER,
        &*HEATING,
        &*LAST_SHOT_SECONDS,
    ] {
        gauge.set(f64::NAN);
    }
    PUMP_ACTIVE.set(0.0);
    CONTROLLER_ONLINE.set(0.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_exposes_state_gauges() {
        init_metrics();
        STEAM_TEMP.set(121.0);
        let text = String::from_utf8(render_metrics().unwrap()).unwrap();
        assert!(text.contains("boiler_steam_temperature_celsius 121"));
        assert!(text.contains("boiler_loop_iterations_total"));
        assert!(text.contains("boiler_controller_online"));
    }
}
