use crate::runtime::config::RuntimeConfig;
use crate::runtime::logging::init_tracing;
use crate::runtime::telemetry;
use boiler_core::hal_sim::{SimulatedBoiler, SimulatedPump};
use boiler_core::{
    BusClient, ControlConfig, DigitalInput, HalError, LineSource, Monitor, MonitorError,
    PollSchedule, Publisher, RestartPolicy, SnapshotExchange, Supervisor, SupervisorExit,
    TelemetryPort, TimeBase, Topics, TransportError,
};
use boiler_io::{LogBus, LogDisplay, MqttBus, MqttSettings, SerialLineSource, SysfsInput};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

enum PumpSwitch {
    Simulated(SimulatedPump),
    Gpio(SysfsInput),
}

impl DigitalInput for PumpSwitch {
    fn is_active(&mut self) -> Result<bool, HalError> {
        match self {
            Self::Simulated(p) => p.is_active(),
            Self::Gpio(p) => p.is_active(),
        }
    }
}

enum ControllerLink {
    Simulated(SimulatedBoiler),
    Serial(SerialLineSource),
}

impl LineSource for ControllerLink {
    fn bytes_available(&mut self) -> Result<usize, HalError> {
        match self {
            Self::Simulated(l) => l.bytes_available(),
            Self::Serial(l) => l.bytes_available(),
        }
    }

    fn clear_input(&mut self) -> Result<(), HalError> {
        match self {
            Self::Simulated(l) => l.clear_input(),
            Self::Serial(l) => l.clear_input(),
        }
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, HalError> {
        match self {
            Self::Simulated(l) => l.read_line(),
            Self::Serial(l) => l.read_line(),
        }
    }
}

enum Broker {
    Log(LogBus),
    Mqtt(Box<MqttBus>),
}

impl BusClient for Broker {
    fn poll(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Log(b) => b.poll(),
            Self::Mqtt(b) => b.poll(),
        }
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Log(b) => b.publish(topic, payload),
            Self::Mqtt(b) => b.publish(topic, payload),
        }
    }

    fn ping(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Log(b) => b.ping(),
            Self::Mqtt(b) => b.ping(),
        }
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        match self {
            Self::Log(b) => b.reconnect(),
            Self::Mqtt(b) => b.reconnect(),
        }
    }
}

type BoilerMonitor = Monitor<PumpSwitch, ControllerLink, Broker, LogDisplay>;

pub fn run_from_args() -> ExitCode {
    let config = match RuntimeConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}\n");
            RuntimeConfig::print_help();
            return ExitCode::from(2);
        }
    };
    if config.show_help {
        RuntimeConfig::print_help();
        return ExitCode::SUCCESS;
    }
    run(config)
}

pub fn run(config: RuntimeConfig) -> ExitCode {
    // Initialize tracing
    let _log_guard = init_tracing(config.json_logs, config.log_file.as_deref());

    // Initialize metrics
    telemetry::init();
    let _metrics_handle = telemetry::start_metrics_server(&config.metrics_addr);

    let timebase = TimeBase::new();
    let exchange = Arc::new(SnapshotExchange::new());
    let stop = Arc::new(AtomicBool::new(false));

    let control_config = control_config(&config);
    info!(
        hold_ms = control_config.hold_ms,
        stale_timeout_ms = control_config.stale_timeout_ms,
        keepalive_ms = control_config.heartbeat_interval_ms,
        field_layout = %config.field_layout,
        "Starting boiler monitor"
    );

    let mut monitor = match build_monitor(&config, control_config, timebase) {
        Ok(monitor) => monitor.with_exchange(Arc::clone(&exchange)),
        Err(e) => {
            error!(error = %e, "Failed to initialise devices");
            return ExitCode::FAILURE;
        }
    };

    let mut supervisor = Supervisor::new(RestartPolicy {
        countdown_ticks: config.restart_countdown_secs,
        tick: Duration::from_secs(1),
    })
    .with_exchange(Arc::clone(&exchange));
    if let Some(pin) = config.reset_gpio {
        info!(pin, "Reset button on GPIO");
        supervisor = supervisor.with_reset_input(Box::new(SysfsInput::active_low(pin)));
    }

    let updater_handle = telemetry::start_metrics_updater(Arc::clone(&exchange), Arc::clone(&stop));

    if let Some(seconds) = config.run_seconds {
        info!(seconds, "Running for limited duration");
        let stop_timer = Arc::clone(&stop);
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(seconds));
            stop_timer.store(true, Ordering::Relaxed);
        });
    }

    let exit = supervisor.supervise(&mut monitor, &timebase, &stop);
    stop.store(true, Ordering::Relaxed);
    let _ = updater_handle.join();

    let stats = monitor.stats();
    let publish = monitor.publisher().stats();
    info!(
        iterations = stats.iterations,
        pump_transitions = stats.pump_transitions,
        lines_accepted = stats.lines_accepted,
        lines_rejected = stats.lines_rejected,
        telemetry_events = publish.telemetry_events,
        reconnects = publish.reconnects,
        session_restarts = supervisor.restarts(),
        "Run complete"
    );

    match exit {
        SupervisorExit::Stopped => ExitCode::SUCCESS,
        SupervisorExit::HardReset(e) => {
            error!(error = %e, "Hard reset requested");
            ExitCode::FAILURE
        }
    }
}

fn control_config(config: &RuntimeConfig) -> ControlConfig {
    ControlConfig {
        hold_ms: config.hold_ms,
        stale_timeout_ms: config.stale_timeout_ms,
        heartbeat_interval_ms: config.keepalive_ms,
        schedule: PollSchedule {
            idle_delay: Duration::from_millis(config.idle_delay_ms),
            ..PollSchedule::default()
        },
    }
}

fn mqtt_settings(config: &RuntimeConfig, host: &str) -> MqttSettings {
    MqttSettings {
        host: host.to_string(),
        port: config.mqtt_port,
        client_id: config.mqtt_client_id.clone(),
        username: config.mqtt_user.clone(),
        password: config.mqtt_pass.clone(),
        keep_alive: Duration::from_millis(config.keepalive_ms.into()),
        ..MqttSettings::default()
    }
}

fn build_monitor(
    config: &RuntimeConfig,
    control_config: ControlConfig,
    timebase: TimeBase,
) -> Result<BoilerMonitor, MonitorError> {
    let pump = match config.pump_gpio {
        Some(pin) => {
            info!(pin, "Pump reed switch on GPIO");
            PumpSwitch::Gpio(SysfsInput::active_low(pin).probe()?)
        }
        None => {
            warn!("No pump GPIO configured, simulating shots");
            PumpSwitch::Simulated(SimulatedPump::new(timebase))
        }
    };

    let link = match &config.serial_port {
        Some(path) => ControllerLink::Serial(SerialLineSource::open(
            path,
            config.baud,
            boiler_io::serial::DEFAULT_TIMEOUT,
        )?),
        None => {
            warn!("No serial port configured, simulating the boiler controller");
            ControllerLink::Simulated(SimulatedBoiler::new(timebase))
        }
    };

    let bus = match &config.mqtt_host {
        Some(host) => Broker::Mqtt(Box::new(MqttBus::connect(mqtt_settings(config, host))?)),
        None => {
            warn!("No MQTT broker configured, publishing to the log");
            Broker::Log(LogBus::new())
        }
    };

    let topics = Topics {
        pump: config.pump_topic.clone(),
        telemetry: config.telemetry_topic.clone(),
    };
    let now = timebase.now_ms();
    Ok(Monitor::new(
        pump,
        TelemetryPort::new(link, config.field_layout),
        Publisher::new(bus, topics, now),
        LogDisplay::new(),
        control_config,
        now,
    ))
}
