use boiler_core::telemetry::LayoutError;
use boiler_core::FieldLayout;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} needs a value")]
    MissingValue(String),

    #[error("invalid value {value:?} for {option}: {reason}")]
    InvalidValue {
        option: String,
        value: String,
        reason: String,
    },

    #[error("unknown option {0}")]
    UnknownOption(String),

    #[error("invalid field layout: {0}")]
    Layout(#[from] LayoutError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub show_help: bool,
    pub run_seconds: Option<u64>,
    pub json_logs: bool,
    pub log_file: Option<PathBuf>,
    pub metrics_addr: Option<String>,

    pub serial_port: Option<String>,
    pub baud: u32,
    pub field_layout: FieldLayout,
    pub pump_gpio: Option<u32>,
    pub reset_gpio: Option<u32>,

    pub mqtt_host: Option<String>,
    pub mqtt_port: u16,
    pub mqtt_user: Option<String>,
    pub mqtt_pass: Option<String>,
    pub mqtt_client_id: String,
    pub pump_topic: String,
    pub telemetry_topic: String,

    pub hold_ms: u32,
    pub stale_timeout_ms: u32,
    pub keepalive_ms: u32,
    pub idle_delay_ms: u64,
    pub restart_countdown_secs: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            show_help: false,
            run_seconds: None,
            json_logs: false,
            log_file: None,
            metrics_addr: None,
            serial_port: None,
            baud: 9_600,
            field_layout: FieldLayout::default(),
            pump_gpio: None,
            reset_gpio: None,
            mqtt_host: None,
            mqtt_port: 1883,
            mqtt_user: None,
            mqtt_pass: None,
            mqtt_client_id: "boiler-monitor".to_string(),
            pump_topic: "boiler/pump".to_string(),
            telemetry_topic: "boiler/telemetry".to_string(),
            hold_ms: 1_200,
            stale_timeout_ms: 5_000,
            keepalive_ms: 5_000,
            idle_delay_ms: 200,
            restart_countdown_secs: 10,
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(|key| std::env::var(key).ok(), &args)
    }

    /// Environment first, then command-line flags on top.
    pub fn from_sources(
        env: impl Fn(&str) -> Option<String>,
        args: &[String],
    ) -> Result<Self, ConfigError> {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_env(env)?;
        cfg.apply_args(args)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.is_empty());
        if let Some(host) = env("MQTT_SERVER") {
            self.mqtt_host = Some(host);
        }
        if let Some(port) = env("MQTT_PORT") {
            self.mqtt_port = parse("MQTT_PORT", &port)?;
        }
        if let Some(user) = env("MQTT_USER") {
            self.mqtt_user = Some(user);
        }
        if let Some(pass) = env("MQTT_PASS") {
            self.mqtt_pass = Some(pass);
        }
        if let Some(id) = env("MQTT_CLIENT_ID") {
            self.mqtt_client_id = id;
        }
        if let Some(topic) = env("MQTT_PUMP_TOPIC") {
            self.pump_topic = topic;
        }
        if let Some(topic) = env("MQTT_TELEMETRY_TOPIC") {
            self.telemetry_topic = topic;
        }
        Ok(())
    }

    fn apply_args(&mut self, args: &[String]) -> Result<(), ConfigError> {
        let mut i = 1;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || {
                i += 1;
                args.get(i)
                    .map(String::as_str)
                    .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))
            };
            match flag {
                "--run-seconds" => self.run_seconds = Some(parse(flag, value()?)?),
                "--json-logs" => self.json_logs = true,
                "--log-file" => self.log_file = Some(PathBuf::from(value()?)),
                "--metrics-addr" => self.metrics_addr = Some(value()?.to_string()),
                "--serial" => self.serial_port = Some(value()?.to_string()),
                "--baud" => self.baud = parse(flag, value()?)?,
                "--field-layout" => self.field_layout = value()?.parse()?,
                "--pump-gpio" => self.pump_gpio = Some(parse(flag, value()?)?),
                "--reset-gpio" => self.reset_gpio = Some(parse(flag, value()?)?),
                "--mqtt-host" => self.mqtt_host = Some(value()?.to_string()),
                "--mqtt-port" => self.mqtt_port = parse(flag, value()?)?,
                "--mqtt-user" => self.mqtt_user = Some(value()?.to_string()),
                "--mqtt-pass" => self.mqtt_pass = Some(value()?.to_string()),
                "--client-id" => self.mqtt_client_id = value()?.to_string(),
                "--pump-topic" => self.pump_topic = value()?.to_string(),
                "--telemetry-topic" => self.telemetry_topic = value()?.to_string(),
                "--hold-ms" => self.hold_ms = parse(flag, value()?)?,
                "--stale-timeout-ms" => self.stale_timeout_ms = parse(flag, value()?)?,
                "--keepalive-ms" => self.keepalive_ms = parse(flag, value()?)?,
                "--idle-delay-ms" => self.idle_delay_ms = parse(flag, value()?)?,
                "--restart-countdown" => self.restart_countdown_secs = parse(flag, value()?)?,
                "--help" | "-h" => {
                    self.show_help = true;
                    break;
                }
                other => return Err(ConfigError::UnknownOption(other.to_string())),
            }
            i += 1;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.keepalive_ms == 0 {
            return Err(invalid("--keepalive-ms", "0", "must be positive"));
        }
        if self.mqtt_port == 0 {
            return Err(invalid("--mqtt-port", "0", "must be positive"));
        }
        if self.pump_topic.is_empty() || self.telemetry_topic.is_empty() {
            return Err(invalid("topic", "", "must not be empty"));
        }
        Ok(())
    }

    pub fn print_help() {
        println!(
            r#"boiler-monitor - espresso machine boiler and pump monitor

USAGE:
    boiler-monitor [OPTIONS]

Without --serial, --pump-gpio or a broker the monitor runs against a simulated
boiler and pump and logs what it would publish.

OPTIONS:
    --serial <PATH>           Boiler controller UART (e.g. /dev/ttyS0)
    --baud <N>                UART baud rate [default: 9600]
    --field-layout <LAYOUT>   steam-first | boiler-first | comma list of
                              steam,target,boiler,counter [default: steam-first]
    --pump-gpio <PIN>         Sysfs GPIO of the pump reed switch (active low)
    --reset-gpio <PIN>        Sysfs GPIO of the reset button (active low)
    --mqtt-host <HOST>        MQTT broker host
    --mqtt-port <PORT>        MQTT broker port [default: 1883]
    --mqtt-user <USER>        MQTT username
    --mqtt-pass <PASS>        MQTT password
    --client-id <ID>          MQTT client id [default: boiler-monitor]
    --pump-topic <TOPIC>      Pump topic [default: boiler/pump]
    --telemetry-topic <TOPIC> Telemetry topic [default: boiler/telemetry]
    --hold-ms <MS>            Pump debounce hold time [default: 1200]
    --stale-timeout-ms <MS>   Telemetry staleness timeout [default: 5000]
    --keepalive-ms <MS>       Broker keepalive interval [default: 5000]
    --idle-delay-ms <MS>      Loop delay while the pump is idle [default: 200]
    --restart-countdown <S>   Seconds before restarting after a fault [default: 10]
    --run-seconds <SECS>      Run for a fixed duration then exit
    --json-logs               Output logs in JSON format
    --log-file <PATH>         Also write JSON logs to a file
    --metrics-addr <ADDR>     Enable Prometheus metrics server on address (e.g., 0.0.0.0:9090)
    -h, --help                Print this help message

ENVIRONMENT VARIABLES:
    MQTT_SERVER, MQTT_PORT, MQTT_USER, MQTT_PASS, MQTT_CLIENT_ID,
    MQTT_PUMP_TOPIC, MQTT_TELEMETRY_TOPIC
                              Broker settings; flags take precedence
    RUST_LOG                  Set log filter (e.g., RUST_LOG=debug,boiler_io=trace)

EXAMPLES:
    # Simulated run with metrics
    boiler-monitor --run-seconds 30 --metrics-addr 127.0.0.1:9090

    # On the machine
    MQTT_SERVER=broker.local boiler-monitor --serial /dev/ttyS0 --pump-gpio 17 --reset-gpio 27
"#
        );
    }
}

fn parse<T>(option: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(option, raw, &e.to_string()))
}

fn invalid(option: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        option: option.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
