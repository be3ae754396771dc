//! MQTT publisher over the blocking `rumqttc` client.
//!
//! The client's event loop only makes progress while the `Connection` is
//! polled, so every bus operation drains pending events first.

use boiler_core::{BusClient, TransportError};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Upper bound on events handled per drain so a chatty broker cannot stall
/// the loop.
const MAX_EVENTS_PER_DRAIN: usize = 32;
const DRAIN_SLICE: Duration = Duration::from_millis(1);
const REQUEST_CAPACITY: usize = 16;
/// `rumqttc` rejects sub-second keepalives.
const MIN_KEEP_ALIVE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub keep_alive: Duration,
    pub connect_timeout: Duration,
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "boiler-monitor".to_string(),
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        options.set_keep_alive(self.keep_alive.max(MIN_KEEP_ALIVE));
        if let Some(username) = &self.username {
            options.set_credentials(username, self.password.as_deref().unwrap_or_default());
        }
        options
    }
}

pub struct MqttBus {
    client: Client,
    connection: Connection,
    settings: MqttSettings,
    connected: bool,
}

impl MqttBus {
    /// Connects and waits for the broker's ConnAck.
    pub fn connect(settings: MqttSettings) -> Result<Self, TransportError> {
        info!(host = %settings.host, port = settings.port, client_id = %settings.client_id, "connecting to MQTT broker");
        let (client, connection) = Client::new(settings.options(), REQUEST_CAPACITY);
        let mut bus = Self {
            client,
            connection,
            settings,
            connected: false,
        };
        bus.wait_for_connack()?;
        Ok(bus)
    }

    fn wait_for_connack(&mut self) -> Result<(), TransportError> {
        let timeout = self.settings.connect_timeout;
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(TransportError::Timeout(timeout.as_millis() as u64));
            }
            match self.connection.recv_timeout(remaining) {
                Ok(Ok(Event::Incoming(Packet::ConnAck(ack)))) => {
                    info!(code = ?ack.code, "MQTT connected");
                    self.connected = true;
                    return Ok(());
                }
                Ok(Ok(event)) => trace!(?event, "MQTT event while connecting"),
                Ok(Err(e)) => {
                    self.connected = false;
                    return Err(TransportError::Connection(e.to_string()));
                }
                Err(_) => return Err(TransportError::Timeout(timeout.as_millis() as u64)),
            }
        }
    }

    /// Handles whatever the event loop has ready without waiting for more.
    fn drain(&mut self) -> Result<(), TransportError> {
        for _ in 0..MAX_EVENTS_PER_DRAIN {
            match self.connection.recv_timeout(DRAIN_SLICE) {
                Ok(Ok(event)) => self.observe(event),
                Ok(Err(e)) => {
                    if self.connected {
                        warn!(error = %e, "MQTT connection lost");
                    }
                    self.connected = false;
                    return Err(TransportError::Connection(e.to_string()));
                }
                Err(_) => break,
            }
        }
        Ok(())
    }

    fn observe(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => self.connected = true,
            Event::Incoming(Packet::Disconnect) => {
                warn!("broker sent disconnect");
                self.connected = false;
            }
            Event::Incoming(Packet::PingResp) => trace!("MQTT ping response"),
            other => trace!(event = ?other, "MQTT event"),
        }
    }

    fn ensure_connected(&self) -> Result<(), TransportError> {
        if self.connected {
            Ok(())
        } else {
            Err(TransportError::NotConnected)
        }
    }
}

impl BusClient for MqttBus {
    fn poll(&mut self) -> Result<(), TransportError> {
        self.drain()
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.ensure_connected()?;
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload.to_vec())
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;
        debug!(topic, bytes = payload.len(), "published");
        self.drain()
    }

    /// The client sends PINGREQ itself once polled; this only verifies the
    /// session is still up.
    fn ping(&mut self) -> Result<(), TransportError> {
        self.drain()?;
        self.ensure_connected()
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        info!(host = %self.settings.host, "reconnecting to MQTT broker");
        self.connected = false;
        self.wait_for_connack()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_carry_broker_and_keepalive() {
        let settings = MqttSettings {
            host: "broker.local".to_string(),
            username: Some("espresso".to_string()),
            password: Some("secret".to_string()),
            keep_alive: Duration::from_secs(10),
            ..MqttSettings::default()
        };
        let options = settings.options();
        assert_eq!(options.broker_address(), ("broker.local".to_string(), 1883));
        assert_eq!(options.keep_alive(), Duration::from_secs(10));
        assert_eq!(options.client_id(), "boiler-monitor");
    }

    #[test]
    fn sub_second_keepalive_is_raised_to_minimum() {
        let settings = MqttSettings {
            keep_alive: Duration::from_millis(200),
            ..MqttSettings::default()
        };
        assert_eq!(settings.options().keep_alive(), MIN_KEEP_ALIVE);
    }

    #[test]
    fn unreachable_broker_fails_fast() {
        let settings = MqttSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_millis(500),
            ..MqttSettings::default()
        };
        assert!(MqttBus::connect(settings).is_err());
    }
}
