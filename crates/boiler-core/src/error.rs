use thiserror::Error;

/// Failure reading or driving a local peripheral.
#[derive(Debug, Error)]
pub enum HalError {
    #[error("i/o error on {device}: {source}")]
    Io {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unexpected value {value:?} from {device}")]
    UnexpectedValue { device: String, value: String },
}

/// Failure talking to the message bus.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("not connected to broker")]
    NotConnected,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("broker did not answer within {0} ms")]
    Timeout(u64),
}

/// An error that ends the current monitoring session.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("transport failed after reconnect: {0}")]
    Transport(#[from] TransportError),

    #[error("hardware fault: {0}")]
    Hal(#[from] HalError),
}
