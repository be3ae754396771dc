use crate::display::DisplayFrame;
use crate::error::{HalError, TransportError};

/// A single digital line, already normalised so `true` means asserted.
pub trait DigitalInput {
    fn is_active(&mut self) -> Result<bool, HalError>;
}

/// Byte stream from the boiler controller with a bounded receive buffer.
pub trait LineSource {
    fn bytes_available(&mut self) -> Result<usize, HalError>;
    fn clear_input(&mut self) -> Result<(), HalError>;
    /// Reads up to and including the next line ending. `None` when the read
    /// timed out with nothing received.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, HalError>;
}

/// Publish-only message bus connection.
pub trait BusClient {
    /// Services the connection without blocking.
    fn poll(&mut self) -> Result<(), TransportError>;
    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
    fn ping(&mut self) -> Result<(), TransportError>;
    fn reconnect(&mut self) -> Result<(), TransportError>;
}

/// Local indicator output.
pub trait DisplaySink {
    fn show(&mut self, frame: &DisplayFrame);
    fn blank(&mut self);
}
