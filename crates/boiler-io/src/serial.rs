//! UART line source for the boiler controller.

use boiler_core::{HalError, LineSource};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read};
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_BAUD: u32 = 9_600;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Longest line kept before giving up on finding a line ending.
const MAX_LINE_BYTES: usize = 128;

pub struct SerialLineSource {
    port: Box<dyn SerialPort>,
    path: String,
}

impl SerialLineSource {
    pub fn open(path: &str, baud: u32, timeout: Duration) -> Result<Self, HalError> {
        let port = serialport::new(path, baud)
            .timeout(timeout)
            .open()
            .map_err(|e| io_error(path, e.into()))?;
        info!(path, baud, "opened telemetry serial port");
        Ok(Self {
            port,
            path: path.to_string(),
        })
    }
}

impl LineSource for SerialLineSource {
    fn bytes_available(&mut self) -> Result<usize, HalError> {
        self.port
            .bytes_to_read()
            .map(|n| n as usize)
            .map_err(|e| io_error(&self.path, e.into()))
    }

    fn clear_input(&mut self) -> Result<(), HalError> {
        debug!(path = %self.path, "flushing serial backlog");
        self.port
            .clear(ClearBuffer::Input)
            .map_err(|e| io_error(&self.path, e.into()))
    }

    fn read_line(&mut self) -> Result<Option<Vec<u8>>, HalError> {
        read_line_from(&mut self.port, MAX_LINE_BYTES).map_err(|e| io_error(&self.path, e))
    }
}

/// Reads bytes up to and including `\n`. A timeout ends the line early; with
/// nothing read it yields `None`.
fn read_line_from<R: Read + ?Sized>(reader: &mut R, max_len: usize) -> io::Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while line.len() < max_len {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                line.push(byte[0]);
                if byte[0] == b'\n' {
                    break;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok((!line.is_empty()).then_some(line))
}

fn io_error(path: &str, source: io::Error) -> HalError {
    HalError::Io {
        device: path.to_string(),
        source,
    }
}
