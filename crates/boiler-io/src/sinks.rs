//! Log-only stand-ins for the bus and the display.

use boiler_core::{BusClient, DisplayFrame, DisplaySink, TransportError};
use tracing::{info, trace};

/// Bus used when no broker is configured: every publish becomes a log line.
#[derive(Debug, Default)]
pub struct LogBus {
    published: u64,
}

impl LogBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl BusClient for LogBus {
    fn poll(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn publish(&mut self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        self.published += 1;
        info!(topic, payload = %String::from_utf8_lossy(payload), "publish (no broker)");
        Ok(())
    }

    fn ping(&mut self) -> Result<(), TransportError> {
        trace!("keepalive (no broker)");
        Ok(())
    }

    fn reconnect(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Display that writes frames to the log.
///
/// While pumping the headline ticks every iteration, so only a change in the
/// rest of the frame is logged at info.
#[derive(Debug, Default)]
pub struct LogDisplay {
    last: Option<DisplayFrame>,
}

impl LogDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&DisplayFrame> {
        self.last.as_ref()
    }

    fn is_notable(&self, frame: &DisplayFrame) -> bool {
        let Some(last) = &self.last else {
            return true;
        };
        if frame.pumping && last.pumping {
            let ignore_headline = DisplayFrame {
                headline: last.headline.clone(),
                ..frame.clone()
            };
            return &ignore_headline != last;
        }
        frame != last
    }
}

impl DisplaySink for LogDisplay {
    fn show(&mut self, frame: &DisplayFrame) {
        if self.is_notable(frame) {
            info!(
                boiler = %frame.boiler_text,
                steam = frame.steam_text.as_deref().unwrap_or("-"),
                counter = frame.counter_text.as_deref().unwrap_or("-"),
                last_shot = frame.last_shot.as_deref().unwrap_or("-"),
                heating = ?frame.heating,
                pumping = frame.pumping,
                "{}",
                frame.headline
            );
        } else {
            trace!(headline = %frame.headline, "display");
        }
        self.last = Some(frame.clone());
    }

    fn blank(&mut self) {
        info!("display blanked");
        self.last = None;
    }
}
