pub mod gpio;
pub mod metrics;
#[cfg(feature = "mqtt")]
pub mod mqtt;
#[cfg(feature = "serial")]
pub mod serial;
pub mod sinks;

pub use gpio::SysfsInput;
pub use metrics::{init_metrics, serve_metrics};
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBus, MqttSettings};
#[cfg(feature = "serial")]
pub use serial::SerialLineSource;
pub use sinks::{LogBus, LogDisplay};
