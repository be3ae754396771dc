pub mod control_loop;
pub mod debounce;
pub mod display;
pub mod error;
pub mod hal;
#[cfg(any(test, feature = "simulation"))]
pub mod hal_sim;
pub mod publish;
pub mod state;
pub mod supervisor;
pub mod sync;
pub mod tags;
pub mod telemetry;
pub mod timebase;

pub use control_loop::{ControlConfig, ExecutionStats, Iteration, Monitor, PollSchedule};
pub use debounce::DebounceState;
pub use display::{DisplayFrame, ShotTimer};
pub use error::{HalError, MonitorError, TransportError};
pub use hal::{BusClient, DigitalInput, DisplaySink, LineSource};
pub use publish::{Publisher, TelemetryMessage, Topics};
pub use state::{ChangeSet, FieldId, MachineState};
pub use supervisor::{RestartPolicy, Session, Supervisor, SupervisorExit};
pub use sync::{MonitorSnapshot, SnapshotExchange};
pub use telemetry::{decode, FieldLayout, Heating, LineOutcome, TelemetryPort, TelemetryRecord};
pub use timebase::{Clock, Millis, TimeBase};
