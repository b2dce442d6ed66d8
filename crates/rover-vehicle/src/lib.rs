//! Vehicle-side state as seen by the console: telemetry routing, the IMU
//! tri-state, the battery alert and the two control pads.

pub mod battery;
pub mod control;
pub mod state;
pub mod telemetry;

pub use battery::{BatteryAlert, BatteryIndicator, BatteryMonitor};
pub use control::{Pad, PadInput};
pub use state::{ImuAvailability, Reading, TelemetrySnapshot};
pub use telemetry::{Routed, TelemetryRouter};
