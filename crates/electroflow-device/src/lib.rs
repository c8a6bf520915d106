//! Electroflow Device
//!
//! Interfaces to the two physical collaborators a workflow drives besides the
//! potentiostat:
//! - [`RobotClient`]: the liquid-handling robot (moves, tips, pipetting)
//! - [`AuxBoardClient`]: the microcontroller board (heaters, pumps, ultrasonic)
//!
//! [`DeviceSet`] holds one instance of each behind an exclusive lock and
//! translates [`DeviceAction`](electroflow_config::DeviceAction)s into calls.
//! Only simulated implementations live here; real transports plug in through
//! the traits.

mod board;
mod error;
mod robot;
mod set;
mod simulated;

pub use board::AuxBoardClient;
pub use error::DeviceError;
pub use robot::{RobotClient, WellTarget};
pub use set::{DEFAULT_PIPETTE, DeviceGuard, DeviceSet};
pub use simulated::{DeviceCall, Journal, SimulatedBoard, SimulatedRobot};
