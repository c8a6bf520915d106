use async_trait::async_trait;

use crate::error::DeviceError;

/// Auxiliary microcontroller board: heated bases, pumps and ultrasonic baths.
///
/// Bases and pumps are addressed by their index on the board.
#[async_trait]
pub trait AuxBoardClient: Send + Sync {
  /// Set a base's target temperature in °C.
  async fn set_temp(&mut self, base: u8, celsius: f64) -> Result<(), DeviceError>;

  /// Read a base's current temperature in °C.
  async fn get_temp(&mut self, base: u8) -> Result<f64, DeviceError>;

  /// Run a pump until the given volume in millilitres has been dispensed.
  async fn dispense_ml(&mut self, pump: u8, volume_ml: f64) -> Result<(), DeviceError>;

  /// Switch a base's ultrasonic transducer on for the given duration.
  async fn set_ultrasonic_on_timer(&mut self, base: u8, duration_ms: u64) -> Result<(), DeviceError>;
}
