use async_trait::async_trait;
use electroflow_config::Offset;

use crate::error::DeviceError;

/// A well on a piece of labware, with an optional position offset.
#[derive(Debug, Clone, PartialEq)]
pub struct WellTarget {
  pub labware: String,
  pub well: String,
  pub offset: Offset,
}

impl WellTarget {
  pub fn new(labware: impl Into<String>, well: impl Into<String>) -> Self {
    Self {
      labware: labware.into(),
      well: well.into(),
      offset: Offset::default(),
    }
  }
}

/// Liquid-handling robot command layer.
///
/// Volumes are in microlitres. Each call returns once the robot reports the
/// command as done.
#[async_trait]
pub trait RobotClient: Send + Sync {
  async fn home(&mut self) -> Result<(), DeviceError>;

  async fn move_to_well(&mut self, target: &WellTarget, pipette: &str) -> Result<(), DeviceError>;

  async fn pick_up_tip(&mut self, target: &WellTarget, pipette: &str) -> Result<(), DeviceError>;

  async fn drop_tip(&mut self, target: &WellTarget, pipette: &str) -> Result<(), DeviceError>;

  async fn aspirate(
    &mut self,
    target: &WellTarget,
    volume: f64,
    pipette: &str,
  ) -> Result<(), DeviceError>;

  async fn dispense(
    &mut self,
    target: &WellTarget,
    volume: f64,
    pipette: &str,
  ) -> Result<(), DeviceError>;
}
