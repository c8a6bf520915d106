use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use electroflow_config::{DeviceAction, DeviceFamily, Offset};
use serde_json::json;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::board::AuxBoardClient;
use crate::error::DeviceError;
use crate::robot::{RobotClient, WellTarget};
use crate::simulated::{Journal, SimulatedBoard, SimulatedRobot};

/// Pipette used when neither the action nor the workflow names one.
pub const DEFAULT_PIPETTE: &str = "p1000_single_gen2";

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

type SharedRobot = Arc<Mutex<Box<dyn RobotClient>>>;
type SharedBoard = Arc<Mutex<Box<dyn AuxBoardClient>>>;

/// The robot and board of one lab station, each behind an exclusive lock.
///
/// Cloning shares the same devices and locks.
#[derive(Clone)]
pub struct DeviceSet {
  robot: SharedRobot,
  board: SharedBoard,
  command_timeout: Duration,
}

impl DeviceSet {
  pub fn new(robot: impl RobotClient + 'static, board: impl AuxBoardClient + 'static) -> Self {
    Self {
      robot: Arc::new(Mutex::new(Box::new(robot))),
      board: Arc::new(Mutex::new(Box::new(board))),
      command_timeout: DEFAULT_COMMAND_TIMEOUT,
    }
  }

  /// Simulated robot and board sharing one journal.
  pub fn simulated(journal: Journal) -> Self {
    Self::new(
      SimulatedRobot::new(journal.clone()),
      SimulatedBoard::new(journal),
    )
  }

  /// Upper bound on a single device command.
  pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
    self.command_timeout = timeout;
    self
  }

  pub fn command_timeout(&self) -> Duration {
    self.command_timeout
  }

  /// Lock the requested devices, always robot first, then board.
  ///
  /// The fixed order means two callers can never deadlock on each other.
  pub async fn lock(&self, families: &BTreeSet<DeviceFamily>) -> DeviceGuard {
    let robot = if families.contains(&DeviceFamily::Robot) {
      Some(self.robot.clone().lock_owned().await)
    } else {
      None
    };
    let board = if families.contains(&DeviceFamily::Board) {
      Some(self.board.clone().lock_owned().await)
    } else {
      None
    };

    DeviceGuard {
      robot,
      board,
      command_timeout: self.command_timeout,
    }
  }
}

/// Exclusive access to some devices of a [`DeviceSet`]; released on drop.
pub struct DeviceGuard {
  robot: Option<OwnedMutexGuard<Box<dyn RobotClient>>>,
  board: Option<OwnedMutexGuard<Box<dyn AuxBoardClient>>>,
  command_timeout: Duration,
}

impl DeviceGuard {
  pub fn holds(&self, family: DeviceFamily) -> bool {
    match family {
      DeviceFamily::Robot => self.robot.is_some(),
      DeviceFamily::Board => self.board.is_some(),
    }
  }

  /// Run one action on the locked devices.
  ///
  /// Returns a reading for actions that produce one (`read_temperature`).
  pub async fn execute(
    &mut self,
    action: &DeviceAction,
    default_pipette: &str,
  ) -> Result<Option<serde_json::Value>, DeviceError> {
    debug!(action = action.name(), "device_action_started");

    let DeviceAction::Wash { steps } = action else {
      return self.execute_one(action, default_pipette).await;
    };
    let (actions, unknown) = steps.actions();
    for key in unknown {
      warn!(key = %key, "unknown_wash_step");
    }
    for step in &actions {
      self.execute_one(step, default_pipette).await?;
    }
    Ok(None)
  }

  async fn execute_one(
    &mut self,
    action: &DeviceAction,
    default_pipette: &str,
  ) -> Result<Option<serde_json::Value>, DeviceError> {
    let timeout = self.command_timeout;
    let name = action.name();

    match action {
      DeviceAction::Home => {
        let robot = self.robot(name)?;
        bounded(name, timeout, robot.home()).await?;
      }
      DeviceAction::MoveTo {
        labware,
        well,
        pipette,
        offset,
      } => {
        let target = target(labware, well, *offset);
        let pipette = pipette.as_deref().unwrap_or(default_pipette);
        let robot = self.robot(name)?;
        bounded(name, timeout, robot.move_to_well(&target, pipette)).await?;
      }
      DeviceAction::PickUpTip {
        labware,
        well,
        pipette,
        offset,
      } => {
        let target = target(labware, well, *offset);
        let pipette = pipette.as_deref().unwrap_or(default_pipette);
        let robot = self.robot(name)?;
        bounded(name, timeout, robot.pick_up_tip(&target, pipette)).await?;
      }
      DeviceAction::DropTip {
        labware,
        well,
        pipette,
        offset,
      } => {
        let target = target(labware, well, *offset);
        let pipette = pipette.as_deref().unwrap_or(default_pipette);
        let robot = self.robot(name)?;
        bounded(name, timeout, robot.drop_tip(&target, pipette)).await?;
      }
      DeviceAction::Aspirate {
        labware,
        well,
        volume,
        pipette,
        offset,
      } => {
        let target = target(labware, well, *offset);
        let pipette = pipette.as_deref().unwrap_or(default_pipette);
        let robot = self.robot(name)?;
        bounded(name, timeout, robot.aspirate(&target, *volume, pipette)).await?;
      }
      DeviceAction::Dispense {
        labware,
        well,
        volume,
        pipette,
        offset,
      } => {
        let target = target(labware, well, *offset);
        let pipette = pipette.as_deref().unwrap_or(default_pipette);
        let robot = self.robot(name)?;
        bounded(name, timeout, robot.dispense(&target, *volume, pipette)).await?;
      }
      DeviceAction::SetTemperature { base, target } => {
        let board = self.board(name)?;
        bounded(name, timeout, board.set_temp(*base, *target)).await?;
      }
      DeviceAction::ReadTemperature { base } => {
        let board = self.board(name)?;
        let celsius = bounded(name, timeout, board.get_temp(*base)).await?;
        return Ok(Some(json!({ "base": base, "temperature": celsius })));
      }
      DeviceAction::Pump { pump, volume_ml } => {
        let board = self.board(name)?;
        bounded(name, timeout, board.dispense_ml(*pump, *volume_ml)).await?;
      }
      DeviceAction::Ultrasonic { base, duration_ms } => {
        let board = self.board(name)?;
        bounded(name, timeout, board.set_ultrasonic_on_timer(*base, *duration_ms)).await?;
      }
      DeviceAction::Wash { .. } => {
        return Err(DeviceError::rejected(name, "nested wash steps are not supported"));
      }
    }

    Ok(None)
  }

  fn robot(&mut self, command: &str) -> Result<&mut Box<dyn RobotClient>, DeviceError> {
    self
      .robot
      .as_deref_mut()
      .ok_or_else(|| DeviceError::rejected(command, "robot is not locked by this node"))
  }

  fn board(&mut self, command: &str) -> Result<&mut Box<dyn AuxBoardClient>, DeviceError> {
    self
      .board
      .as_deref_mut()
      .ok_or_else(|| DeviceError::rejected(command, "board is not locked by this node"))
  }
}

fn target(labware: &str, well: &str, offset: Offset) -> WellTarget {
  WellTarget {
    labware: labware.to_string(),
    well: well.to_string(),
    offset,
  }
}

async fn bounded<T>(
  command: &str,
  after: Duration,
  fut: impl Future<Output = Result<T, DeviceError>>,
) -> Result<T, DeviceError> {
  tokio::time::timeout(after, fut)
    .await
    .map_err(|_| DeviceError::Timeout {
      command: command.to_string(),
      after,
    })?
}
