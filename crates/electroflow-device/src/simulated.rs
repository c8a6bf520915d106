use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use electroflow_config::DeviceFamily;

use crate::board::AuxBoardClient;
use crate::error::DeviceError;
use crate::robot::{RobotClient, WellTarget};

/// A command as observed by a simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceCall {
  pub device: DeviceFamily,
  pub command: String,
  pub detail: String,
  pub ok: bool,
}

/// Shared, ordered record of every command sent to the simulated devices.
#[derive(Debug, Clone, Default)]
pub struct Journal {
  calls: Arc<Mutex<Vec<DeviceCall>>>,
}

impl Journal {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn calls(&self) -> Vec<DeviceCall> {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Commands sent to one device family, in order.
  pub fn commands(&self, device: DeviceFamily) -> Vec<String> {
    self
      .calls()
      .into_iter()
      .filter(|c| c.device == device)
      .map(|c| c.command)
      .collect()
  }

  pub fn is_empty(&self) -> bool {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .is_empty()
  }

  fn record(&self, call: DeviceCall) {
    self
      .calls
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .push(call);
  }
}

/// Behaviour shared by both simulated devices.
struct Sim {
  device: DeviceFamily,
  journal: Journal,
  latency: Duration,
  failures: VecDeque<DeviceError>,
}

impl Sim {
  async fn run(&mut self, command: &str, detail: String) -> Result<(), DeviceError> {
    if !self.latency.is_zero() {
      tokio::time::sleep(self.latency).await;
    }
    let failure = self.failures.pop_front();
    self.journal.record(DeviceCall {
      device: self.device,
      command: command.to_string(),
      detail,
      ok: failure.is_none(),
    });
    match failure {
      Some(err) => Err(err),
      None => Ok(()),
    }
  }
}

fn describe(target: &WellTarget, pipette: &str) -> String {
  format!("{}/{} [{}]", target.labware, target.well, pipette)
}

/// In-process stand-in for the liquid-handling robot.
pub struct SimulatedRobot {
  sim: Sim,
}

impl SimulatedRobot {
  pub fn new(journal: Journal) -> Self {
    Self {
      sim: Sim {
        device: DeviceFamily::Robot,
        journal,
        latency: Duration::ZERO,
        failures: VecDeque::new(),
      },
    }
  }

  /// Delay every command by `latency`.
  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.sim.latency = latency;
    self
  }

  /// Fail the next commands with these errors, one per command.
  pub fn with_failures(mut self, failures: impl IntoIterator<Item = DeviceError>) -> Self {
    self.sim.failures.extend(failures);
    self
  }
}

#[async_trait]
impl RobotClient for SimulatedRobot {
  async fn home(&mut self) -> Result<(), DeviceError> {
    self.sim.run("home", String::new()).await
  }

  async fn move_to_well(&mut self, target: &WellTarget, pipette: &str) -> Result<(), DeviceError> {
    self.sim.run("move_to_well", describe(target, pipette)).await
  }

  async fn pick_up_tip(&mut self, target: &WellTarget, pipette: &str) -> Result<(), DeviceError> {
    self.sim.run("pick_up_tip", describe(target, pipette)).await
  }

  async fn drop_tip(&mut self, target: &WellTarget, pipette: &str) -> Result<(), DeviceError> {
    self.sim.run("drop_tip", describe(target, pipette)).await
  }

  async fn aspirate(
    &mut self,
    target: &WellTarget,
    volume: f64,
    pipette: &str,
  ) -> Result<(), DeviceError> {
    let detail = format!("{} {}uL", describe(target, pipette), volume);
    self.sim.run("aspirate", detail).await
  }

  async fn dispense(
    &mut self,
    target: &WellTarget,
    volume: f64,
    pipette: &str,
  ) -> Result<(), DeviceError> {
    let detail = format!("{} {}uL", describe(target, pipette), volume);
    self.sim.run("dispense", detail).await
  }
}

/// In-process stand-in for the auxiliary board.
///
/// Bases start at 25 °C and jump straight to their set point.
pub struct SimulatedBoard {
  sim: Sim,
  temperatures: HashMap<u8, f64>,
}

impl SimulatedBoard {
  pub fn new(journal: Journal) -> Self {
    Self {
      sim: Sim {
        device: DeviceFamily::Board,
        journal,
        latency: Duration::ZERO,
        failures: VecDeque::new(),
      },
      temperatures: HashMap::new(),
    }
  }

  pub fn with_latency(mut self, latency: Duration) -> Self {
    self.sim.latency = latency;
    self
  }

  pub fn with_failures(mut self, failures: impl IntoIterator<Item = DeviceError>) -> Self {
    self.sim.failures.extend(failures);
    self
  }
}

#[async_trait]
impl AuxBoardClient for SimulatedBoard {
  async fn set_temp(&mut self, base: u8, celsius: f64) -> Result<(), DeviceError> {
    self
      .sim
      .run("set_temp", format!("base{} {}C", base, celsius))
      .await?;
    self.temperatures.insert(base, celsius);
    Ok(())
  }

  async fn get_temp(&mut self, base: u8) -> Result<f64, DeviceError> {
    self.sim.run("get_temp", format!("base{}", base)).await?;
    Ok(self.temperatures.get(&base).copied().unwrap_or(25.0))
  }

  async fn dispense_ml(&mut self, pump: u8, volume_ml: f64) -> Result<(), DeviceError> {
    self
      .sim
      .run("dispense_ml", format!("pump{} {}ml", pump, volume_ml))
      .await
  }

  async fn set_ultrasonic_on_timer(&mut self, base: u8, duration_ms: u64) -> Result<(), DeviceError> {
    self
      .sim
      .run("set_ultrasonic_on_timer", format!("base{} {}ms", base, duration_ms))
      .await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn test_journal_records_in_order() {
    let journal = Journal::new();
    let mut robot = SimulatedRobot::new(journal.clone());
    let mut board = SimulatedBoard::new(journal.clone());

    robot.home().await.unwrap();
    board.set_temp(0, 40.0).await.unwrap();
    assert_eq!(board.get_temp(0).await.unwrap(), 40.0);
    assert_eq!(board.get_temp(1).await.unwrap(), 25.0);

    let calls = journal.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(calls[0].device, DeviceFamily::Robot);
    assert_eq!(calls[1].detail, "base0 40C");
    assert_eq!(journal.commands(DeviceFamily::Board).len(), 3);
  }

  #[tokio::test]
  async fn test_injected_failures_are_consumed() {
    let journal = Journal::new();
    let mut robot = SimulatedRobot::new(journal.clone())
      .with_failures([DeviceError::connection("robot", "socket closed")]);

    assert!(robot.home().await.is_err());
    assert!(robot.home().await.is_ok());

    let calls = journal.calls();
    assert!(!calls[0].ok);
    assert!(calls[1].ok);
  }
}
