use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Pipette/well offset in millimetres.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Offset {
  #[serde(default)]
  pub x: f64,
  #[serde(default)]
  pub y: f64,
  #[serde(default)]
  pub z: f64,
}

/// The device collaborator an action is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceFamily {
  Robot,
  Board,
}

/// A single call to the liquid-handling robot or the auxiliary board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DeviceAction {
  Home,
  MoveTo {
    labware: String,
    well: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pipette: Option<String>,
    #[serde(default)]
    offset: Offset,
  },
  PickUpTip {
    labware: String,
    well: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pipette: Option<String>,
    #[serde(default)]
    offset: Offset,
  },
  DropTip {
    labware: String,
    well: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pipette: Option<String>,
    #[serde(default)]
    offset: Offset,
  },
  Aspirate {
    labware: String,
    well: String,
    /// Volume in microlitres.
    volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pipette: Option<String>,
    #[serde(default)]
    offset: Offset,
  },
  Dispense {
    labware: String,
    well: String,
    /// Volume in microlitres.
    volume: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pipette: Option<String>,
    #[serde(default)]
    offset: Offset,
  },
  SetTemperature {
    base: u8,
    target: f64,
  },
  ReadTemperature {
    base: u8,
  },
  Pump {
    pump: u8,
    volume_ml: f64,
  },
  Ultrasonic {
    base: u8,
    duration_ms: u64,
  },
  /// A rinse cycle expressed with board control keys (`pump0_ml`, `ultrasonic0_ms`, ...).
  Wash {
    #[serde(alias = "arduino_actions")]
    steps: WashSteps,
  },
}

impl DeviceAction {
  pub fn family(&self) -> DeviceFamily {
    match self {
      DeviceAction::Home
      | DeviceAction::MoveTo { .. }
      | DeviceAction::PickUpTip { .. }
      | DeviceAction::DropTip { .. }
      | DeviceAction::Aspirate { .. }
      | DeviceAction::Dispense { .. } => DeviceFamily::Robot,
      DeviceAction::SetTemperature { .. }
      | DeviceAction::ReadTemperature { .. }
      | DeviceAction::Pump { .. }
      | DeviceAction::Ultrasonic { .. }
      | DeviceAction::Wash { .. } => DeviceFamily::Board,
    }
  }

  /// Short name used in logs and events.
  pub fn name(&self) -> &'static str {
    match self {
      DeviceAction::Home => "home",
      DeviceAction::MoveTo { .. } => "move_to",
      DeviceAction::PickUpTip { .. } => "pick_up_tip",
      DeviceAction::DropTip { .. } => "drop_tip",
      DeviceAction::Aspirate { .. } => "aspirate",
      DeviceAction::Dispense { .. } => "dispense",
      DeviceAction::SetTemperature { .. } => "set_temperature",
      DeviceAction::ReadTemperature { .. } => "read_temperature",
      DeviceAction::Pump { .. } => "pump",
      DeviceAction::Ultrasonic { .. } => "ultrasonic",
      DeviceAction::Wash { .. } => "wash",
    }
  }

  /// Translate one board control key into an action.
  ///
  /// Keys follow `base{n}_temp`, `pump{n}_ml` and `ultrasonic{n}_ms`. Returns
  /// `None` for anything else. Zero or negative pump volumes and ultrasonic
  /// durations produce no action.
  pub fn from_control_key(key: &str, value: f64) -> Option<DeviceAction> {
    if let Some(n) = indexed(key, "base", "_temp") {
      return Some(DeviceAction::SetTemperature {
        base: n,
        target: value,
      });
    }
    if let Some(n) = indexed(key, "pump", "_ml") {
      return (value > 0.0).then_some(DeviceAction::Pump {
        pump: n,
        volume_ml: value,
      });
    }
    if let Some(n) = indexed(key, "ultrasonic", "_ms") {
      return (value > 0.0).then_some(DeviceAction::Ultrasonic {
        base: n,
        duration_ms: value as u64,
      });
    }
    None
  }
}

/// Wash steps in the order they were written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WashSteps(Vec<(String, f64)>);

impl WashSteps {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn step(mut self, key: impl Into<String>, value: f64) -> Self {
    self.0.push((key.into(), value));
    self
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
    self.0.iter().map(|(key, value)| (key.as_str(), *value))
  }

  /// Expand into one board action per step, keeping the written order.
  ///
  /// Returns the actions and the keys that were not understood.
  pub fn actions(&self) -> (Vec<DeviceAction>, Vec<String>) {
    let mut actions = Vec::new();
    let mut unknown = Vec::new();
    for (key, value) in self.iter() {
      if is_control_key(key) {
        actions.extend(DeviceAction::from_control_key(key, value));
      } else {
        unknown.push(key.to_string());
      }
    }
    (actions, unknown)
  }
}

impl Serialize for WashSteps {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(self.0.len()))?;
    for (key, value) in &self.0 {
      map.serialize_entry(key, value)?;
    }
    map.end()
  }
}

impl<'de> Deserialize<'de> for WashSteps {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct StepsVisitor;

    impl<'de> Visitor<'de> for StepsVisitor {
      type Value = WashSteps;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of board control keys to numbers")
      }

      fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<WashSteps, A::Error> {
        let mut steps = Vec::with_capacity(map.size_hint().unwrap_or(0));
        while let Some((key, value)) = map.next_entry::<String, f64>()? {
          steps.push((key, value));
        }
        Ok(WashSteps(steps))
      }
    }

    deserializer.deserialize_map(StepsVisitor)
  }
}

/// Expand a board control map into actions, in key order.
///
/// Returns the actions and the keys that were not understood (non-numeric
/// values included) so the caller can report them.
pub fn control_actions(
  control: &serde_json::Map<String, serde_json::Value>,
) -> (Vec<DeviceAction>, Vec<String>) {
  let mut actions = Vec::new();
  let mut unknown = Vec::new();

  for (key, value) in control {
    match value.as_f64() {
      Some(v) if is_control_key(key) => actions.extend(DeviceAction::from_control_key(key, v)),
      _ => unknown.push(key.clone()),
    }
  }

  (actions, unknown)
}

fn is_control_key(key: &str) -> bool {
  indexed(key, "base", "_temp").is_some()
    || indexed(key, "pump", "_ml").is_some()
    || indexed(key, "ultrasonic", "_ms").is_some()
}

fn indexed(key: &str, prefix: &str, suffix: &str) -> Option<u8> {
  key
    .strip_prefix(prefix)?
    .strip_suffix(suffix)?
    .parse::<u8>()
    .ok()
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_action_tagging() {
    let action: DeviceAction = serde_json::from_value(json!({
      "action": "move_to",
      "labware": "reactor_plate",
      "well": "B2",
      "offset": { "z": 5.0 }
    }))
    .unwrap();

    assert_eq!(action.family(), DeviceFamily::Robot);
    assert_eq!(action.name(), "move_to");
    match action {
      DeviceAction::MoveTo { offset, pipette, .. } => {
        assert_eq!(offset.z, 5.0);
        assert_eq!(offset.x, 0.0);
        assert!(pipette.is_none());
      }
      other => panic!("unexpected action: {:?}", other),
    }
  }

  #[test]
  fn test_wash_accepts_legacy_key() {
    let action: DeviceAction = serde_json::from_value(json!({
      "action": "wash",
      "arduino_actions": { "pump0_ml": 2.0, "ultrasonic0_ms": 1500 }
    }))
    .unwrap();

    assert_eq!(action.family(), DeviceFamily::Board);
  }

  #[test]
  fn test_wash_steps_keep_written_order() {
    let action: DeviceAction = serde_json::from_value(json!({
      "action": "wash",
      "steps": { "ultrasonic0_ms": 1000, "pump10_ml": 1.0, "pump2_ml": 3.0, "lights": 1 }
    }))
    .unwrap();
    let DeviceAction::Wash { steps } = action else {
      panic!("expected a wash");
    };

    let (actions, unknown) = steps.actions();
    assert_eq!(
      actions,
      vec![
        DeviceAction::Ultrasonic {
          base: 0,
          duration_ms: 1000
        },
        DeviceAction::Pump {
          pump: 10,
          volume_ml: 1.0
        },
        DeviceAction::Pump {
          pump: 2,
          volume_ml: 3.0
        },
      ]
    );
    assert_eq!(unknown, vec!["lights".to_string()]);
  }

  #[test]
  fn test_control_keys() {
    assert_eq!(
      DeviceAction::from_control_key("base1_temp", 40.0),
      Some(DeviceAction::SetTemperature {
        base: 1,
        target: 40.0
      })
    );
    assert_eq!(DeviceAction::from_control_key("pump0_ml", 0.0), None);
    assert_eq!(DeviceAction::from_control_key("stirrer0_rpm", 100.0), None);
  }

  #[test]
  fn test_control_actions_reports_unknown_keys() {
    let control = json!({
      "base0_temp": 25.0,
      "pump0_ml": 2.5,
      "ultrasonic0_ms": 0,
      "lights": "on"
    });
    let (actions, unknown) = control_actions(control.as_object().unwrap());

    assert_eq!(actions.len(), 2);
    assert_eq!(unknown, vec!["lights".to_string()]);
  }
}
