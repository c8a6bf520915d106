use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Measurement technique a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExperimentType {
  /// Cyclic voltammetry.
  Cva,
  /// Potentiostatic electrochemical impedance spectroscopy.
  Peis,
  /// Open-circuit voltage.
  Ocv,
  /// Chronopotentiometry.
  Cp,
  /// Linear sweep voltammetry.
  Lsv,
}

impl ExperimentType {
  pub const ALL: [ExperimentType; 5] = [
    ExperimentType::Cva,
    ExperimentType::Peis,
    ExperimentType::Ocv,
    ExperimentType::Cp,
    ExperimentType::Lsv,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      ExperimentType::Cva => "CVA",
      ExperimentType::Peis => "PEIS",
      ExperimentType::Ocv => "OCV",
      ExperimentType::Cp => "CP",
      ExperimentType::Lsv => "LSV",
    }
  }
}

impl fmt::Display for ExperimentType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ExperimentType {
  type Err = RegistryError;

  /// Tags are matched case-insensitively.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    ExperimentType::ALL
      .into_iter()
      .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| RegistryError::UnknownType(s.to_string()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_tags() {
    assert_eq!("OCV".parse::<ExperimentType>().unwrap(), ExperimentType::Ocv);
    assert_eq!("peis".parse::<ExperimentType>().unwrap(), ExperimentType::Peis);
    assert!(matches!(
      "XRD".parse::<ExperimentType>(),
      Err(RegistryError::UnknownType(t)) if t == "XRD"
    ));
  }

  #[test]
  fn test_display_roundtrips() {
    for t in ExperimentType::ALL {
      assert_eq!(t.to_string().parse::<ExperimentType>().unwrap(), t);
    }
  }
}
