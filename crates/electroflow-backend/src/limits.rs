use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::experiment_type::ExperimentType;
use crate::units::Quantity;

/// Accepted range for one numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limit {
  pub quantity: Quantity,
  pub min: Option<f64>,
  pub min_exclusive: bool,
  pub max: Option<f64>,
  pub max_exclusive: bool,
  pub integer: bool,
}

impl Limit {
  pub const fn new(quantity: Quantity) -> Self {
    Self {
      quantity,
      min: None,
      min_exclusive: false,
      max: None,
      max_exclusive: false,
      integer: false,
    }
  }

  /// Inclusive range.
  pub const fn between(self, min: f64, max: f64) -> Self {
    self.at_least(min).at_most(max)
  }

  pub const fn at_least(mut self, min: f64) -> Self {
    self.min = Some(min);
    self.min_exclusive = false;
    self
  }

  pub const fn above(mut self, min: f64) -> Self {
    self.min = Some(min);
    self.min_exclusive = true;
    self
  }

  pub const fn at_most(mut self, max: f64) -> Self {
    self.max = Some(max);
    self.max_exclusive = false;
    self
  }

  pub const fn integer(mut self) -> Self {
    self.integer = true;
    self
  }

  /// Describe the violation, if any.
  pub fn check(&self, name: &str, value: f64) -> Option<String> {
    if self.integer && value.fract() != 0.0 {
      return Some(format!("{} must be a whole number, got {}", name, value));
    }
    if let Some(min) = self.min {
      let low = if self.min_exclusive { value <= min } else { value < min };
      if low {
        let bound = if self.min_exclusive { "greater than" } else { "at least" };
        return Some(format!("{} must be {} {}, got {}", name, bound, min, value));
      }
    }
    if let Some(max) = self.max {
      let high = if self.max_exclusive { value >= max } else { value > max };
      if high {
        let bound = if self.max_exclusive { "less than" } else { "at most" };
        return Some(format!("{} must be {} {}, got {}", name, bound, max, value));
      }
    }
    None
  }
}

/// Inclusive bounds that replace a declared limit, as read from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct LimitOverride {
  pub min: Option<f64>,
  pub max: Option<f64>,
}

const SWEEP_VOLTAGE: Limit = Limit::new(Quantity::Voltage).between(-2.0, 2.0);
const SCAN_RATE: Limit = Limit::new(Quantity::ScanRate).above(0.0).at_most(1.0);
const POSITIVE_TIME: Limit = Limit::new(Quantity::Time).above(0.0);

/// Declared limits for every experiment type.
#[derive(Debug, Clone)]
pub struct ParameterLimits {
  table: HashMap<ExperimentType, BTreeMap<String, Limit>>,
}

impl ParameterLimits {
  /// The instrument's safe operating ranges.
  pub fn declared() -> Self {
    let mut limits = Self {
      table: HashMap::new(),
    };

    limits.declare(ExperimentType::Cva, "start_voltage", SWEEP_VOLTAGE);
    limits.declare(ExperimentType::Cva, "end_voltage", SWEEP_VOLTAGE);
    limits.declare(ExperimentType::Cva, "scan_rate", SCAN_RATE);
    limits.declare(
      ExperimentType::Cva,
      "cycles",
      Limit::new(Quantity::Count).at_least(1.0).integer(),
    );

    limits.declare(ExperimentType::Lsv, "start_voltage", SWEEP_VOLTAGE);
    limits.declare(ExperimentType::Lsv, "end_voltage", SWEEP_VOLTAGE);
    limits.declare(ExperimentType::Lsv, "scan_rate", SCAN_RATE);

    limits.declare(ExperimentType::Ocv, "duration", POSITIVE_TIME);
    limits.declare(ExperimentType::Ocv, "sample_interval", POSITIVE_TIME);

    limits.declare(
      ExperimentType::Cp,
      "current",
      Limit::new(Quantity::Current).between(-0.1, 0.1),
    );
    limits.declare(ExperimentType::Cp, "duration", POSITIVE_TIME);
    limits.declare(ExperimentType::Cp, "sample_interval", POSITIVE_TIME);

    limits.declare(ExperimentType::Peis, "dc_voltage", SWEEP_VOLTAGE);
    limits.declare(
      ExperimentType::Peis,
      "ac_amplitude",
      Limit::new(Quantity::Voltage).above(0.0).at_most(0.1),
    );
    limits.declare(
      ExperimentType::Peis,
      "frequency_start",
      Limit::new(Quantity::Frequency).above(0.0),
    );
    limits.declare(
      ExperimentType::Peis,
      "frequency_end",
      Limit::new(Quantity::Frequency).above(0.0),
    );

    limits
  }

  pub fn declare(&mut self, uo_type: ExperimentType, param: &str, limit: Limit) {
    self
      .table
      .entry(uo_type)
      .or_default()
      .insert(param.to_string(), limit);
  }

  /// Replace the bounds of a parameter; both become inclusive.
  ///
  /// An undeclared parameter is added as a plain number.
  pub fn apply_override(&mut self, uo_type: ExperimentType, param: &str, bounds: LimitOverride) {
    let entry = self
      .table
      .entry(uo_type)
      .or_default()
      .entry(param.to_string())
      .or_insert(Limit::new(Quantity::Count));
    if let Some(min) = bounds.min {
      *entry = entry.at_least(min);
    }
    if let Some(max) = bounds.max {
      *entry = entry.at_most(max);
    }
  }

  pub fn get(&self, uo_type: ExperimentType, param: &str) -> Option<&Limit> {
    self.table.get(&uo_type).and_then(|t| t.get(param))
  }

  /// Limits for one type, ordered by parameter name.
  pub fn for_type(&self, uo_type: ExperimentType) -> impl Iterator<Item = (&str, &Limit)> {
    self
      .table
      .get(&uo_type)
      .into_iter()
      .flat_map(|t| t.iter().map(|(k, v)| (k.as_str(), v)))
  }
}

impl Default for ParameterLimits {
  fn default() -> Self {
    Self::declared()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_exclusive_and_inclusive_bounds() {
    assert!(SCAN_RATE.check("scan_rate", 1.0).is_none());
    assert!(SCAN_RATE.check("scan_rate", 0.0).is_some());
    assert!(SCAN_RATE.check("scan_rate", 1.5).is_some());
    assert!(SWEEP_VOLTAGE.check("start_voltage", -2.0).is_none());
  }

  #[test]
  fn test_integer_limit() {
    let cycles = ParameterLimits::declared();
    let limit = cycles.get(ExperimentType::Cva, "cycles").unwrap();
    assert!(limit.check("cycles", 2.0).is_none());
    assert!(limit.check("cycles", 1.5).unwrap().contains("whole number"));
    assert!(limit.check("cycles", 0.0).unwrap().contains("at least 1"));
  }

  #[test]
  fn test_override_tightens_range() {
    let mut limits = ParameterLimits::declared();
    limits.apply_override(
      ExperimentType::Cva,
      "scan_rate",
      LimitOverride {
        min: None,
        max: Some(0.2),
      },
    );

    let limit = limits.get(ExperimentType::Cva, "scan_rate").unwrap();
    assert_eq!(limit.quantity, Quantity::ScanRate);
    assert!(limit.check("scan_rate", 0.5).is_some());
    assert!(limit.check("scan_rate", 0.2).is_none());
    // lower bound is still the declared exclusive zero
    assert!(limit.check("scan_rate", 0.0).is_some());
  }

  #[test]
  fn test_override_adds_parameter() {
    let mut limits = ParameterLimits::declared();
    limits.apply_override(
      ExperimentType::Ocv,
      "temperature",
      LimitOverride {
        min: Some(10.0),
        max: Some(80.0),
      },
    );

    assert!(limits.get(ExperimentType::Ocv, "temperature").is_some());
    assert_eq!(limits.for_type(ExperimentType::Ocv).count(), 3);
  }
}
