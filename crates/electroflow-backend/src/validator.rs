use electroflow_config::Params;
use serde_json::Value;
use tracing::debug;

use crate::error::ValidationError;
use crate::experiment_type::ExperimentType;
use crate::limits::{Limit, ParameterLimits};
use crate::units::Quantity;

/// Board control keys accepted under `arduino_control`.
const BOARD_LIMITS: [(&str, &str, Limit); 3] = [
  ("base", "_temp", Limit::new(Quantity::Count).between(0.0, 100.0)),
  ("pump", "_ml", Limit::new(Quantity::Count).above(0.0)),
  ("ultrasonic", "_ms", Limit::new(Quantity::Count).at_least(0.0)),
];

/// Checks parameters against declared limits and normalises unit strings.
///
/// Absent parameters are fine; the backend falls back to its defaults.
/// Every violation is collected before reporting.
#[derive(Debug, Clone, Default)]
pub struct ParameterValidator {
  limits: ParameterLimits,
}

impl ParameterValidator {
  pub fn new(limits: ParameterLimits) -> Self {
    Self { limits }
  }

  pub fn limits(&self) -> &ParameterLimits {
    &self.limits
  }

  /// Validate `params` for `uo_type` and return the normalised snapshot.
  pub fn validate(&self, uo_type: ExperimentType, params: &Params) -> Result<Params, ValidationError> {
    let mut snapshot = params.clone();
    let mut errors = Vec::new();

    for (name, limit) in self.limits.for_type(uo_type) {
      let Some(raw) = params.get(name).filter(|v| !v.is_null()) else {
        continue;
      };
      match limit.quantity.normalise(raw) {
        Ok(value) => {
          if let Some(problem) = limit.check(name, value) {
            errors.push(problem);
          } else {
            snapshot.insert(name.to_string(), number(value, limit.integer));
          }
        }
        Err(problem) => errors.push(format!("{}: {}", name, problem)),
      }
    }

    if let Some(control) = params.get("arduino_control") {
      check_board_control(control, &mut errors);
    }

    if errors.is_empty() {
      debug!(uo_type = %uo_type, "parameters_valid");
      Ok(snapshot)
    } else {
      Err(ValidationError {
        uo_type: uo_type.to_string(),
        errors,
      })
    }
  }
}

fn check_board_control(control: &Value, errors: &mut Vec<String>) {
  let Some(control) = control.as_object() else {
    errors.push("arduino_control must be an object".to_string());
    return;
  };

  for (key, value) in control {
    let limit = BOARD_LIMITS.iter().find_map(|(prefix, suffix, limit)| {
      key
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_suffix(suffix))
        .filter(|n| n.parse::<u8>().is_ok())
        .map(|_| limit)
    });
    let Some(limit) = limit else {
      continue;
    };
    match value.as_f64() {
      Some(v) => errors.extend(limit.check(&format!("arduino_control.{}", key), v)),
      None => errors.push(format!("arduino_control.{} must be a number, got {}", key, value)),
    }
  }
}

fn number(value: f64, integer: bool) -> Value {
  if integer {
    Value::from(value as i64)
  } else {
    Value::from(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn params(value: Value) -> Params {
    value.as_object().cloned().unwrap_or_default()
  }

  #[test]
  fn test_normalises_units() {
    let validator = ParameterValidator::default();
    let snapshot = validator
      .validate(
        ExperimentType::Peis,
        &params(json!({
          "dc_voltage": "250mV",
          "ac_amplitude": "5mV",
          "frequency_start": "1Hz",
          "frequency_end": "100kHz",
          "electrolyte": "KOH"
        })),
      )
      .unwrap();

    assert_eq!(snapshot["frequency_end"], json!(100_000.0));
    assert_eq!(snapshot["dc_voltage"], json!(0.25));
    assert_eq!(snapshot["electrolyte"], json!("KOH"));
  }

  #[test]
  fn test_collects_all_errors() {
    let validator = ParameterValidator::default();
    let err = validator
      .validate(
        ExperimentType::Cva,
        &params(json!({
          "start_voltage": -3.0,
          "scan_rate": 2.0,
          "cycles": 0
        })),
      )
      .unwrap_err();

    assert_eq!(err.uo_type, "CVA");
    assert_eq!(err.errors.len(), 3);
  }

  #[test]
  fn test_wrong_type_is_an_error_but_absent_is_not() {
    let validator = ParameterValidator::default();
    assert!(validator.validate(ExperimentType::Ocv, &Params::new()).is_ok());

    let err = validator
      .validate(ExperimentType::Ocv, &params(json!({ "duration": [5] })))
      .unwrap_err();
    assert!(err.errors[0].starts_with("duration"));
  }

  #[test]
  fn test_board_control_limits() {
    let validator = ParameterValidator::default();
    let err = validator
      .validate(
        ExperimentType::Ocv,
        &params(json!({
          "arduino_control": {
            "base0_temp": 120,
            "pump0_ml": 0,
            "ultrasonic0_ms": 0,
            "lights": "on"
          }
        })),
      )
      .unwrap_err();

    assert_eq!(err.errors.len(), 2);
    assert!(err.to_string().contains("arduino_control.base0_temp"));
  }

  #[test]
  fn test_integer_snapshot() {
    let validator = ParameterValidator::default();
    let snapshot = validator
      .validate(ExperimentType::Cva, &params(json!({ "cycles": 3.0 })))
      .unwrap();
    assert_eq!(snapshot["cycles"], json!(3));
  }
}
