use std::f64::consts::PI;

use async_trait::async_trait;
use electroflow_config::Params;
use serde_json::{Value, json};

use crate::backend::Backend;
use crate::error::BackendError;
use crate::experiment_type::ExperimentType;

const MAX_POINTS: usize = 1000;

/// Potentiostat stand-in producing deterministic synthetic data.
///
/// Results have a `data` section with the traces and a `summary` section
/// with scalar values that workflow conditions can test.
pub struct SimulatedBackend {
  technique: ExperimentType,
  connected: bool,
}

impl SimulatedBackend {
  pub fn new(technique: ExperimentType) -> Self {
    Self {
      technique,
      connected: false,
    }
  }

  pub fn is_connected(&self) -> bool {
    self.connected
  }
}

#[async_trait]
impl Backend for SimulatedBackend {
  fn experiment_type(&self) -> ExperimentType {
    self.technique
  }

  async fn connect(&mut self) -> Result<(), BackendError> {
    self.connected = true;
    Ok(())
  }

  fn validate_parameters(&self, params: &Params) -> Vec<String> {
    let mut errors = Vec::new();
    match self.technique {
      ExperimentType::Ocv | ExperimentType::Cp => {
        if let (Some(interval), Some(duration)) = (num(params, "sample_interval"), num(params, "duration")) {
          if interval > duration {
            errors.push(format!(
              "sample_interval ({}) must not exceed duration ({})",
              interval, duration
            ));
          }
        }
        if self.technique == ExperimentType::Cp && num(params, "current") == Some(0.0) {
          errors.push("current must not be zero".to_string());
        }
      }
      ExperimentType::Peis => {
        if let (Some(start), Some(end)) = (num(params, "frequency_start"), num(params, "frequency_end")) {
          if start >= end {
            errors.push(format!(
              "frequency_start ({}) must be below frequency_end ({})",
              start, end
            ));
          }
        }
      }
      ExperimentType::Cva | ExperimentType::Lsv => {}
    }
    errors
  }

  async fn execute_measurement(&mut self, params: &Params) -> Result<Value, BackendError> {
    if !self.connected {
      return Err(BackendError::Connection(format!(
        "{} potentiostat is not connected",
        self.technique
      )));
    }

    let mut result = match self.technique {
      ExperimentType::Ocv => open_circuit(params),
      ExperimentType::Cp => chronopotentiometry(params),
      ExperimentType::Cva => cyclic_voltammetry(params),
      ExperimentType::Lsv => linear_sweep(params),
      ExperimentType::Peis => impedance(params),
    };

    if let Some(obj) = result.as_object_mut() {
      obj.insert("technique".to_string(), json!(self.technique.as_str()));
    }
    Ok(result)
  }

  async fn disconnect(&mut self) -> Result<(), BackendError> {
    self.connected = false;
    Ok(())
  }
}

fn num(params: &Params, key: &str) -> Option<f64> {
  params.get(key).and_then(Value::as_f64)
}

fn samples(duration: f64, interval: f64) -> Vec<f64> {
  let count = ((duration / interval).floor() as usize + 1).min(MAX_POINTS);
  (0..count).map(|i| i as f64 * interval).collect()
}

fn mean(values: &[f64]) -> f64 {
  if values.is_empty() {
    0.0
  } else {
    values.iter().sum::<f64>() / values.len() as f64
  }
}

/// Potential relaxing towards a rest value.
fn open_circuit(params: &Params) -> Value {
  let duration = num(params, "duration").unwrap_or(10.0);
  let interval = num(params, "sample_interval").unwrap_or(1.0);
  let time = samples(duration, interval);
  let voltage: Vec<f64> = time
    .iter()
    .map(|t| 0.85 + 0.1 * (-t / duration.max(f64::EPSILON)).exp())
    .collect();

  json!({
    "data": { "time": time, "voltage": voltage },
    "summary": {
      "final_voltage": voltage.last().copied().unwrap_or(0.0),
      "mean_voltage": mean(&voltage),
      "points": voltage.len(),
    }
  })
}

fn chronopotentiometry(params: &Params) -> Value {
  let current = num(params, "current").unwrap_or(0.001);
  let duration = num(params, "duration").unwrap_or(10.0);
  let interval = num(params, "sample_interval").unwrap_or(1.0);
  let time = samples(duration, interval);
  // 50 ohm cell with a slow polarisation term
  let potential: Vec<f64> = time
    .iter()
    .map(|t| 0.4 + current * 50.0 + current.signum() * 0.02 * (1.0 + t).ln())
    .collect();

  json!({
    "data": { "time": time, "potential": potential },
    "summary": {
      "current": current,
      "final_potential": potential.last().copied().unwrap_or(0.0),
      "mean_potential": mean(&potential),
      "points": potential.len(),
    }
  })
}

/// Butler-Volmer-like current for a sweep point.
fn faradaic_current(voltage: f64, scan_rate: f64) -> f64 {
  let capacitive = 1e-4 * scan_rate;
  capacitive + 1e-3 * ((voltage - 0.2) * 8.0).sinh() * 0.01
}

fn sweep(start: f64, end: f64, steps: usize) -> Vec<f64> {
  (0..=steps)
    .map(|i| start + (end - start) * i as f64 / steps as f64)
    .collect()
}

fn cyclic_voltammetry(params: &Params) -> Value {
  let start = num(params, "start_voltage").unwrap_or(-0.5);
  let end = num(params, "end_voltage").unwrap_or(0.5);
  let scan_rate = num(params, "scan_rate").unwrap_or(0.05);
  let cycles = num(params, "cycles").unwrap_or(1.0).max(1.0) as usize;
  let steps = (MAX_POINTS / (2 * cycles)).max(2);

  let mut voltage = Vec::new();
  for _ in 0..cycles {
    voltage.extend(sweep(start, end, steps));
    voltage.extend(sweep(end, start, steps));
  }
  let current: Vec<f64> = voltage
    .iter()
    .map(|v| faradaic_current(*v, scan_rate))
    .collect();
  let peak = current.iter().copied().fold(f64::MIN, f64::max);

  json!({
    "data": { "voltage": voltage, "current": current },
    "summary": {
      "cycles": cycles,
      "peak_current": peak,
      "points": current.len(),
    }
  })
}

fn linear_sweep(params: &Params) -> Value {
  let start = num(params, "start_voltage").unwrap_or(0.0);
  let end = num(params, "end_voltage").unwrap_or(1.0);
  let scan_rate = num(params, "scan_rate").unwrap_or(0.05);

  let voltage = sweep(start, end, MAX_POINTS - 1);
  let current: Vec<f64> = voltage
    .iter()
    .map(|v| faradaic_current(*v, scan_rate))
    .collect();
  let peak = current.iter().copied().fold(f64::MIN, f64::max);
  // first point where the current exceeds 1 uA
  let onset = voltage
    .iter()
    .zip(&current)
    .find(|(_, i)| i.abs() > 1e-6)
    .map(|(v, _)| *v);

  json!({
    "data": { "voltage": voltage, "current": current },
    "summary": {
      "peak_current": peak,
      "onset_voltage": onset,
      "points": current.len(),
    }
  })
}

/// Randles cell: solution resistance in series with charge transfer || double layer.
fn impedance(params: &Params) -> Value {
  const SOLUTION_RESISTANCE: f64 = 20.0;
  const CHARGE_TRANSFER_RESISTANCE: f64 = 150.0;
  const DOUBLE_LAYER_CAPACITANCE: f64 = 2e-5;

  let f_start = num(params, "frequency_start").unwrap_or(1.0);
  let f_end = num(params, "frequency_end").unwrap_or(100_000.0);
  let points = 50usize;
  let (lo, hi) = (f_start.min(f_end).log10(), f_start.max(f_end).log10());

  let mut frequency = Vec::with_capacity(points);
  let mut z_real = Vec::with_capacity(points);
  let mut z_imag = Vec::with_capacity(points);
  for i in 0..points {
    let f = 10f64.powf(hi - (hi - lo) * i as f64 / (points - 1) as f64);
    let omega = 2.0 * PI * f;
    let wrc = omega * CHARGE_TRANSFER_RESISTANCE * DOUBLE_LAYER_CAPACITANCE;
    let denom = 1.0 + wrc * wrc;
    frequency.push(f);
    z_real.push(SOLUTION_RESISTANCE + CHARGE_TRANSFER_RESISTANCE / denom);
    z_imag.push(-CHARGE_TRANSFER_RESISTANCE * wrc / denom);
  }

  json!({
    "data": { "frequency": frequency, "z_real": z_real, "z_imag": z_imag },
    "summary": {
      "solution_resistance": SOLUTION_RESISTANCE,
      "charge_transfer_resistance": CHARGE_TRANSFER_RESISTANCE,
      "points": points,
    }
  })
}
