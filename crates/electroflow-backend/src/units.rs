use serde_json::Value;

/// Physical quantity of a parameter, which decides the accepted unit suffixes.
///
/// Values are normalised to SI base units: volts, volts per second, amperes,
/// hertz and seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantity {
  Voltage,
  ScanRate,
  Current,
  Frequency,
  Time,
  /// Dimensionless; only plain numbers are accepted.
  Count,
}

impl Quantity {
  /// Suffixes in match order, with their scale to the base unit.
  ///
  /// Matched case-insensitively, except where the milli/mega prefix is the
  /// only difference.
  fn units(self) -> &'static [Unit] {
    match self {
      Quantity::Voltage => VOLTAGE,
      Quantity::ScanRate => SCAN_RATE,
      Quantity::Current => CURRENT,
      Quantity::Frequency => FREQUENCY,
      Quantity::Time => TIME,
      Quantity::Count => &[],
    }
  }

  fn example(self) -> &'static str {
    match self {
      Quantity::Voltage => "\"0.5V\" or \"5mV\"",
      Quantity::ScanRate => "\"0.05V/s\" or \"50mV/s\"",
      Quantity::Current => "\"1mA\" or \"0.001A\"",
      Quantity::Frequency => "\"10mHz\", \"1Hz\" or \"100kHz\"",
      Quantity::Time => "\"500ms\", \"10s\" or \"2min\"",
      Quantity::Count => "a plain number",
    }
  }

  /// Convert a JSON number or unit string to a number in base units.
  pub fn normalise(self, value: &Value) -> Result<f64, String> {
    match value {
      Value::Number(n) => n
        .as_f64()
        .ok_or_else(|| format!("{} is not a finite number", n)),
      Value::String(s) => self.parse(s),
      other => Err(format!(
        "expected a number or {}, got {}",
        self.example(),
        other
      )),
    }
  }

  fn parse(self, raw: &str) -> Result<f64, String> {
    let text: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    let lower = text.to_ascii_lowercase();

    let (number, scale) = self
      .units()
      .iter()
      .find_map(|unit| {
        let matched = if unit.case_sensitive {
          text.ends_with(unit.suffix)
        } else {
          lower.ends_with(unit.suffix)
        };
        matched.then(|| (&text[..text.len() - unit.suffix.len()], unit.scale))
      })
      .unwrap_or((text.as_str(), 1.0));

    number
      .parse::<f64>()
      .ok()
      .filter(|v| v.is_finite())
      .map(|v| v * scale)
      .ok_or_else(|| format!("cannot read {:?}, expected {}", raw, self.example()))
  }
}

const VOLTAGE: &[Unit] = &[Unit::any("mv", 1e-3), Unit::any("v", 1.0)];
const SCAN_RATE: &[Unit] = &[Unit::any("mv/s", 1e-3), Unit::any("v/s", 1.0)];
const CURRENT: &[Unit] = &[Unit::any("ua", 1e-6), Unit::any("ma", 1e-3), Unit::any("a", 1.0)];
const FREQUENCY: &[Unit] = &[
  Unit::exact("mHz", 1e-3),
  Unit::exact("MHz", 1e6),
  Unit::any("khz", 1e3),
  Unit::any("hz", 1.0),
];
const TIME: &[Unit] = &[Unit::any("ms", 1e-3), Unit::any("min", 60.0), Unit::any("s", 1.0)];

struct Unit {
  suffix: &'static str,
  scale: f64,
  case_sensitive: bool,
}

impl Unit {
  const fn any(suffix: &'static str, scale: f64) -> Self {
    Self {
      suffix,
      scale,
      case_sensitive: false,
    }
  }

  const fn exact(suffix: &'static str, scale: f64) -> Self {
    Self {
      suffix,
      scale,
      case_sensitive: true,
    }
  }
}
