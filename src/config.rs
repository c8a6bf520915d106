//! Station configuration read from `electroflow.toml`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use electroflow_backend::{ExperimentType, LimitOverride, ParameterLimits};
use electroflow_engine::{DispatcherConfig, ExecutorConfig, RetryPolicy};
use electroflow_store::RetentionPolicy;
use serde::Deserialize;

pub const CONFIG_FILE: &str = "electroflow.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub engine: EngineConfig,
  pub results: ResultsConfig,
  pub tracker: TrackerConfig,
  /// `[limits.CVA.scan_rate] max = 0.5`
  pub limits: BTreeMap<String, BTreeMap<String, LimitOverride>>,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
  #[default]
  Sequential,
  Parallel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub strategy: StrategyKind,
  pub max_concurrency: usize,
  pub measurement_timeout_secs: u64,
  pub device_timeout_secs: u64,
  /// Unset waits for the operator indefinitely.
  pub confirmation_timeout_secs: Option<u64>,
  pub default_retry_count: u32,
  pub default_retry_delay_secs: f64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      strategy: StrategyKind::Sequential,
      max_concurrency: 4,
      measurement_timeout_secs: 3600,
      device_timeout_secs: 60,
      confirmation_timeout_secs: None,
      default_retry_count: 1,
      default_retry_delay_secs: 5.0,
    }
  }
}

impl EngineConfig {
  pub fn dispatcher(&self) -> Result<DispatcherConfig> {
    ensure!(
      self.measurement_timeout_secs > 0,
      "engine.measurement_timeout_secs must be greater than zero"
    );
    let retry_delay = Duration::try_from_secs_f64(self.default_retry_delay_secs)
      .context("engine.default_retry_delay_secs must be a non-negative number")?;
    Ok(DispatcherConfig {
      measurement_timeout: Duration::from_secs(self.measurement_timeout_secs),
      retry: RetryPolicy::new(self.default_retry_count, retry_delay),
    })
  }

  pub fn executor(&self) -> ExecutorConfig {
    ExecutorConfig {
      confirmation_timeout: self.confirmation_timeout_secs.map(Duration::from_secs),
    }
  }

  pub fn device_timeout(&self) -> Result<Duration> {
    ensure!(
      self.device_timeout_secs > 0,
      "engine.device_timeout_secs must be greater than zero"
    );
    Ok(Duration::from_secs(self.device_timeout_secs))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResultsConfig {
  /// Defaults to `<data_dir>/results`.
  pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
  pub max_entries: Option<usize>,
  pub ttl_secs: Option<u64>,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    let retention = RetentionPolicy::default();
    Self {
      max_entries: retention.max_entries,
      ttl_secs: retention.ttl.map(|ttl| ttl.as_secs()),
    }
  }
}

impl TrackerConfig {
  pub fn retention(&self) -> RetentionPolicy {
    RetentionPolicy {
      max_entries: self.max_entries,
      ttl: self.ttl_secs.map(Duration::from_secs),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  pub level: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
    }
  }
}

impl AppConfig {
  /// Read the config file, or defaults if it does not exist.
  pub fn load(path: &Path) -> Result<Self> {
    if !path.exists() {
      return Ok(Self::default());
    }
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read config file: {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("failed to parse config file: {}", path.display()))
  }

  /// Declared limits with the configured overrides applied.
  pub fn parameter_limits(&self) -> Result<ParameterLimits> {
    let mut limits = ParameterLimits::declared();
    for (uo_type, params) in &self.limits {
      let uo_type: ExperimentType = uo_type
        .parse()
        .with_context(|| format!("invalid [limits.{}] section", uo_type))?;
      for (param, bounds) in params {
        limits.apply_override(uo_type, param, *bounds);
      }
    }
    Ok(limits)
  }

  pub fn results_dir(&self, data_dir: &Path) -> PathBuf {
    self
      .results
      .dir
      .clone()
      .unwrap_or_else(|| data_dir.join("results"))
  }
}

/// `~/.electroflow`, or the working directory if there is no home.
pub fn default_data_dir() -> PathBuf {
  dirs::home_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join(".electroflow")
}
