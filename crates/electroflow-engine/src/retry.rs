use std::time::Duration;

/// How often and how patiently a failing step is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Extra attempts after the first.
  pub retry_count: u32,
  /// Pause between attempts.
  pub retry_delay: Duration,
}

impl RetryPolicy {
  pub const fn none() -> Self {
    Self {
      retry_count: 0,
      retry_delay: Duration::ZERO,
    }
  }

  pub const fn new(retry_count: u32, retry_delay: Duration) -> Self {
    Self {
      retry_count,
      retry_delay,
    }
  }

  /// Total attempts including the first.
  pub fn max_attempts(&self) -> u32 {
    self.retry_count.saturating_add(1)
  }

  /// Fill in whatever a node left unset from this policy.
  pub fn with_overrides(self, retry_count: Option<u32>, retry_delay: Option<Duration>) -> Self {
    Self {
      retry_count: retry_count.unwrap_or(self.retry_count),
      retry_delay: retry_delay.unwrap_or(self.retry_delay),
    }
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(1, Duration::from_secs(5))
  }
}
