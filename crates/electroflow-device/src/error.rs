use std::time::Duration;

use thiserror::Error;

/// Errors raised by device collaborators.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DeviceError {
  /// The device could not be reached.
  #[error("{device} connection failed: {message}")]
  Connection { device: String, message: String },

  /// The device received the command but reported an error.
  #[error("{command} failed: {message}")]
  Command { command: String, message: String },

  /// The command did not finish in time.
  #[error("{command} timed out after {after:?}")]
  Timeout { command: String, after: Duration },

  /// The device refused the command outright; retrying will not help.
  #[error("{command} rejected: {message}")]
  Rejected { command: String, message: String },
}

impl DeviceError {
  pub fn connection(device: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Connection {
      device: device.into(),
      message: message.into(),
    }
  }

  pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Command {
      command: command.into(),
      message: message.into(),
    }
  }

  pub fn rejected(command: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Rejected {
      command: command.into(),
      message: message.into(),
    }
  }

  /// Whether the same command may succeed if sent again.
  pub fn is_retryable(&self) -> bool {
    !matches!(self, DeviceError::Rejected { .. })
  }
}
