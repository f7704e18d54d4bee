//! Action error types.

use trestle_host_http::HttpError;

/// Errors that can occur while resolving or running an action.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
  /// No handler is registered under this name.
  #[error("unknown action: {name}")]
  UnknownAction { name: String },

  /// The trigger's configuration does not fit the action.
  #[error("invalid configuration for action '{action}': {message}")]
  InvalidConfiguration { action: String, message: String },

  /// The handler ran and failed.
  #[error("action '{action}' failed: {message}")]
  Execution { action: String, message: String },

  /// The handler did not finish within its time budget.
  #[error("action '{action}' timed out after {timeout_ms}ms")]
  Timeout { action: String, timeout_ms: u64 },

  /// Outbound HTTP failed.
  #[error("http error: {0}")]
  Http(#[from] HttpError),

  /// A row write requested by the action failed.
  #[error("row write failed: {source}")]
  RowWrite {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
  },
}

impl ActionError {
  /// Create an execution error.
  pub fn execution(action: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Execution {
      action: action.into(),
      message: message.into(),
    }
  }

  /// Create an invalid configuration error.
  pub fn invalid_configuration(action: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidConfiguration {
      action: action.into(),
      message: message.into(),
    }
  }

  /// Wrap an error raised by the row writer.
  pub fn row_write(source: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::RowWrite {
      source: Box::new(source),
    }
  }
}
