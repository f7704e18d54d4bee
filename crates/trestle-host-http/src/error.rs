use thiserror::Error;

/// Errors that can occur when making an outbound request.
#[derive(Debug, Error)]
pub enum HttpError {
  /// The URL could not be parsed or uses an unsupported scheme.
  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  /// The policy does not allow requests to this host.
  #[error("requests to host '{host}' are not allowed")]
  Denied { host: String },

  /// Unsupported HTTP method.
  #[error("unsupported HTTP method: {0}")]
  InvalidMethod(String),

  /// The request could not be sent or the response could not be read.
  #[error("request failed: {0}")]
  Request(#[from] reqwest::Error),

  /// The server answered with a non-success status.
  #[error("server responded with HTTP {status}")]
  Status { status: u16 },
}

impl HttpError {
  /// Whether another attempt may succeed.
  pub fn is_retryable(&self) -> bool {
    match self {
      HttpError::Request(_) => true,
      HttpError::Status { status } => *status >= 500,
      _ => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_retryable() {
    assert!(HttpError::Status { status: 503 }.is_retryable());
    assert!(!HttpError::Status { status: 404 }.is_retryable());
    assert!(
      !HttpError::Denied {
        host: "example.com".to_string()
      }
      .is_retryable()
    );
  }
}
