use std::time::Duration;

use reqwest::{Client, Method};
use tracing::{debug, warn};

use crate::error::HttpError;
use crate::policy::HttpPolicy;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  /// Body parsed as JSON, or the raw text if it is not JSON.
  pub body: serde_json::Value,
}

/// Policy-checked HTTP client with per-attempt timeout and bounded retry.
#[derive(Debug, Clone)]
pub struct HttpClient {
  client: Client,
  policy: HttpPolicy,
  retries: u32,
  retry_delay: Duration,
}

impl HttpClient {
  /// Create a client. `retries` is the number of extra attempts after the first.
  pub fn new(policy: HttpPolicy, timeout: Duration, retries: u32) -> Result<Self, HttpError> {
    let client = Client::builder().timeout(timeout).build()?;

    Ok(Self {
      client,
      policy,
      retries,
      retry_delay: DEFAULT_RETRY_DELAY,
    })
  }

  /// Override the pause between attempts.
  pub fn with_retry_delay(mut self, delay: Duration) -> Self {
    self.retry_delay = delay;
    self
  }

  /// Send a JSON body, retrying transport failures and 5xx responses.
  pub async fn send_json(
    &self,
    method: Method,
    url: &str,
    body: &serde_json::Value,
  ) -> Result<HttpResponse, HttpError> {
    let url = self.policy.check(url)?;
    let mut attempt = 0;

    loop {
      attempt += 1;

      match self.send_once(method.clone(), url.clone(), body).await {
        Ok(response) => {
          debug!(url = %url, status = response.status, attempt, "request succeeded");
          return Ok(response);
        }
        Err(e) if e.is_retryable() && attempt <= self.retries => {
          warn!(url = %url, attempt, error = %e, "request failed, retrying");
          tokio::time::sleep(self.retry_delay).await;
        }
        Err(e) => return Err(e),
      }
    }
  }

  async fn send_once(
    &self,
    method: Method,
    url: url::Url,
    body: &serde_json::Value,
  ) -> Result<HttpResponse, HttpError> {
    let mut request = self.client.request(method.clone(), url);

    // GET and HEAD carry no body
    if method != Method::GET && method != Method::HEAD {
      request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
      return Err(HttpError::Status {
        status: status.as_u16(),
      });
    }

    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    Ok(HttpResponse {
      status: status.as_u16(),
      body,
    })
  }
}

/// Parse an HTTP method name.
pub fn parse_method(method: &str) -> Result<Method, HttpError> {
  match method.to_uppercase().as_str() {
    "GET" => Ok(Method::GET),
    "POST" => Ok(Method::POST),
    "PUT" => Ok(Method::PUT),
    "DELETE" => Ok(Method::DELETE),
    "PATCH" => Ok(Method::PATCH),
    "HEAD" => Ok(Method::HEAD),
    _ => Err(HttpError::InvalidMethod(method.to_string())),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_method() {
    assert_eq!(parse_method("post").unwrap(), Method::POST);
    assert_eq!(parse_method("Put").unwrap(), Method::PUT);
    assert!(matches!(
      parse_method("BREW"),
      Err(HttpError::InvalidMethod(_))
    ));
  }
}
