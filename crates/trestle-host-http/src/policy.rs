use url::Url;

use crate::error::HttpError;

/// Which hosts outbound requests may reach.
///
/// An empty allow-list permits every host. Only `http` and `https` URLs are
/// ever accepted.
#[derive(Debug, Clone, Default)]
pub struct HttpPolicy {
  allowed_hosts: Vec<String>,
}

impl HttpPolicy {
  /// A policy that permits every host.
  pub fn allow_all() -> Self {
    Self::default()
  }

  /// A policy that permits only the given hosts (compared case-insensitively).
  pub fn allow_hosts<I, S>(hosts: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    Self {
      allowed_hosts: hosts
        .into_iter()
        .map(|h| h.as_ref().to_ascii_lowercase())
        .collect(),
    }
  }

  /// Parse a URL and check it against the policy.
  pub fn check(&self, raw: &str) -> Result<Url, HttpError> {
    let url = Url::parse(raw).map_err(|e| HttpError::InvalidUrl {
      url: raw.to_string(),
      message: e.to_string(),
    })?;

    if url.scheme() != "http" && url.scheme() != "https" {
      return Err(HttpError::InvalidUrl {
        url: raw.to_string(),
        message: format!("unsupported scheme '{}'", url.scheme()),
      });
    }

    let host = url
      .host_str()
      .ok_or_else(|| HttpError::InvalidUrl {
        url: raw.to_string(),
        message: "missing host".to_string(),
      })?
      .to_ascii_lowercase();

    if !self.allowed_hosts.is_empty() && !self.allowed_hosts.contains(&host) {
      return Err(HttpError::Denied { host });
    }

    Ok(url)
  }
}
