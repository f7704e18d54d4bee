//! Application configuration.
//!
//! Loaded from `config.json` in the data directory. Every section and field
//! has a default, so an empty object (or a missing file) is a valid config:
//!
//! ```json
//! {
//!   "dispatch": { "failure_policy": "log_and_continue", "max_depth": 4 },
//!   "webhook": { "timeout_ms": 5000, "allowed_hosts": ["hooks.example.com"] },
//!   "run_code": { "timeout_ms": 500, "memory_limit_bytes": 8388608 },
//!   "plugins": ["counter"]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::enums::FailurePolicy;

/// Errors that can occur while loading the configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("failed to read config file: {0}")]
  Io(#[from] std::io::Error),

  #[error("failed to parse config file: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub dispatch: DispatchConfig,
  pub webhook: WebhookConfig,
  pub run_code: RunCodeConfig,
  /// Names of optional plugins to register at startup.
  pub plugins: Vec<String>,
}

impl AppConfig {
  /// Load the config from a JSON file, falling back to defaults if it does not exist.
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      return Ok(Self::default());
    }

    let content = std::fs::read_to_string(path)?;
    Self::from_json(&content)
  }

  pub fn from_json(content: &str) -> Result<Self, ConfigError> {
    Ok(serde_json::from_str(content)?)
  }
}

/// Settings for the row-mutation notifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
  pub failure_policy: FailurePolicy,
  /// Maximum nesting of trigger-initiated writes.
  pub max_depth: u32,
  /// Upper bound on a single action invocation.
  pub action_timeout_ms: u64,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      failure_policy: FailurePolicy::Propagate,
      max_depth: 8,
      action_timeout_ms: 30_000,
    }
  }
}

/// Settings for the webhook action's HTTP client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
  pub timeout_ms: u64,
  /// Extra attempts after the first one fails with a transport error or 5xx.
  pub retries: u32,
  /// Hosts webhooks may call. Empty allows every host.
  pub allowed_hosts: Vec<String>,
}

impl Default for WebhookConfig {
  fn default() -> Self {
    Self {
      timeout_ms: 10_000,
      retries: 1,
      allowed_hosts: Vec::new(),
    }
  }
}

/// Settings for the sandboxed run-code action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCodeConfig {
  pub enabled: bool,
  /// Wall-clock budget for a single script.
  pub timeout_ms: u64,
  /// Heap a single script's interpreter may allocate.
  pub memory_limit_bytes: usize,
}

impl Default for RunCodeConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      timeout_ms: 1_000,
      memory_limit_bytes: 16 * 1024 * 1024,
    }
  }
}
