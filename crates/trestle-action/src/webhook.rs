//! Webhook action: sends the affected row to a URL.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use trestle_config::WebhookConfig;
use trestle_host_http::{HttpClient, HttpError, HttpPolicy, parse_method};

use crate::action::{Action, ActionContext};
use crate::error::ActionError;

pub const WEBHOOK: &str = "webhook";

/// Expected configuration for webhook triggers.
#[derive(Debug, Deserialize)]
struct WebhookSettings {
  url: String,
  #[serde(default = "default_method")]
  method: String,
  /// Fail the action (instead of warning) when the request fails.
  #[serde(default)]
  strict: bool,
}

fn default_method() -> String {
  "POST".to_string()
}

/// Sends the affected row as a JSON body.
///
/// Delivery failures that survive the client's retries are logged and
/// swallowed unless the trigger sets `strict`. Misconfiguration (bad URL,
/// denied host, bad method) always fails.
pub struct WebhookAction {
  client: HttpClient,
}

impl WebhookAction {
  pub fn new(client: HttpClient) -> Self {
    Self { client }
  }

  /// Build the action with a client configured from the webhook section.
  pub fn from_config(config: &WebhookConfig) -> Result<Self, HttpError> {
    let policy = if config.allowed_hosts.is_empty() {
      HttpPolicy::allow_all()
    } else {
      HttpPolicy::allow_hosts(&config.allowed_hosts)
    };
    let client = HttpClient::new(
      policy,
      Duration::from_millis(config.timeout_ms),
      config.retries,
    )?;

    Ok(Self::new(client))
  }
}

#[async_trait]
impl Action for WebhookAction {
  #[instrument(
    name = "webhook",
    skip(self, ctx),
    fields(trigger_id = ctx.trigger_id, table = %ctx.table.name)
  )]
  async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
    let settings: WebhookSettings = ctx.config(WEBHOOK)?;
    let method = parse_method(&settings.method)?;

    match self.client.send_json(method, &settings.url, &ctx.row).await {
      Ok(response) => {
        info!(url = %settings.url, status = response.status, "webhook delivered");
        Ok(())
      }
      Err(
        e @ (HttpError::InvalidUrl { .. } | HttpError::Denied { .. } | HttpError::InvalidMethod(_)),
      ) => Err(e.into()),
      Err(e) if settings.strict => Err(e.into()),
      Err(e) => {
        warn!(url = %settings.url, error = %e, "webhook delivery failed");
        Ok(())
      }
    }
  }
}
