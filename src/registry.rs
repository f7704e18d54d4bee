use std::sync::Arc;

use anyhow::{Context, Result, bail};
use trestle_action::{ActionRegistry, Counter, WEBHOOK, WebhookAction, counter_plugin};
use trestle_action_lua::{RUN_CODE, RunCodeAction};
use trestle_config::AppConfig;

/// Plugins that can be enabled through the `plugins` list in `config.json`.
pub const KNOWN_PLUGINS: &[&str] = &["counter"];

/// Build the action registry from the configuration.
///
/// `webhook` is always available, `run_code` unless disabled, and each listed
/// plugin is registered in list order.
pub fn build(config: &AppConfig) -> Result<ActionRegistry> {
  let mut registry = ActionRegistry::new();

  let webhook =
    WebhookAction::from_config(&config.webhook).context("failed to create webhook client")?;
  registry.register(WEBHOOK, Arc::new(webhook));

  if config.run_code.enabled {
    registry.register(RUN_CODE, Arc::new(RunCodeAction::from_config(&config.run_code)));
  }

  for name in &config.plugins {
    match name.as_str() {
      // the counter lives for the duration of the process
      "counter" => registry.register_plugin(counter_plugin(Counter::new())),
      other => bail!(
        "unknown plugin '{}' (known plugins: {})",
        other,
        KNOWN_PLUGINS.join(", ")
      ),
    }
  }

  Ok(registry)
}
