use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};
use trestle_action::{Action, ActionContext, ActionError, RowWriter};
use trestle_config::RunCodeConfig;

use crate::sandbox::{RowEffect, ScriptError, ScriptInput, ScriptLimits, run_script};

pub const RUN_CODE: &str = "run_code";

#[derive(Deserialize)]
struct RunCodeSettings {
  code: String,
}

/// Runs a trigger's Lua script, then applies the row writes it queued.
pub struct RunCodeAction {
  limits: ScriptLimits,
}

impl RunCodeAction {
  /// A run-code action with the given time budget and the default memory limit.
  pub fn new(timeout: Duration) -> Self {
    Self {
      limits: ScriptLimits::new(timeout),
    }
  }

  pub fn with_memory_limit(mut self, memory_bytes: usize) -> Self {
    self.limits = self.limits.with_memory_bytes(memory_bytes);
    self
  }

  pub fn from_config(config: &RunCodeConfig) -> Self {
    Self::new(Duration::from_millis(config.timeout_ms)).with_memory_limit(config.memory_limit_bytes)
  }
}

#[async_trait]
impl Action for RunCodeAction {
  #[instrument(
    name = "run_code",
    skip(self, ctx),
    fields(trigger_id = ctx.trigger_id, table = %ctx.table.name)
  )]
  async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
    let settings: RunCodeSettings = ctx.config(RUN_CODE)?;
    let input = ScriptInput {
      code: settings.code,
      row: ctx.row.clone(),
      configuration: ctx.configuration.clone(),
      table_name: ctx.table.name.clone(),
      event: ctx.when,
    };

    let limits = self.limits;
    let effects = tokio::task::spawn_blocking(move || run_script(&input, limits))
      .await
      .map_err(|e| ActionError::execution(RUN_CODE, format!("script task failed: {}", e)))?
      .map_err(|e| match e {
        ScriptError::Timeout => ActionError::Timeout {
          action: RUN_CODE.to_string(),
          timeout_ms: limits.timeout.as_millis() as u64,
        },
        e @ ScriptError::MemoryLimit(_) => ActionError::execution(RUN_CODE, e.to_string()),
        ScriptError::Lua(e) => ActionError::execution(RUN_CODE, e.to_string()),
      })?;

    debug!(effects = effects.len(), "script finished");

    for effect in effects {
      apply(ctx.rows.as_ref(), effect).await?;
    }

    Ok(())
  }
}

async fn apply(rows: &dyn RowWriter, effect: RowEffect) -> Result<(), ActionError> {
  match effect {
    RowEffect::Insert { table, data } => {
      rows.insert_row(&table, data).await?;
    }
    RowEffect::Update { table, id, data } => {
      rows.update_row(&table, id, data).await?;
    }
    RowEffect::Delete { table, criteria } => {
      rows.delete_rows(&table, criteria).await?;
    }
  }

  Ok(())
}
