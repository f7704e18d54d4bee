//! Row-mutation notifier.
//!
//! Called by [`Table`](crate::Table) after a write has been persisted. Runs
//! the triggers for the table and event one after another, in creation order,
//! awaiting each action before starting the next.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument, warn};
use trestle_action::{ActionContext, ActionError, RowWriter, TableRef};
use trestle_config::{FailurePolicy, WhenTrigger};
use trestle_store::{TableRecord, Trigger};

use crate::error::TableError;
use crate::table::Tables;

/// Run every trigger registered for `(table, when)` against `row`.
///
/// `depth` is the nesting level of the write being notified; writes made by
/// the actions run here happen at `depth + 1`.
#[instrument(
  name = "dispatch",
  skip(tables, table, when, row),
  fields(table = %table.name, when = %when)
)]
pub(crate) async fn dispatch(
  tables: &Tables,
  table: &TableRecord,
  when: WhenTrigger,
  row: &serde_json::Value,
  depth: u32,
) -> Result<(), TableError> {
  let triggers = tables.store().list_triggers_for(table.id, when).await?;
  if triggers.is_empty() {
    return Ok(());
  }

  debug!(triggers = triggers.len(), "dispatching");

  let rows: Arc<dyn RowWriter> = Arc::new(ScopedWriter {
    tables: tables.clone(),
    depth: depth + 1,
  });
  let table_ref = TableRef {
    id: table.id,
    name: table.name.clone(),
  };

  for trigger in triggers {
    let ctx = ActionContext {
      trigger_id: trigger.id,
      table: table_ref.clone(),
      when,
      row: row.clone(),
      configuration: trigger.configuration.clone(),
      rows: rows.clone(),
    };

    match run_trigger(tables, &trigger, &ctx).await {
      Ok(()) => {
        info!(trigger_id = trigger.id, action = %trigger.action, "trigger completed");
      }
      Err(ActionError::UnknownAction { name }) => {
        error!(trigger_id = trigger.id, action = %name, "unknown action");
        return Err(TableError::UnknownAction {
          trigger_id: trigger.id,
          name,
        });
      }
      Err(e) => match tables.dispatch_config().failure_policy {
        FailurePolicy::Propagate => {
          error!(trigger_id = trigger.id, action = %trigger.action, error = %e, "trigger failed");
          return Err(TableError::Action {
            trigger_id: trigger.id,
            action: trigger.action,
            source: e,
          });
        }
        FailurePolicy::LogAndContinue => {
          warn!(trigger_id = trigger.id, action = %trigger.action, error = %e, "trigger failed, continuing");
        }
      },
    }
  }

  Ok(())
}

/// Resolve the trigger's action and run it within the action time budget.
async fn run_trigger(
  tables: &Tables,
  trigger: &Trigger,
  ctx: &ActionContext,
) -> Result<(), ActionError> {
  let action = tables.registry().lookup(&trigger.action)?;
  let timeout_ms = tables.dispatch_config().action_timeout_ms;

  match tokio::time::timeout(Duration::from_millis(timeout_ms), action.run(ctx)).await {
    Ok(result) => result,
    Err(_) => Err(ActionError::Timeout {
      action: trigger.action.clone(),
      timeout_ms,
    }),
  }
}

/// Row writer handed to actions. Writes go back through [`Table`](crate::Table)
/// one level deeper, so they are validated and fire their own triggers.
struct ScopedWriter {
  tables: Tables,
  depth: u32,
}

#[async_trait]
impl RowWriter for ScopedWriter {
  async fn insert_row(&self, table: &str, data: serde_json::Value) -> Result<i64, ActionError> {
    let table = self.tables.find(table).await.map_err(ActionError::row_write)?;
    table
      .insert_row_at(data, self.depth)
      .await
      .map_err(ActionError::row_write)
  }

  async fn update_row(
    &self,
    table: &str,
    id: i64,
    data: serde_json::Value,
  ) -> Result<(), ActionError> {
    let table = self.tables.find(table).await.map_err(ActionError::row_write)?;
    table
      .update_row_at(data, id, self.depth)
      .await
      .map_err(ActionError::row_write)
  }

  async fn delete_rows(
    &self,
    table: &str,
    criteria: serde_json::Value,
  ) -> Result<u64, ActionError> {
    let table = self.tables.find(table).await.map_err(ActionError::row_write)?;
    table
      .delete_rows_at(&criteria, self.depth)
      .await
      .map_err(ActionError::row_write)
  }
}
