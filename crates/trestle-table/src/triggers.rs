use std::sync::Arc;

use tracing::{info, instrument, warn};
use trestle_action::ActionRegistry;
use trestle_config::WhenTrigger;
use trestle_store::{NewTrigger, Store, Trigger};

use crate::error::TableError;

/// Trigger record management.
///
/// Triggers bind a table event to a registered action. The action name is not
/// required to be registered when the trigger is created, only when it fires.
#[derive(Clone)]
pub struct Triggers {
  store: Arc<dyn Store>,
  registry: Arc<ActionRegistry>,
}

impl Triggers {
  pub(crate) fn new(store: Arc<dyn Store>, registry: Arc<ActionRegistry>) -> Self {
    Self { store, registry }
  }

  /// Create a trigger. Fails if the table does not exist.
  #[instrument(
    name = "create_trigger",
    skip(self, trigger),
    fields(action = %trigger.action, table_id = trigger.table_id, when = %trigger.when_trigger)
  )]
  pub async fn create(&self, trigger: NewTrigger) -> Result<Trigger, TableError> {
    if !self.registry.contains(&trigger.action) {
      warn!("action is not registered; the trigger will fail until it is");
    }

    let created = self
      .store
      .create_trigger(&trigger)
      .await
      .map_err(|e| match e {
        trestle_store::Error::NotFound(_) => TableError::TableNotFound(trigger.table_id.to_string()),
        other => TableError::Store(other),
      })?;

    info!(trigger_id = created.id, "trigger created");
    Ok(created)
  }

  /// Delete a trigger. It stops firing immediately.
  #[instrument(name = "delete_trigger", skip(self))]
  pub async fn delete(&self, trigger_id: i64) -> Result<(), TableError> {
    self.store.delete_trigger(trigger_id).await?;
    info!("trigger deleted");
    Ok(())
  }

  /// Replace a trigger's configuration payload.
  #[instrument(name = "configure_trigger", skip(self, configuration))]
  pub async fn configure(
    &self,
    trigger_id: i64,
    configuration: serde_json::Value,
  ) -> Result<Trigger, TableError> {
    self
      .store
      .update_trigger_configuration(trigger_id, &configuration)
      .await?;
    Ok(self.store.get_trigger(trigger_id).await?)
  }

  pub async fn get(&self, trigger_id: i64) -> Result<Trigger, TableError> {
    Ok(self.store.get_trigger(trigger_id).await?)
  }

  /// Triggers of a table for one event, in creation order.
  pub async fn list_for(
    &self,
    table_id: i64,
    when_trigger: WhenTrigger,
  ) -> Result<Vec<Trigger>, TableError> {
    Ok(self.store.list_triggers_for(table_id, when_trigger).await?)
  }

  /// Every trigger of a table, in creation order.
  pub async fn list(&self, table_id: i64) -> Result<Vec<Trigger>, TableError> {
    Ok(self.store.list_triggers(table_id).await?)
  }
}
