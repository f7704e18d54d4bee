use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use trestle_config::WhenTrigger;

use crate::error::ActionError;

/// The table a trigger belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
  pub id: i64,
  pub name: String,
}

/// Row writes available to actions.
///
/// Writes made through this handle go through the same table layer as any
/// other write, so they fire the target table's triggers in turn.
#[async_trait]
pub trait RowWriter: Send + Sync {
  /// Insert a row into the named table, returning its ID. An `id` key in
  /// `data` is ignored.
  async fn insert_row(&self, table: &str, data: serde_json::Value) -> Result<i64, ActionError>;

  /// Merge `data` into an existing row of the named table. An `id` key in
  /// `data` must equal `id`, so a received row can be written back as is.
  async fn update_row(
    &self,
    table: &str,
    id: i64,
    data: serde_json::Value,
  ) -> Result<(), ActionError>;

  /// Delete every row of the named table matching `criteria`.
  async fn delete_rows(&self, table: &str, criteria: serde_json::Value)
  -> Result<u64, ActionError>;
}

/// Everything an action gets to see for one invocation.
pub struct ActionContext {
  /// ID of the trigger being run.
  pub trigger_id: i64,
  /// Table whose row changed.
  pub table: TableRef,
  /// Event that fired the trigger.
  pub when: WhenTrigger,
  /// The affected row, with its `id`.
  pub row: serde_json::Value,
  /// The trigger's configuration payload.
  pub configuration: serde_json::Value,
  /// Write access to tables.
  pub rows: Arc<dyn RowWriter>,
}

impl ActionContext {
  /// Deserialize the configuration payload into the action's settings type.
  pub fn config<T: DeserializeOwned>(&self, action: &str) -> Result<T, ActionError> {
    serde_json::from_value(self.configuration.clone())
      .map_err(|e| ActionError::invalid_configuration(action, e.to_string()))
  }
}

/// A named capability that a trigger can run.
#[async_trait]
pub trait Action: Send + Sync {
  /// Run the action for one affected row.
  async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError>;
}
