//! Table layer error types.

use trestle_action::ActionError;

/// Errors that can occur while managing tables or mutating rows.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
  /// No table with this name or ID exists.
  #[error("table not found: {0}")]
  TableNotFound(String),

  /// No row with this ID exists in the table.
  #[error("row {id} not found in table '{table}'")]
  RowNotFound { table: String, id: i64 },

  /// A table or field definition is unusable.
  #[error("invalid table definition: {0}")]
  InvalidDefinition(String),

  /// Row data does not match the table's fields.
  #[error("invalid row for table '{table}': {message}")]
  InvalidRow { table: String, message: String },

  /// Persistence failed. No trigger was run.
  #[error("store error: {0}")]
  Store(#[from] trestle_store::Error),

  /// A trigger names an action that is not registered.
  #[error("trigger {trigger_id} names unknown action '{name}'")]
  UnknownAction { trigger_id: i64, name: String },

  /// An action run by a trigger failed. The write that fired it stands.
  #[error("trigger {trigger_id} action '{action}' failed: {source}")]
  Action {
    trigger_id: i64,
    action: String,
    #[source]
    source: ActionError,
  },

  /// Trigger-initiated writes nested deeper than allowed.
  #[error("dispatch depth {depth} exceeds the limit of {max_depth}")]
  DispatchDepthExceeded { depth: u32, max_depth: u32 },
}

impl TableError {
  pub(crate) fn invalid_row(table: &str, message: impl Into<String>) -> Self {
    Self::InvalidRow {
      table: table.to_string(),
      message: message.into(),
    }
  }
}
