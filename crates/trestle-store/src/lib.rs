//! Trestle Store
//!
//! This crate provides the storage trait and implementations for user-defined
//! tables, their rows, and the triggers attached to them. Data is persisted to
//! a database (SQLite).
//!
//! The [`Store`] trait defines operations for:
//! - Creating, listing and deleting tables and their fields
//! - Inserting, reading, updating and deleting rows
//! - Creating, listing, configuring and deleting triggers
//!
//! The store does no validation beyond what the schema enforces and never
//! runs triggers; that is the job of the table layer above it.

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{FieldRecord, NewField, NewTrigger, RowFilter, RowRecord, TableRecord, Trigger};

use async_trait::async_trait;
use trestle_config::WhenTrigger;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested record was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record with the same unique key already exists.
  #[error("already exists: {0}")]
  AlreadyExists(String),

  /// A stored value could not be decoded.
  #[error("failed to decode stored value: {0}")]
  Decode(String),

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  /// Running migrations failed.
  #[error("migration error: {0}")]
  Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Storage trait for tables, rows and triggers.
#[async_trait]
pub trait Store: Send + Sync {
  /// Create a table with its fields.
  async fn create_table(&self, name: &str, fields: &[NewField]) -> Result<TableRecord, Error>;

  /// Get a table by ID.
  async fn get_table(&self, table_id: i64) -> Result<TableRecord, Error>;

  /// Get a table by name.
  async fn get_table_by_name(&self, name: &str) -> Result<TableRecord, Error>;

  /// List all tables ordered by name.
  async fn list_tables(&self) -> Result<Vec<TableRecord>, Error>;

  /// Delete a table along with its fields, rows and triggers.
  async fn delete_table(&self, table_id: i64) -> Result<(), Error>;

  /// List the fields of a table in creation order.
  async fn list_fields(&self, table_id: i64) -> Result<Vec<FieldRecord>, Error>;

  /// Insert a row and return its ID.
  async fn insert_row(&self, table_id: i64, data: &serde_json::Value) -> Result<i64, Error>;

  /// Get a row by ID.
  async fn get_row(&self, table_id: i64, row_id: i64) -> Result<RowRecord, Error>;

  /// Replace the data of a row.
  async fn update_row(
    &self,
    table_id: i64,
    row_id: i64,
    data: &serde_json::Value,
  ) -> Result<(), Error>;

  /// List the rows of a table that pass `filter`, in insertion order.
  async fn find_rows(&self, table_id: i64, filter: &RowFilter) -> Result<Vec<RowRecord>, Error>;

  /// Delete rows by ID in a single transaction.
  ///
  /// Returns the IDs this call actually removed, in the order given. IDs that
  /// no longer exist (for example, deleted concurrently) are left out.
  async fn delete_rows(&self, table_id: i64, row_ids: &[i64]) -> Result<Vec<i64>, Error>;

  /// Create a new trigger.
  async fn create_trigger(&self, trigger: &NewTrigger) -> Result<Trigger, Error>;

  /// Get a trigger by ID.
  async fn get_trigger(&self, trigger_id: i64) -> Result<Trigger, Error>;

  /// Replace the configuration of a trigger.
  async fn update_trigger_configuration(
    &self,
    trigger_id: i64,
    configuration: &serde_json::Value,
  ) -> Result<(), Error>;

  /// Delete a trigger.
  async fn delete_trigger(&self, trigger_id: i64) -> Result<(), Error>;

  /// List all triggers of a table in creation order.
  async fn list_triggers(&self, table_id: i64) -> Result<Vec<Trigger>, Error>;

  /// List the triggers of a table for one event, in creation order.
  async fn list_triggers_for(
    &self,
    table_id: i64,
    when_trigger: WhenTrigger,
  ) -> Result<Vec<Trigger>, Error>;
}
