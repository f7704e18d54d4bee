use std::sync::Arc;

use tracing::{info, instrument};
use trestle_action::ActionRegistry;
use trestle_config::{DispatchConfig, WhenTrigger};
use trestle_store::{FieldRecord, NewField, RowFilter, RowRecord, Store, TableRecord};

use crate::error::TableError;
use crate::notifier;
use crate::triggers::Triggers;

/// Key under which a row's ID appears when a row is handed out.
const ID_KEY: &str = "id";

struct Inner {
  store: Arc<dyn Store>,
  registry: Arc<ActionRegistry>,
  config: DispatchConfig,
}

/// Handle to every table in a store.
///
/// Cheap to clone. Holds the store, the action registry that triggers resolve
/// against, and the dispatch settings.
#[derive(Clone)]
pub struct Tables {
  inner: Arc<Inner>,
}

impl Tables {
  pub fn new(store: Arc<dyn Store>, registry: Arc<ActionRegistry>, config: DispatchConfig) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        registry,
        config,
      }),
    }
  }

  pub(crate) fn store(&self) -> &dyn Store {
    self.inner.store.as_ref()
  }

  pub fn registry(&self) -> &ActionRegistry {
    &self.inner.registry
  }

  pub fn dispatch_config(&self) -> &DispatchConfig {
    &self.inner.config
  }

  /// Trigger record management for these tables.
  pub fn triggers(&self) -> Triggers {
    Triggers::new(self.inner.store.clone(), self.inner.registry.clone())
  }

  /// Create a table with the given fields.
  #[instrument(name = "create_table", skip(self, fields), fields(field_count = fields.len()))]
  pub async fn create_table(&self, name: &str, fields: &[NewField]) -> Result<Table, TableError> {
    validate_definition(name, fields)?;

    let record = self.store().create_table(name, fields).await?;
    let fields = self.store().list_fields(record.id).await?;
    info!(table_id = record.id, "table created");

    Ok(Table {
      tables: self.clone(),
      record,
      fields,
    })
  }

  /// Find a table by name.
  pub async fn find(&self, name: &str) -> Result<Table, TableError> {
    let record = self
      .store()
      .get_table_by_name(name)
      .await
      .map_err(|e| table_not_found(e, name))?;
    self.load(record).await
  }

  /// Get a table by ID.
  pub async fn get(&self, table_id: i64) -> Result<Table, TableError> {
    let record = self
      .store()
      .get_table(table_id)
      .await
      .map_err(|e| table_not_found(e, &table_id.to_string()))?;
    self.load(record).await
  }

  /// All tables, ordered by name.
  pub async fn list(&self) -> Result<Vec<TableRecord>, TableError> {
    Ok(self.store().list_tables().await?)
  }

  /// Delete a table with its fields, rows and triggers. No triggers run.
  #[instrument(name = "delete_table", skip(self))]
  pub async fn delete_table(&self, table_id: i64) -> Result<(), TableError> {
    self
      .store()
      .delete_table(table_id)
      .await
      .map_err(|e| table_not_found(e, &table_id.to_string()))?;
    info!("table deleted");
    Ok(())
  }

  async fn load(&self, record: TableRecord) -> Result<Table, TableError> {
    let fields = self.store().list_fields(record.id).await?;
    Ok(Table {
      tables: self.clone(),
      record,
      fields,
    })
  }
}

fn table_not_found(err: trestle_store::Error, what: &str) -> TableError {
  match err {
    trestle_store::Error::NotFound(_) => TableError::TableNotFound(what.to_string()),
    other => TableError::Store(other),
  }
}

fn validate_definition(name: &str, fields: &[NewField]) -> Result<(), TableError> {
  if name.trim().is_empty() {
    return Err(TableError::InvalidDefinition(
      "table name must not be empty".to_string(),
    ));
  }

  for (i, field) in fields.iter().enumerate() {
    if field.name.trim().is_empty() {
      return Err(TableError::InvalidDefinition(format!(
        "field {} has an empty name",
        i
      )));
    }
    if field.name.contains('"') {
      return Err(TableError::InvalidDefinition(format!(
        "field name {} must not contain '\"'",
        field.name
      )));
    }
    if field.name == ID_KEY {
      return Err(TableError::InvalidDefinition(format!(
        "'{}' is reserved for the row ID",
        ID_KEY
      )));
    }
    if fields[..i].iter().any(|f| f.name == field.name) {
      return Err(TableError::InvalidDefinition(format!(
        "duplicate field '{}'",
        field.name
      )));
    }
  }

  Ok(())
}

/// A table and its fields, bound to the [`Tables`] it was loaded from.
///
/// The three mutating operations persist first and then run the table's
/// triggers for that event before returning.
#[derive(Clone)]
pub struct Table {
  tables: Tables,
  record: TableRecord,
  fields: Vec<FieldRecord>,
}

impl std::fmt::Debug for Table {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Table")
      .field("record", &self.record)
      .field("fields", &self.fields)
      .finish()
  }
}

impl Table {
  pub fn id(&self) -> i64 {
    self.record.id
  }

  pub fn name(&self) -> &str {
    &self.record.name
  }

  pub fn record(&self) -> &TableRecord {
    &self.record
  }

  pub fn fields(&self) -> &[FieldRecord] {
    &self.fields
  }

  /// Insert a row and run the table's Insert triggers. Returns the new row ID.
  /// An `id` key in `data` is ignored.
  pub async fn insert_row(&self, data: serde_json::Value) -> Result<i64, TableError> {
    self.insert_row_at(data, 0).await
  }

  /// Merge `data` into row `id` and run the table's Update triggers with the
  /// full updated row. An `id` key in `data` must equal `id`.
  pub async fn update_row(&self, data: serde_json::Value, id: i64) -> Result<(), TableError> {
    self.update_row_at(data, id, 0).await
  }

  /// Delete every row matching `criteria`, then run the table's Delete
  /// triggers once per deleted row. Returns the number of rows deleted.
  ///
  /// `criteria` is a JSON object; a row matches when each key equals the
  /// row's value for it. `{}` matches every row. Rows another call deletes
  /// first are neither counted nor dispatched here.
  pub async fn delete_rows(&self, criteria: &serde_json::Value) -> Result<u64, TableError> {
    self.delete_rows_at(criteria, 0).await
  }

  /// The first row matching `criteria`, with its `id`.
  pub async fn get_row(
    &self,
    criteria: &serde_json::Value,
  ) -> Result<Option<serde_json::Value>, TableError> {
    Ok(
      self
        .matching(criteria, Some(1))
        .await?
        .first()
        .map(RowRecord::to_json),
    )
  }

  /// Every row matching `criteria`, in insertion order, each with its `id`.
  pub async fn get_rows(
    &self,
    criteria: &serde_json::Value,
  ) -> Result<Vec<serde_json::Value>, TableError> {
    Ok(
      self
        .matching(criteria, None)
        .await?
        .iter()
        .map(RowRecord::to_json)
        .collect(),
    )
  }

  #[instrument(name = "insert_row", skip(self, data), fields(table = %self.record.name))]
  pub(crate) async fn insert_row_at(
    &self,
    data: serde_json::Value,
    depth: u32,
  ) -> Result<i64, TableError> {
    self.check_depth(depth)?;
    let data = self.validate(self.strip_id(data, None)?, true)?;

    let id = self.tables.store().insert_row(self.record.id, &data).await?;
    info!(row_id = id, "row inserted");

    let row = with_id(data, id);
    notifier::dispatch(&self.tables, &self.record, WhenTrigger::Insert, &row, depth).await?;
    Ok(id)
  }

  #[instrument(name = "update_row", skip(self, data), fields(table = %self.record.name))]
  pub(crate) async fn update_row_at(
    &self,
    data: serde_json::Value,
    id: i64,
    depth: u32,
  ) -> Result<(), TableError> {
    self.check_depth(depth)?;
    let serde_json::Value::Object(changes) = self.strip_id(data, Some(id))? else {
      return Err(TableError::invalid_row(
        &self.record.name,
        "row data must be a JSON object",
      ));
    };

    let stored = self
      .tables
      .store()
      .get_row(self.record.id, id)
      .await
      .map_err(|e| match e {
        trestle_store::Error::NotFound(_) => TableError::RowNotFound {
          table: self.record.name.clone(),
          id,
        },
        other => TableError::Store(other),
      })?;

    let mut merged = match stored.data.0 {
      serde_json::Value::Object(map) => map,
      _ => serde_json::Map::new(),
    };
    merged.extend(changes);
    let data = self.validate(serde_json::Value::Object(merged), false)?;

    self
      .tables
      .store()
      .update_row(self.record.id, id, &data)
      .await?;
    info!(row_id = id, "row updated");

    let row = with_id(data, id);
    notifier::dispatch(&self.tables, &self.record, WhenTrigger::Update, &row, depth).await
  }

  #[instrument(name = "delete_rows", skip(self, criteria), fields(table = %self.record.name))]
  pub(crate) async fn delete_rows_at(
    &self,
    criteria: &serde_json::Value,
    depth: u32,
  ) -> Result<u64, TableError> {
    self.check_depth(depth)?;

    let rows = self.matching(criteria, None).await?;
    if rows.is_empty() {
      return Ok(0);
    }

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let deleted = self.tables.store().delete_rows(self.record.id, &ids).await?;
    info!(deleted = deleted.len(), "rows deleted");

    // rows removed by a concurrent delete are that call's to notify
    for row in rows.iter().filter(|r| deleted.contains(&r.id)) {
      notifier::dispatch(
        &self.tables,
        &self.record,
        WhenTrigger::Delete,
        &row.to_json(),
        depth,
      )
      .await?;
    }

    Ok(deleted.len() as u64)
  }

  fn check_depth(&self, depth: u32) -> Result<(), TableError> {
    let max_depth = self.tables.dispatch_config().max_depth;
    if depth > max_depth {
      return Err(TableError::DispatchDepthExceeded { depth, max_depth });
    }
    Ok(())
  }

  async fn matching(
    &self,
    criteria: &serde_json::Value,
    limit: Option<u32>,
  ) -> Result<Vec<RowRecord>, TableError> {
    match self.filter(criteria)? {
      Some(mut filter) => {
        filter.limit = limit;
        Ok(self.tables.store().find_rows(self.record.id, &filter).await?)
      }
      None => Ok(Vec::new()),
    }
  }

  /// Translate criteria into a store filter, or `None` if no row can match.
  fn filter(&self, criteria: &serde_json::Value) -> Result<Option<RowFilter>, TableError> {
    let serde_json::Value::Object(criteria) = criteria else {
      return Err(TableError::invalid_row(
        &self.record.name,
        "criteria must be a JSON object",
      ));
    };

    let mut filter = RowFilter::new();
    for (key, expected) in criteria {
      if key == ID_KEY {
        match expected.as_i64() {
          Some(id) => filter = filter.id(id),
          None => return Ok(None),
        }
      } else if self.fields.iter().any(|f| &f.name == key) {
        filter = filter.where_eq(key.as_str(), expected.clone());
      } else if !expected.is_null() {
        // rows never hold keys outside their fields
        return Ok(None);
      }
    }

    Ok(Some(filter))
  }

  /// Drop the `id` key from row data. Rows handed to actions carry their ID, so
  /// writing one back is allowed as long as it names the row being written.
  fn strip_id(
    &self,
    data: serde_json::Value,
    target: Option<i64>,
  ) -> Result<serde_json::Value, TableError> {
    let serde_json::Value::Object(mut map) = data else {
      return Ok(data);
    };

    match (map.remove(ID_KEY), target) {
      (Some(id), Some(target)) if id.as_i64() != Some(target) => Err(TableError::invalid_row(
        &self.record.name,
        format!("row ID {} cannot be changed to {}", target, id),
      )),
      _ => Ok(serde_json::Value::Object(map)),
    }
  }

  /// Check a row object against the table's fields.
  ///
  /// Unknown keys are rejected and non-null values must match the field type.
  /// Required fields must be present and non-null; on insert a missing
  /// required field is an error, on update the merged row is checked.
  fn validate(&self, data: serde_json::Value, insert: bool) -> Result<serde_json::Value, TableError> {
    let table = self.record.name.as_str();
    let serde_json::Value::Object(map) = &data else {
      return Err(TableError::invalid_row(
        table,
        "row data must be a JSON object",
      ));
    };

    for (key, value) in map {
      let Some(field) = self.fields.iter().find(|f| &f.name == key) else {
        return Err(TableError::invalid_row(
          table,
          format!("unknown field '{}'", key),
        ));
      };
      if !value.is_null() && !field.field_type.accepts(value) {
        return Err(TableError::invalid_row(
          table,
          format!("field '{}' expects {}, got {}", key, field.field_type, value),
        ));
      }
    }

    for field in self.fields.iter().filter(|f| f.required) {
      match map.get(&field.name) {
        Some(value) if !value.is_null() => {}
        Some(_) => {
          return Err(TableError::invalid_row(
            table,
            format!("required field '{}' is null", field.name),
          ));
        }
        None if insert => {
          return Err(TableError::invalid_row(
            table,
            format!("missing required field '{}'", field.name),
          ));
        }
        None => {}
      }
    }

    Ok(data)
  }
}

fn with_id(data: serde_json::Value, id: i64) -> serde_json::Value {
  let mut map = match data {
    serde_json::Value::Object(map) => map,
    _ => serde_json::Map::new(),
  };
  map.insert(ID_KEY.to_string(), serde_json::Value::from(id));
  serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
  use trestle_config::FieldType;

  use super::*;

  #[test]
  fn test_definition_rejects_id_field() {
    let fields = vec![NewField::new("id", FieldType::Integer)];
    assert!(matches!(
      validate_definition("books", &fields),
      Err(TableError::InvalidDefinition(_))
    ));
  }

  #[test]
  fn test_definition_rejects_duplicates() {
    let fields = vec![
      NewField::new("author", FieldType::String),
      NewField::new("author", FieldType::String),
    ];
    assert!(matches!(
      validate_definition("books", &fields),
      Err(TableError::InvalidDefinition(msg)) if msg.contains("duplicate")
    ));
  }

  #[test]
  fn test_definition_rejects_empty_name() {
    assert!(validate_definition("  ", &[]).is_err());
    assert!(validate_definition("books", &[]).is_ok());
  }

  #[test]
  fn test_definition_rejects_quoted_field_name() {
    let fields = vec![NewField::new("a\"b", FieldType::String)];
    assert!(matches!(
      validate_definition("books", &fields),
      Err(TableError::InvalidDefinition(_))
    ));
  }

  #[test]
  fn test_with_id() {
    let row = with_id(serde_json::json!({"author": "Leo"}), 4);
    assert_eq!(row, serde_json::json!({"author": "Leo", "id": 4}));
  }
}
