use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::Json;
use trestle_config::{FieldType, WhenTrigger};

use crate::Error;

/// A user-defined table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TableRecord {
  pub id: i64,
  pub name: String,
  pub created_at: DateTime<Utc>,
}

/// A field (column) of a user-defined table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRecord {
  pub id: i64,
  pub table_id: i64,
  pub name: String,
  pub label: String,
  pub field_type: FieldType,
  pub required: bool,
}

/// Field definition used when creating a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewField {
  pub name: String,
  pub label: String,
  pub field_type: FieldType,
  #[serde(default)]
  pub required: bool,
}

impl NewField {
  /// A nullable field whose label is its name.
  pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
    let name = name.into();
    Self {
      label: name.clone(),
      name,
      field_type,
      required: false,
    }
  }

  pub fn required(mut self) -> Self {
    self.required = true;
    self
  }
}

/// A stored row. `data` is always a JSON object and never contains `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RowRecord {
  pub id: i64,
  pub table_id: i64,
  pub data: Json<serde_json::Value>,
}

impl RowRecord {
  /// The row as a single JSON object with `id` merged in.
  pub fn to_json(&self) -> serde_json::Value {
    let mut object = match &self.data.0 {
      serde_json::Value::Object(map) => map.clone(),
      _ => serde_json::Map::new(),
    };
    object.insert("id".to_string(), serde_json::Value::from(self.id));
    serde_json::Value::Object(object)
  }
}

/// Equality filter over the rows of one table.
///
/// A row passes when its ID equals `id` (if set) and, for every `(key, value)`
/// in `equals`, the row's value under `key` is the same JSON value. A missing
/// key counts as `null`. Keys must not contain `"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
  pub id: Option<i64>,
  pub equals: Vec<(String, serde_json::Value)>,
  pub limit: Option<u32>,
}

impl RowFilter {
  /// A filter that passes every row.
  pub fn new() -> Self {
    Self::default()
  }

  pub fn id(mut self, id: i64) -> Self {
    self.id = Some(id);
    self
  }

  pub fn where_eq(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
    self.equals.push((key.into(), value));
    self
  }

  pub fn limit(mut self, limit: u32) -> Self {
    self.limit = Some(limit);
    self
  }
}

/// A stored trigger binding a table event to an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
  pub id: i64,
  pub action: String,
  pub table_id: i64,
  pub when_trigger: WhenTrigger,
  pub configuration: serde_json::Value,
  pub created_at: DateTime<Utc>,
}

/// Trigger definition used when creating a trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrigger {
  pub action: String,
  pub table_id: i64,
  pub when_trigger: WhenTrigger,
  #[serde(default = "empty_object")]
  pub configuration: serde_json::Value,
}

impl NewTrigger {
  /// A trigger with an empty configuration.
  pub fn new(action: impl Into<String>, table_id: i64, when_trigger: WhenTrigger) -> Self {
    Self {
      action: action.into(),
      table_id,
      when_trigger,
      configuration: empty_object(),
    }
  }

  pub fn with_configuration(mut self, configuration: serde_json::Value) -> Self {
    self.configuration = configuration;
    self
  }
}

fn empty_object() -> serde_json::Value {
  serde_json::Value::Object(serde_json::Map::new())
}

/// Database shape of a field; enum columns are stored as text.
#[derive(FromRow)]
pub(crate) struct FieldRow {
  id: i64,
  table_id: i64,
  name: String,
  label: String,
  field_type: String,
  required: bool,
}

impl TryFrom<FieldRow> for FieldRecord {
  type Error = Error;

  fn try_from(row: FieldRow) -> Result<Self, Self::Error> {
    Ok(Self {
      id: row.id,
      table_id: row.table_id,
      name: row.name,
      label: row.label,
      field_type: row
        .field_type
        .parse()
        .map_err(|e: trestle_config::ParseEnumError| Error::Decode(e.to_string()))?,
      required: row.required,
    })
  }
}

/// Database shape of a trigger; enum columns are stored as text.
#[derive(FromRow)]
pub(crate) struct TriggerRow {
  id: i64,
  action: String,
  table_id: i64,
  when_trigger: String,
  configuration: Json<serde_json::Value>,
  created_at: DateTime<Utc>,
}

impl TryFrom<TriggerRow> for Trigger {
  type Error = Error;

  fn try_from(row: TriggerRow) -> Result<Self, Self::Error> {
    Ok(Self {
      id: row.id,
      action: row.action,
      table_id: row.table_id,
      when_trigger: row
        .when_trigger
        .parse()
        .map_err(|e: trestle_config::ParseEnumError| Error::Decode(e.to_string()))?,
      configuration: row.configuration.0,
      created_at: row.created_at,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_row_to_json_merges_id() {
    let row = RowRecord {
      id: 7,
      table_id: 1,
      data: Json(json!({"name": "Don Fabrizio"})),
    };

    assert_eq!(row.to_json(), json!({"id": 7, "name": "Don Fabrizio"}));
  }

  #[test]
  fn test_new_trigger_defaults_to_empty_configuration() {
    let trigger: NewTrigger =
      serde_json::from_value(json!({"action": "webhook", "table_id": 1, "when_trigger": "Insert"}))
        .unwrap();

    assert_eq!(trigger, NewTrigger::new("webhook", 1, WhenTrigger::Insert));
    assert_eq!(trigger.configuration, json!({}));
  }
}
