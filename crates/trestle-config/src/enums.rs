use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Error returned when parsing one of the enums below from text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {kind}: '{value}'")]
pub struct ParseEnumError {
  pub kind: &'static str,
  pub value: String,
}

/// Row lifecycle event that activates a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WhenTrigger {
  Insert,
  Update,
  Delete,
}

impl WhenTrigger {
  pub fn as_str(&self) -> &'static str {
    match self {
      WhenTrigger::Insert => "Insert",
      WhenTrigger::Update => "Update",
      WhenTrigger::Delete => "Delete",
    }
  }
}

impl fmt::Display for WhenTrigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for WhenTrigger {
  type Err = ParseEnumError;

  /// Case-insensitive, so CLI input like `insert` parses too.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "insert" => Ok(WhenTrigger::Insert),
      "update" => Ok(WhenTrigger::Update),
      "delete" => Ok(WhenTrigger::Delete),
      _ => Err(ParseEnumError {
        kind: "trigger event",
        value: s.to_string(),
      }),
    }
  }
}

/// Value type of a table field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
  String,
  Integer,
  Float,
  Bool,
}

impl FieldType {
  pub fn as_str(&self) -> &'static str {
    match self {
      FieldType::String => "string",
      FieldType::Integer => "integer",
      FieldType::Float => "float",
      FieldType::Bool => "bool",
    }
  }

  /// Whether a JSON value is acceptable for a field of this type.
  ///
  /// Null is handled by the caller (required vs optional), so it is rejected here.
  pub fn accepts(&self, value: &serde_json::Value) -> bool {
    match self {
      FieldType::String => value.is_string(),
      FieldType::Integer => value.is_i64() || value.is_u64(),
      FieldType::Float => value.is_number(),
      FieldType::Bool => value.is_boolean(),
    }
  }
}

impl fmt::Display for FieldType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for FieldType {
  type Err = ParseEnumError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "string" => Ok(FieldType::String),
      "integer" | "int" => Ok(FieldType::Integer),
      "float" => Ok(FieldType::Float),
      "bool" | "boolean" => Ok(FieldType::Bool),
      _ => Err(ParseEnumError {
        kind: "field type",
        value: s.to_string(),
      }),
    }
  }
}

/// What the notifier does when a trigger's action fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
  /// Return the first action error to the caller of the row mutation.
  #[default]
  Propagate,
  /// Log the error and keep dispatching the remaining triggers.
  LogAndContinue,
}
