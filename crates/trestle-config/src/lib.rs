//! Trestle Config
//!
//! Serializable types shared by every trestle crate:
//! - [`WhenTrigger`]: the row lifecycle event a trigger reacts to
//! - [`FieldType`]: the value type of a table field
//! - [`AppConfig`]: the application configuration file, loaded from the
//!   data directory with defaults for every section

mod app;
mod enums;

pub use app::{AppConfig, ConfigError, DispatchConfig, RunCodeConfig, WebhookConfig};
pub use enums::{FailurePolicy, FieldType, ParseEnumError, WhenTrigger};
