//! Trestle Actions
//!
//! An action is a named side effect that a trigger runs when a row in its
//! table is inserted, updated or deleted. This crate provides:
//!
//! - the [`Action`] trait and the [`ActionContext`] handed to every invocation
//! - the [`ActionRegistry`], mapping action names to handlers
//! - [`Plugin`], a named bundle of actions registered in one call
//! - built-in executors: [`WebhookAction`] and the counter plugin
//!
//! The registry is built once at startup from the list of enabled plugins and
//! then shared read-only:
//!
//! ```ignore
//! let mut registry = ActionRegistry::new();
//! registry.register(WEBHOOK, Arc::new(WebhookAction::from_config(&config.webhook)?));
//! registry.register_plugin(counter_plugin(Counter::new()));
//! let registry = Arc::new(registry);
//! ```

mod action;
mod counter;
mod error;
mod registry;
mod webhook;

pub use action::{Action, ActionContext, RowWriter, TableRef};
pub use counter::{Counter, INCREMENT_COUNTER, IncrementCounter, SET_COUNTER, SetCounter, counter_plugin};
pub use error::ActionError;
pub use registry::{ActionRegistry, Plugin};
pub use webhook::{WEBHOOK, WebhookAction};
