use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::action::Action;
use crate::error::ActionError;

/// A named bundle of actions, registered together.
pub struct Plugin {
  name: String,
  actions: Vec<(String, Arc<dyn Action>)>,
}

impl Plugin {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      actions: Vec::new(),
    }
  }

  /// Add an action under the given name.
  pub fn with_action(mut self, name: impl Into<String>, action: impl Action + 'static) -> Self {
    self.actions.push((name.into(), Arc::new(action)));
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  /// Names of the actions this plugin provides, in the order they were added.
  pub fn action_names(&self) -> impl Iterator<Item = &str> {
    self.actions.iter().map(|(name, _)| name.as_str())
  }
}

/// Maps action names to handlers.
///
/// Registration overwrites silently: the last handler registered under a name wins.
#[derive(Clone, Default)]
pub struct ActionRegistry {
  actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a handler, replacing any previous handler with the same name.
  pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
    let name = name.into();
    if self.actions.insert(name.clone(), action).is_some() {
      debug!(action = %name, "replaced registered action");
    } else {
      debug!(action = %name, "registered action");
    }
  }

  /// Register every action of a plugin.
  pub fn register_plugin(&mut self, plugin: Plugin) {
    debug!(plugin = %plugin.name, actions = plugin.actions.len(), "registering plugin");
    for (name, action) in plugin.actions {
      self.register(name, action);
    }
  }

  /// Look up a handler by name.
  pub fn lookup(&self, name: &str) -> Result<Arc<dyn Action>, ActionError> {
    self
      .actions
      .get(name)
      .cloned()
      .ok_or_else(|| ActionError::UnknownAction {
        name: name.to_string(),
      })
  }

  pub fn contains(&self, name: &str) -> bool {
    self.actions.contains_key(name)
  }

  /// Registered action names, sorted.
  pub fn names(&self) -> Vec<&str> {
    let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
    names.sort_unstable();
    names
  }
}

impl fmt::Debug for ActionRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ActionRegistry")
      .field("actions", &self.names())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use async_trait::async_trait;

  use super::*;
  use crate::action::{ActionContext, RowWriter, TableRef};
  use trestle_config::WhenTrigger;

  struct NoRows;

  #[async_trait]
  impl RowWriter for NoRows {
    async fn insert_row(&self, _table: &str, _data: serde_json::Value) -> Result<i64, ActionError> {
      Err(ActionError::execution("test", "no rows"))
    }

    async fn update_row(
      &self,
      _table: &str,
      _id: i64,
      _data: serde_json::Value,
    ) -> Result<(), ActionError> {
      Err(ActionError::execution("test", "no rows"))
    }

    async fn delete_rows(
      &self,
      _table: &str,
      _criteria: serde_json::Value,
    ) -> Result<u64, ActionError> {
      Err(ActionError::execution("test", "no rows"))
    }
  }

  fn context() -> ActionContext {
    ActionContext {
      trigger_id: 1,
      table: TableRef {
        id: 1,
        name: "patients".to_string(),
      },
      when: WhenTrigger::Insert,
      row: serde_json::json!({"id": 1}),
      configuration: serde_json::json!({}),
      rows: Arc::new(NoRows),
    }
  }

  struct Tagged {
    tag: usize,
    seen: Arc<AtomicUsize>,
  }

  #[async_trait]
  impl Action for Tagged {
    async fn run(&self, _ctx: &ActionContext) -> Result<(), ActionError> {
      self.seen.store(self.tag, Ordering::SeqCst);
      Ok(())
    }
  }

  fn tagged(tag: usize, seen: &Arc<AtomicUsize>) -> Arc<dyn Action> {
    Arc::new(Tagged {
      tag,
      seen: seen.clone(),
    })
  }

  #[test]
  fn test_lookup_unknown() {
    let registry = ActionRegistry::new();
    assert!(matches!(
      registry.lookup("nope"),
      Err(ActionError::UnknownAction { name }) if name == "nope"
    ));
  }

  #[tokio::test]
  async fn test_last_writer_wins() {
    let seen = Arc::new(AtomicUsize::new(0));
    let mut registry = ActionRegistry::new();
    registry.register("notify", tagged(1, &seen));
    registry.register("notify", tagged(2, &seen));

    assert_eq!(registry.names(), vec!["notify"]);

    let action = registry.lookup("notify").unwrap();
    action.run(&context()).await.unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 2);
  }

  #[test]
  fn test_register_plugin() {
    let seen = Arc::new(AtomicUsize::new(0));
    let plugin = Plugin::new("mock_plugin")
      .with_action(
        "b_action",
        Tagged {
          tag: 1,
          seen: seen.clone(),
        },
      )
      .with_action(
        "a_action",
        Tagged {
          tag: 2,
          seen: seen.clone(),
        },
      );
    assert_eq!(plugin.name(), "mock_plugin");
    assert_eq!(
      plugin.action_names().collect::<Vec<_>>(),
      vec!["b_action", "a_action"]
    );

    let mut registry = ActionRegistry::new();
    registry.register_plugin(plugin);

    assert_eq!(registry.names(), vec!["a_action", "b_action"]);
    assert!(registry.lookup("a_action").is_ok());
  }
}
