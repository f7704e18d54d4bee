//! Counter plugin.
//!
//! Two demonstration actions that act on an injected [`Counter`] rather than
//! process-wide state, so each test or deployment owns its own counter.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use crate::action::{Action, ActionContext};
use crate::error::ActionError;
use crate::registry::Plugin;

pub const INCREMENT_COUNTER: &str = "increment_counter";
pub const SET_COUNTER: &str = "set_counter";

/// A shared integer counter. Clones share the same value.
#[derive(Debug, Clone, Default)]
pub struct Counter(Arc<AtomicI64>);

impl Counter {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self) -> i64 {
    self.0.load(Ordering::SeqCst)
  }

  pub fn set(&self, value: i64) {
    self.0.store(value, Ordering::SeqCst);
  }

  /// Add one and return the new value.
  pub fn increment(&self) -> i64 {
    self.0.fetch_add(1, Ordering::SeqCst) + 1
  }

  pub fn reset(&self) {
    self.set(0);
  }
}

/// Adds one to the counter.
pub struct IncrementCounter {
  counter: Counter,
}

impl IncrementCounter {
  pub fn new(counter: Counter) -> Self {
    Self { counter }
  }
}

#[async_trait]
impl Action for IncrementCounter {
  async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
    let value = self.counter.increment();
    info!(trigger_id = ctx.trigger_id, value, "counter incremented");
    Ok(())
  }
}

#[derive(Deserialize)]
struct SetCounterSettings {
  number: i64,
}

/// Sets the counter to `configuration.number`.
pub struct SetCounter {
  counter: Counter,
}

impl SetCounter {
  pub fn new(counter: Counter) -> Self {
    Self { counter }
  }
}

#[async_trait]
impl Action for SetCounter {
  async fn run(&self, ctx: &ActionContext) -> Result<(), ActionError> {
    let settings: SetCounterSettings = ctx.config(SET_COUNTER)?;
    self.counter.set(settings.number);
    info!(trigger_id = ctx.trigger_id, value = settings.number, "counter set");
    Ok(())
  }
}

/// A plugin providing `increment_counter` and `set_counter` over one counter.
pub fn counter_plugin(counter: Counter) -> Plugin {
  Plugin::new("counter")
    .with_action(INCREMENT_COUNTER, IncrementCounter::new(counter.clone()))
    .with_action(SET_COUNTER, SetCounter::new(counter))
}
