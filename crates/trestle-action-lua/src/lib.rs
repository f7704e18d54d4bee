//! Lua run-code action for trestle triggers.
//!
//! [`RunCodeAction`] runs the Lua source in a trigger's `code` configuration
//! inside a sandboxed interpreter. See [`sandbox`] for what scripts can see.

mod action;
pub mod sandbox;

pub use action::{RUN_CODE, RunCodeAction};
pub use sandbox::{RowEffect, ScriptError, ScriptInput, ScriptLimits, run_script};
