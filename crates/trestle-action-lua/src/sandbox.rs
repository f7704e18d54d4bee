//! Lua sandbox for trigger scripts.
//!
//! A script runs in a fresh interpreter with only the `table`, `string`,
//! `math` and `utf8` libraries plus a small host surface:
//!
//! | Global | Meaning |
//! |--------|---------|
//! | `row` | the affected row, including `id` |
//! | `config` | the trigger configuration |
//! | `table_name` | name of the table whose row changed |
//! | `event` | `"Insert"`, `"Update"` or `"Delete"` |
//! | `log(msg)` | write a log line |
//! | `db.insert_row(table, data)` | queue an insert |
//! | `db.update_row(table, id, data)` | queue an update |
//! | `db.delete_rows(table, criteria)` | queue a delete |
//!
//! `db` calls only queue [`RowEffect`]s. The caller applies them after the
//! script returns, so the interpreter never touches the database. Written
//! data may carry `id`: it is ignored on insert and must name the target row
//! on update, so `db.update_row(table_name, row.id, row)` is valid.
//!
//! Each run is bounded by [`ScriptLimits`]: a wall-clock deadline and a cap
//! on the interpreter's heap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use mlua::{HookTriggers, Lua, LuaOptions, LuaSerdeExt, SerializeOptions, StdLib, VmState};
use tracing::info;
use trestle_config::WhenTrigger;

/// Instructions executed between deadline checks.
const DEADLINE_CHECK_INTERVAL: u32 = 1_000;

/// Upper bound on queued writes per script.
const MAX_EFFECTS: usize = 1_000;

/// Base-library globals removed from the sandbox.
const REMOVED_GLOBALS: &[&str] = &["dofile", "loadfile", "load", "require", "collectgarbage", "print"];

/// A row write requested by a script.
#[derive(Debug, Clone, PartialEq)]
pub enum RowEffect {
  Insert {
    table: String,
    data: serde_json::Value,
  },
  Update {
    table: String,
    id: i64,
    data: serde_json::Value,
  },
  Delete {
    table: String,
    criteria: serde_json::Value,
  },
}

/// Errors raised by a script.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
  #[error("lua error: {0}")]
  Lua(#[from] mlua::Error),

  #[error("script exceeded its time budget")]
  Timeout,

  #[error("script exceeded its memory limit of {0} bytes")]
  MemoryLimit(usize),
}

/// Resource bounds for one script run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
  pub timeout: Duration,
  pub memory_bytes: usize,
}

impl ScriptLimits {
  pub const DEFAULT_MEMORY_BYTES: usize = 16 * 1024 * 1024;

  pub fn new(timeout: Duration) -> Self {
    Self {
      timeout,
      memory_bytes: Self::DEFAULT_MEMORY_BYTES,
    }
  }

  pub fn with_memory_bytes(mut self, memory_bytes: usize) -> Self {
    self.memory_bytes = memory_bytes;
    self
  }
}

/// What a script gets to see.
#[derive(Debug, Clone)]
pub struct ScriptInput {
  pub code: String,
  pub row: serde_json::Value,
  pub configuration: serde_json::Value,
  pub table_name: String,
  pub event: WhenTrigger,
}

/// Run a script to completion and return the writes it queued, in call order.
///
/// Blocks the calling thread; run it on the blocking pool.
pub fn run_script(input: &ScriptInput, limits: ScriptLimits) -> Result<Vec<RowEffect>, ScriptError> {
  let lua = Lua::new_with(
    StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
    LuaOptions::new(),
  )?;

  let deadline = Instant::now() + limits.timeout;
  let timed_out = Arc::new(AtomicBool::new(false));
  let flag = timed_out.clone();
  lua.set_hook(
    HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
    move |_lua, _debug| {
      if Instant::now() >= deadline {
        flag.store(true, Ordering::SeqCst);
        return Err(mlua::Error::RuntimeError(
          "script exceeded its time budget".to_string(),
        ));
      }
      Ok(VmState::Continue)
    },
  );

  let effects = Arc::new(Mutex::new(Vec::new()));
  install_globals(&lua, input, &effects)?;
  lua.set_memory_limit(limits.memory_bytes)?;

  match lua.load(input.code.as_str()).set_name("run_code").exec() {
    Ok(()) => {}
    Err(_) if timed_out.load(Ordering::SeqCst) => return Err(ScriptError::Timeout),
    Err(e) if is_memory_error(&e) => return Err(ScriptError::MemoryLimit(limits.memory_bytes)),
    Err(e) => return Err(ScriptError::Lua(e)),
  }

  let mut queued = effects
    .lock()
    .map_err(|_| mlua::Error::RuntimeError("effect queue poisoned".to_string()))?;

  Ok(std::mem::take(&mut *queued))
}

fn is_memory_error(err: &mlua::Error) -> bool {
  match err {
    mlua::Error::MemoryError(_) => true,
    mlua::Error::CallbackError { cause, .. } => is_memory_error(cause),
    _ => false,
  }
}

fn install_globals(
  lua: &Lua,
  input: &ScriptInput,
  effects: &Arc<Mutex<Vec<RowEffect>>>,
) -> mlua::Result<()> {
  let globals = lua.globals();
  for name in REMOVED_GLOBALS {
    globals.set(*name, mlua::Value::Nil)?;
  }

  // JSON null becomes nil so scripts can test fields with `== nil`
  let options = SerializeOptions::new()
    .serialize_none_to_null(false)
    .serialize_unit_to_null(false);
  globals.set("row", lua.to_value_with(&input.row, options)?)?;
  globals.set("config", lua.to_value_with(&input.configuration, options)?)?;
  globals.set("table_name", input.table_name.as_str())?;
  globals.set("event", input.event.as_str())?;

  globals.set(
    "log",
    lua.create_function(|_, message: String| {
      info!(target: "trestle::run_code", "{}", message);
      Ok(())
    })?,
  )?;

  let db = lua.create_table()?;

  let sink = effects.clone();
  db.set(
    "insert_row",
    lua.create_function(move |lua, (table, data): (String, mlua::Value)| {
      let data = lua.from_value(data)?;
      queue(&sink, RowEffect::Insert { table, data })
    })?,
  )?;

  let sink = effects.clone();
  db.set(
    "update_row",
    lua.create_function(move |lua, (table, id, data): (String, i64, mlua::Value)| {
      let data = lua.from_value(data)?;
      queue(&sink, RowEffect::Update { table, id, data })
    })?,
  )?;

  let sink = effects.clone();
  db.set(
    "delete_rows",
    lua.create_function(move |lua, (table, criteria): (String, mlua::Value)| {
      let criteria = lua.from_value(criteria)?;
      queue(&sink, RowEffect::Delete { table, criteria })
    })?,
  )?;

  globals.set("db", db)?;
  Ok(())
}

fn queue(sink: &Mutex<Vec<RowEffect>>, effect: RowEffect) -> mlua::Result<()> {
  let mut effects = sink
    .lock()
    .map_err(|_| mlua::Error::RuntimeError("effect queue poisoned".to_string()))?;

  if effects.len() >= MAX_EFFECTS {
    return Err(mlua::Error::RuntimeError(format!(
      "too many row writes (limit {})",
      MAX_EFFECTS
    )));
  }

  effects.push(effect);
  Ok(())
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn input(code: &str) -> ScriptInput {
    ScriptInput {
      code: code.to_string(),
      row: json!({"id": 4, "author": "Giuseppe Tomasi", "pages": 209, "note": null}),
      configuration: json!({"target": "patients"}),
      table_name: "books".to_string(),
      event: WhenTrigger::Insert,
    }
  }

  fn run(code: &str) -> Result<Vec<RowEffect>, ScriptError> {
    run_script(&input(code), ScriptLimits::new(Duration::from_millis(500)))
  }

  #[test]
  fn test_queues_insert() {
    let effects = run(r#"db.insert_row("patients", { name = "TriggeredInsert" })"#).unwrap();

    assert_eq!(
      effects,
      vec![RowEffect::Insert {
        table: "patients".to_string(),
        data: json!({"name": "TriggeredInsert"}),
      }]
    );
  }

  #[test]
  fn test_sees_row_and_config() {
    let effects = run(
      r#"
      if event == "Insert" and table_name == "books" and row.note == nil then
        db.update_row(config.target, row.id, { pages = row.pages + 1, author = row.author })
      end
      "#,
    )
    .unwrap();

    assert_eq!(
      effects,
      vec![RowEffect::Update {
        table: "patients".to_string(),
        id: 4,
        data: json!({"pages": 210, "author": "Giuseppe Tomasi"}),
      }]
    );
  }

  #[test]
  fn test_effects_keep_call_order() {
    let effects = run(
      r#"
      db.delete_rows("patients", { name = "old" })
      db.insert_row("patients", { name = "new" })
      "#,
    )
    .unwrap();

    assert!(matches!(effects[0], RowEffect::Delete { .. }));
    assert!(matches!(effects[1], RowEffect::Insert { .. }));
  }

  #[test]
  fn test_no_host_access() {
    for code in [
      "os.exit(1)",
      "io.open('/etc/passwd')",
      "dofile('/etc/passwd')",
      "require('socket')",
      "load('return 1')()",
    ] {
      assert!(
        matches!(run(code), Err(ScriptError::Lua(_))),
        "expected '{}' to fail",
        code
      );
    }
  }

  #[test]
  fn test_runtime_error() {
    let result = run(r#"error("boom")"#);
    match result {
      Err(ScriptError::Lua(e)) => assert!(e.to_string().contains("boom")),
      other => panic!("expected lua error, got {:?}", other),
    }
  }

  #[test]
  fn test_infinite_loop_times_out() {
    let limits = ScriptLimits::new(Duration::from_millis(50));
    let result = run_script(&input("while true do end"), limits);
    assert!(matches!(result, Err(ScriptError::Timeout)));
  }

  #[test]
  fn test_allocation_hits_memory_limit() {
    let code = r#"
      local t = {}
      for i = 1, 8 do
        t[i] = string.rep("x", 64 * 1024 * 1024)
      end
    "#;
    let limits = ScriptLimits::new(Duration::from_secs(5)).with_memory_bytes(16 * 1024 * 1024);

    let result = run_script(&input(code), limits);

    assert!(
      matches!(result, Err(ScriptError::MemoryLimit(limit)) if limit == 16 * 1024 * 1024),
      "expected memory limit, got {:?}",
      result
    );
  }

  #[test]
  fn test_small_allocations_fit() {
    let code = r#"
      local s = string.rep("x", 1024 * 1024)
      db.insert_row("patients", { name = tostring(#s) })
    "#;
    let limits = ScriptLimits::new(Duration::from_secs(1)).with_memory_bytes(8 * 1024 * 1024);

    let effects = run_script(&input(code), limits).unwrap();

    assert_eq!(
      effects,
      vec![RowEffect::Insert {
        table: "patients".to_string(),
        data: json!({"name": "1048576"}),
      }]
    );
  }
}
