//! Sandboxed execution of user scripts against a channel bridge.
//!
//! # Security Model
//!
//! Each run gets a fresh Lua VM and a **whitelist-only** environment table.
//! The chunk sees the bridge table (under the configured binding name),
//! a captured `print`, core language functions and the `math`, `string`
//! and `table` libraries. `os`, `io`, `debug`, `require`, `load`,
//! `loadfile`, `dofile` and `package` are not present.
//!
//! An optional instruction-count hook aborts runaway scripts. It is off by
//! default; timeouts are the host's business.
//!
//! # Failure
//!
//! Compile errors, runtime errors, contract violations raised by the
//! bridge and `fail(reason)` all end up in [`ExecutionResult::error_detail`].
//! [`ScriptSandbox::execute`] never returns an error and never panics on
//! script input.

use crate::convert::{lua_to_value, names_to_lua, value_to_lua};
use mlua::{HookTriggers, Lua, MultiValue, Result as LuaResult, Table, Value as LuaValue};
use scriptlet_channel::{ChannelBridge, ChannelError, Value};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use tracing::{debug, info};

/// Default name the bridge is bound to inside scripts.
pub const DEFAULT_BINDING_NAME: &str = "channel";

/// Chunk name reported in Lua error positions.
const CHUNK_NAME: &str = "=userscript";

/// Bridge shared between the worker and the closures registered in Lua.
pub type SharedBridge = Rc<RefCell<ChannelBridge>>;

/// Outcome of one sandboxed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Whether the script ran to completion.
    pub succeeded: bool,
    /// Why it did not.
    pub error_detail: Option<String>,
}

impl ExecutionResult {
    #[must_use]
    pub fn success() -> Self {
        Self {
            succeeded: true,
            error_detail: None,
        }
    }

    #[must_use]
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}

/// Compiles and runs script text with only the bridge in scope.
#[derive(Debug, Clone)]
pub struct ScriptSandbox {
    binding_name: String,
    instruction_limit: Option<u32>,
}

impl Default for ScriptSandbox {
    fn default() -> Self {
        Self {
            binding_name: DEFAULT_BINDING_NAME.to_string(),
            instruction_limit: None,
        }
    }
}

impl ScriptSandbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the global name the bridge is bound to.
    #[must_use]
    pub fn with_binding_name(mut self, name: impl Into<String>) -> Self {
        self.binding_name = name.into();
        self
    }

    /// Aborts scripts after `limit` VM instructions. `Some(0)` means no limit.
    #[must_use]
    pub fn with_instruction_limit(mut self, limit: Option<u32>) -> Self {
        self.instruction_limit = limit.filter(|n| *n > 0);
        self
    }

    #[must_use]
    pub fn binding_name(&self) -> &str {
        &self.binding_name
    }

    #[must_use]
    pub fn instruction_limit(&self) -> Option<u32> {
        self.instruction_limit
    }

    /// Runs `source` against `bridge`.
    ///
    /// The VM is dropped before returning, so the caller holds the only
    /// reference to `bridge` afterwards.
    pub fn execute(&self, source: &str, bridge: &SharedBridge) -> ExecutionResult {
        match self.run(source, bridge) {
            Ok(()) => {
                debug!("Script finished");
                ExecutionResult::success()
            }
            Err(e) => {
                let detail = format_lua_error(&e);
                info!(error = %detail, "Script failed");
                ExecutionResult::failure(detail)
            }
        }
    }

    fn run(&self, source: &str, bridge: &SharedBridge) -> LuaResult<()> {
        let lua = Lua::new();
        let env = build_sandbox_env(&lua, &self.binding_name, bridge)?;
        let chunk = lua.load(source).set_name(CHUNK_NAME).set_environment(env);

        if let Some(limit) = self.instruction_limit {
            lua.set_hook(
                HookTriggers::new().every_nth_instruction(limit),
                move |_lua, _debug| {
                    Err(mlua::Error::RuntimeError(format!(
                        "instruction limit exceeded ({limit})"
                    )))
                },
            );
        }

        chunk.exec()
    }
}

/// Builds the whitelist-only environment table.
fn build_sandbox_env(lua: &Lua, binding_name: &str, bridge: &SharedBridge) -> LuaResult<Table> {
    let env = lua.create_table()?;

    let print_fn = lua.create_function(|_, args: MultiValue| {
        let line = args.iter().map(lua_display).collect::<Vec<_>>().join("\t");
        debug!(target: "scriptlet::script", "{line}");
        let mut stdout = std::io::stdout().lock();
        // Console output is best effort; a closed stdout must not fail the run.
        let _ = writeln!(stdout, "{line}");
        let _ = stdout.flush();
        Ok(())
    })?;
    env.set("print", print_fn)?;

    let globals = lua.globals();
    for name in &[
        "tostring",
        "tonumber",
        "type",
        "pairs",
        "ipairs",
        "next",
        "select",
        "error",
        "pcall",
        "xpcall",
        "assert",
        "rawget",
        "rawset",
        "rawlen",
        "rawequal",
        "setmetatable",
        "getmetatable",
        "math",
        "string",
        "table",
    ] {
        let value: LuaValue = globals.get(*name)?;
        if !value.is_nil() {
            env.set(*name, value)?;
        }
    }

    env.set(binding_name, build_bridge_table(lua, bridge)?)?;
    Ok(env)
}

/// Registers every bridge operation as a function on a fresh table.
fn build_bridge_table(lua: &Lua, bridge: &SharedBridge) -> LuaResult<Table> {
    let table = lua.create_table()?;

    let b = Rc::clone(bridge);
    table.set(
        "read_input",
        lua.create_function(move |lua, (name, default): (String, Option<LuaValue>)| {
            let default = default.map(lua_to_value).transpose()?;
            let value = b.borrow().read_input(&name, default).map_err(raise)?;
            value_to_lua(lua, &value)
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "write_output",
        lua.create_function(move |_, (name, value): (String, LuaValue)| {
            let value = lua_to_value(value)?;
            b.borrow_mut().write_output(&name, value).map_err(raise)
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "write_not_a_value_output",
        lua.create_function(move |_, name: String| {
            b.borrow_mut()
                .write_not_a_value_output(&name)
                .map_err(raise)
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "close_output",
        lua.create_function(move |_, name: String| {
            b.borrow_mut().close_output(&name).map_err(raise)
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "close_all_outputs",
        lua.create_function(move |_, ()| {
            b.borrow_mut().close_all_outputs();
            Ok(())
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "read_state_variable",
        lua.create_function(move |lua, (name, default): (String, Option<LuaValue>)| {
            let default = default.map(lua_to_value).transpose()?;
            let value = b.borrow_mut().read_state_variable(&name, default);
            value_to_lua(lua, &value)
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "write_state_variable",
        lua.create_function(move |_, (name, value): (String, LuaValue)| {
            let value = lua_to_value(value)?;
            b.borrow_mut().write_state_variable(&name, value);
            Ok(())
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "create_input_file",
        lua.create_function(move |_, (file_name, contents): (String, String)| {
            let path = b
                .borrow_mut()
                .create_input_file(&file_name, contents)
                .map_err(raise)?;
            Ok(path.display().to_string())
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "get_output_names",
        lua.create_function(move |lua, ()| names_to_lua(lua, &b.borrow().output_names()))?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "get_input_names_with_datum",
        lua.create_function(move |lua, ()| {
            names_to_lua(lua, &b.borrow().input_names_with_datum())
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "get_all_input_names",
        lua.create_function(move |lua, ()| names_to_lua(lua, &b.borrow().all_input_names()))?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "get_execution_count",
        lua.create_function(move |_, ()| Ok(b.borrow().execution_count()))?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "get_state_dict",
        lua.create_function(move |lua, ()| {
            value_to_lua(lua, &Value::Map(b.borrow().state_dict()))
        })?,
    )?;

    let b = Rc::clone(bridge);
    table.set(
        "fail",
        lua.create_function(move |_, reason: Option<String>| -> LuaResult<()> {
            let reason = reason.unwrap_or_else(|| "script called fail()".to_string());
            Err(raise(b.borrow().fail(reason)))
        })?,
    )?;

    Ok(table)
}

fn raise(err: ChannelError) -> mlua::Error {
    mlua::Error::external(err)
}

/// Convert a Lua value to a display string (for print()).
fn lua_display(value: &LuaValue) -> String {
    match value {
        LuaValue::Nil => "nil".to_string(),
        LuaValue::Boolean(b) => b.to_string(),
        LuaValue::Integer(i) => i.to_string(),
        LuaValue::Number(n) => {
            if n.is_finite() && *n == (*n as i64) as f64 {
                format!("{}.0", *n as i64)
            } else {
                format!("{n}")
            }
        }
        LuaValue::String(s) => s
            .to_str()
            .map_or_else(|_| "<invalid utf8>".into(), |s| s.to_string()),
        LuaValue::Table(_) => format!("table: {:p}", value.to_pointer()),
        LuaValue::Function(_) => format!("function: {:p}", value.to_pointer()),
        _ => format!("{value:?}"),
    }
}

/// Format an mlua::Error into the detail reported to the host.
fn format_lua_error(err: &mlua::Error) -> String {
    match err {
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::ExternalError(inner) => inner.to_string(),
        mlua::Error::SyntaxError { message, .. } => format!("compile error: {message}"),
        _ => format!("{err}"),
    }
}
