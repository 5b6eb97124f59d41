//! Lua execution for scriptlet runs.
//!
//! A run evaluates untrusted script text against a
//! [`ChannelBridge`](scriptlet_channel::ChannelBridge). The script sees the
//! bridge as a global table (named `channel` by default) and nothing that
//! touches the file system, the process or the network.
//!
//! ```lua
//! local x = channel.read_input("x")
//! channel.write_output("y", 2 * x)
//! channel.write_state_variable("seen", channel.get_execution_count())
//! ```
//!
//! # Value Mapping
//!
//! | Lua | Channel [`Value`](scriptlet_channel::Value) |
//! |-----|------|
//! | `nil` | `Null` |
//! | boolean | `Bool` |
//! | integer | `Int` |
//! | number | `Float` (`math.huge`, `-math.huge`, NaN preserved) |
//! | string | `Str` |
//! | sequence table | `List` |
//! | other table | `Map` (string keys) |
//!
//! A table holding both sequence and keyed entries is an error.
//! Functions, userdata and threads are errors too.

mod convert;
mod sandbox;

pub use convert::{lua_to_value, value_to_lua};
pub use sandbox::{ExecutionResult, ScriptSandbox, SharedBridge, DEFAULT_BINDING_NAME};
