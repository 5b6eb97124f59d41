//! Channel bridge: the only API a script sees.
//!
//! The bridge pairs an immutable [`ChannelSnapshot`] with a fresh
//! [`OutputAccumulator`]. Every operation validates against the snapshot
//! and records effects in the accumulator; nothing reaches disk until the
//! serializer runs.
//!
//! # Operations
//!
//! | Operation | Effect |
//! |-----------|--------|
//! | `read_input(name, default)` | input value, default, or contract error |
//! | `write_output(name, value)` | append to a declared output |
//! | `write_not_a_value_output(name)` | append the not-a-value sentinel |
//! | `close_output(name)` / `close_all_outputs()` | record closed outputs |
//! | `read_state_variable(name, default)` | stored value, stored default, or null |
//! | `write_state_variable(name, value)` | upsert |
//! | `create_input_file(name, contents)` | stage a generated file |
//! | `fail(reason)` | abort the run |

use crate::accumulator::OutputAccumulator;
use crate::error::ChannelError;
use crate::snapshot::ChannelSnapshot;
use crate::value::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::trace;

/// Default sub-directory for generated input files when none is configured.
const DEFAULT_GENERATED_DIR: &str = "generated";

/// Script-facing view of one run's channel state.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    snapshot: ChannelSnapshot,
    accumulator: OutputAccumulator,
    generated_dir: PathBuf,
}

impl ChannelBridge {
    /// Binds a fresh accumulator to `snapshot`.
    #[must_use]
    pub fn new(snapshot: ChannelSnapshot) -> Self {
        let accumulator = OutputAccumulator::new(snapshot.state_variables().clone());
        Self {
            snapshot,
            accumulator,
            generated_dir: PathBuf::from(DEFAULT_GENERATED_DIR),
        }
    }

    /// Sets the directory reported for generated input files.
    #[must_use]
    pub fn with_generated_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.generated_dir = dir.into();
        self
    }

    #[must_use]
    pub fn snapshot(&self) -> &ChannelSnapshot {
        &self.snapshot
    }

    #[must_use]
    pub fn accumulator(&self) -> &OutputAccumulator {
        &self.accumulator
    }

    /// Consumes the bridge, handing over the run's effects.
    #[must_use]
    pub fn into_accumulator(self) -> OutputAccumulator {
        self.accumulator
    }

    /// Reads an input.
    ///
    /// Required-if-connected inputs return `default` when given and fail
    /// otherwise. Other inputs return their loaded value; `default` does not
    /// rescue an input that has no value.
    ///
    /// # Errors
    ///
    /// [`ChannelError::InputNotConnected`] or [`ChannelError::InputNotDefined`].
    pub fn read_input(&self, name: &str, default: Option<Value>) -> Result<Value, ChannelError> {
        if self.snapshot.required_if_connected().contains(name) {
            return default.ok_or_else(|| ChannelError::input_not_connected(name));
        }
        self.snapshot
            .inputs()
            .get(name)
            .cloned()
            .ok_or_else(|| ChannelError::input_not_defined(name))
    }

    /// Appends `value` to a declared output.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UndeclaredOutput`]; the accumulator is left untouched.
    pub fn write_output(&mut self, name: &str, value: Value) -> Result<(), ChannelError> {
        self.ensure_declared(name)?;
        trace!(output = name, kind = value.type_name(), "write_output");
        self.accumulator.push_value(name, value);
        Ok(())
    }

    /// Appends the not-a-value sentinel to a declared output.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UndeclaredOutput`].
    pub fn write_not_a_value_output(&mut self, name: &str) -> Result<(), ChannelError> {
        self.ensure_declared(name)?;
        self.accumulator.push_value(name, Value::not_a_value());
        Ok(())
    }

    /// Closes a declared output. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// [`ChannelError::UndeclaredOutput`].
    pub fn close_output(&mut self, name: &str) -> Result<(), ChannelError> {
        self.ensure_declared(name)?;
        self.accumulator.close(name);
        Ok(())
    }

    /// Closes every declared output.
    pub fn close_all_outputs(&mut self) {
        for name in self.snapshot.declared_outputs() {
            self.accumulator.close(name);
        }
    }

    /// Reads a state variable.
    ///
    /// A stored value wins. Otherwise a given default is stored and
    /// returned, and without a default the result is [`Value::Null`] with
    /// nothing stored.
    pub fn read_state_variable(&mut self, name: &str, default: Option<Value>) -> Value {
        let state = self.accumulator.state_variables_mut();
        if let Some(value) = state.get(name) {
            return value.clone();
        }
        match default {
            Some(value) => {
                state.insert(name.to_string(), value.clone());
                value
            }
            None => Value::Null,
        }
    }

    /// Inserts or replaces a state variable.
    pub fn write_state_variable(&mut self, name: &str, value: Value) {
        self.accumulator
            .state_variables_mut()
            .insert(name.to_string(), value);
    }

    /// Stages a generated input file and returns the path it will have
    /// after finalize.
    ///
    /// # Errors
    ///
    /// [`ChannelError::InvalidFileName`] unless `file_name` is a bare name.
    pub fn create_input_file(
        &mut self,
        file_name: &str,
        contents: String,
    ) -> Result<PathBuf, ChannelError> {
        if !is_bare_file_name(file_name) {
            return Err(ChannelError::invalid_file_name(file_name));
        }
        self.accumulator.add_generated_file(file_name, contents);
        Ok(self.generated_dir.join(file_name))
    }

    /// Declared output names, in declaration order.
    #[must_use]
    pub fn output_names(&self) -> Vec<String> {
        self.snapshot.declared_outputs().to_vec()
    }

    /// Names of inputs that carry a value.
    #[must_use]
    pub fn input_names_with_datum(&self) -> Vec<String> {
        self.snapshot.inputs().keys().cloned().collect()
    }

    /// Inputs with a value plus required-if-connected names, deduplicated.
    #[must_use]
    pub fn all_input_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .snapshot
            .inputs()
            .keys()
            .chain(self.snapshot.required_if_connected())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Host-assigned run number.
    #[must_use]
    pub fn execution_count(&self) -> i64 {
        self.snapshot.run_number()
    }

    /// Current state variables.
    #[must_use]
    pub fn state_dict(&self) -> BTreeMap<String, Value> {
        self.accumulator.state_variables().clone()
    }

    /// Builds the error that aborts the run with `reason`.
    #[must_use]
    pub fn fail(&self, reason: impl Into<String>) -> ChannelError {
        ChannelError::failed(reason)
    }

    fn ensure_declared(&self, name: &str) -> Result<(), ChannelError> {
        if self.snapshot.is_declared_output(name) {
            Ok(())
        } else {
            Err(ChannelError::undeclared_output(name))
        }
    }
}

fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name().is_some_and(|f| f == name)
}
