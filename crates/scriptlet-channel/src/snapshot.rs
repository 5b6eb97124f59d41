//! Per-run input view and its loader.
//!
//! [`SnapshotLoader`] reads the input side of a [`ChannelLayout`] once per
//! run. Absent files map to empty defaults; the run number falls back to
//! [`UNKNOWN_RUN_NUMBER`] when its file is absent or unreadable.

use crate::error::SnapshotError;
use crate::layout::ChannelLayout;
use crate::value::Value;
use serde::de::DeserializeOwned;
use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Run number reported when the host did not provide one.
pub const UNKNOWN_RUN_NUMBER: i64 = -1;

/// Immutable input side of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    inputs: BTreeMap<String, Value>,
    required_if_connected: BTreeSet<String>,
    declared_outputs: Vec<String>,
    state_variables: BTreeMap<String, Value>,
    run_number: i64,
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            inputs: BTreeMap::new(),
            required_if_connected: BTreeSet::new(),
            declared_outputs: Vec::new(),
            state_variables: BTreeMap::new(),
            run_number: UNKNOWN_RUN_NUMBER,
        }
    }
}

impl ChannelSnapshot {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an input value.
    #[must_use]
    pub fn with_input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    /// Marks an input as required-if-connected.
    #[must_use]
    pub fn with_required_if_connected(mut self, name: impl Into<String>) -> Self {
        self.required_if_connected.insert(name.into());
        self
    }

    /// Sets the declared output names, keeping their order.
    #[must_use]
    pub fn with_declared_outputs<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.declared_outputs = names.into_iter().map(Into::into).collect();
        self
    }

    /// Adds a persisted state variable.
    #[must_use]
    pub fn with_state_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.state_variables.insert(name.into(), value.into());
        self
    }

    /// Sets the run number.
    #[must_use]
    pub fn with_run_number(mut self, run_number: i64) -> Self {
        self.run_number = run_number;
        self
    }

    #[must_use]
    pub fn inputs(&self) -> &BTreeMap<String, Value> {
        &self.inputs
    }

    #[must_use]
    pub fn required_if_connected(&self) -> &BTreeSet<String> {
        &self.required_if_connected
    }

    #[must_use]
    pub fn declared_outputs(&self) -> &[String] {
        &self.declared_outputs
    }

    /// Returns `true` if `name` is a declared output.
    #[must_use]
    pub fn is_declared_output(&self, name: &str) -> bool {
        self.declared_outputs.iter().any(|n| n == name)
    }

    #[must_use]
    pub fn state_variables(&self) -> &BTreeMap<String, Value> {
        &self.state_variables
    }

    #[must_use]
    pub fn run_number(&self) -> i64 {
        self.run_number
    }
}

/// Loads a [`ChannelSnapshot`] from the files of a [`ChannelLayout`].
#[derive(Debug, Clone)]
pub struct SnapshotLoader<'a> {
    layout: &'a ChannelLayout,
}

impl<'a> SnapshotLoader<'a> {
    #[must_use]
    pub fn new(layout: &'a ChannelLayout) -> Self {
        Self { layout }
    }

    /// Reads all input-side files.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError`] if a file exists but cannot be read or
    /// parsed. The run number file is the exception: any problem with it
    /// yields [`UNKNOWN_RUN_NUMBER`].
    pub fn load(&self) -> Result<ChannelSnapshot, SnapshotError> {
        let inputs = decode_map(
            read_optional_json(&self.layout.input_values_path())?.unwrap_or_default(),
        );
        let required: Vec<String> =
            read_optional_json(&self.layout.required_if_connected_path())?.unwrap_or_default();
        let declared_outputs: Vec<String> =
            read_optional_json(&self.layout.declared_outputs_path())?.unwrap_or_default();
        // The host writes `null` when it has no state map yet.
        let state_variables = decode_map(
            read_optional_json::<Option<BTreeMap<String, serde_json::Value>>>(
                &self.layout.state_variables_path(),
            )?
            .flatten()
            .unwrap_or_default(),
        );
        let run_number = read_run_number(&self.layout.run_number_path());

        debug!(
            inputs = inputs.len(),
            required_if_connected = required.len(),
            outputs = declared_outputs.len(),
            state_variables = state_variables.len(),
            run_number,
            "Loaded channel snapshot"
        );

        Ok(ChannelSnapshot {
            inputs,
            required_if_connected: required.into_iter().collect(),
            declared_outputs,
            state_variables,
            run_number,
        })
    }
}

/// Reads and parses a JSON file, returning `None` if it does not exist.
fn read_optional_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, SnapshotError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "Channel file absent, using default");
            return Ok(None);
        }
        Err(e) => return Err(SnapshotError::read_file(path, e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| SnapshotError::parse(path, e))
}

/// Special-value tokens in value files become non-finite floats again.
fn decode_map(raw: BTreeMap<String, serde_json::Value>) -> BTreeMap<String, Value> {
    raw.iter()
        .map(|(name, json)| (name.clone(), Value::from_persisted(json)))
        .collect()
}

fn read_run_number(path: &Path) -> i64 {
    let parsed = std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<i64>(text.trim()).ok());
    match parsed {
        Some(n) => n,
        None => {
            debug!(path = %path.display(), "Run number unavailable");
            UNKNOWN_RUN_NUMBER
        }
    }
}
