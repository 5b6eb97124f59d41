//! Mutable output side of one run.

use crate::value::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Everything a run produces, held until finalize.
///
/// Created at run start with a copy of the loaded state variables, handed
/// to the serializer exactly once at run end, then dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputAccumulator {
    output_values: BTreeMap<String, Vec<Value>>,
    closed_outputs: BTreeSet<String>,
    state_variables: BTreeMap<String, Value>,
    generated_files: BTreeMap<String, String>,
}

impl OutputAccumulator {
    /// Creates an accumulator seeded with the run's initial state variables.
    #[must_use]
    pub fn new(state_variables: BTreeMap<String, Value>) -> Self {
        Self {
            state_variables,
            ..Self::default()
        }
    }

    pub(crate) fn push_value(&mut self, name: &str, value: Value) {
        self.output_values
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    pub(crate) fn close(&mut self, name: &str) {
        self.closed_outputs.insert(name.to_string());
    }

    pub(crate) fn state_variables_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.state_variables
    }

    pub(crate) fn add_generated_file(&mut self, file_name: &str, contents: String) {
        self.generated_files.insert(file_name.to_string(), contents);
    }

    /// Values written per output, in write order.
    #[must_use]
    pub fn output_values(&self) -> &BTreeMap<String, Vec<Value>> {
        &self.output_values
    }

    /// Values written to one output.
    #[must_use]
    pub fn values_of(&self, name: &str) -> &[Value] {
        self.output_values.get(name).map_or(&[], Vec::as_slice)
    }

    /// Closed output names.
    #[must_use]
    pub fn closed_outputs(&self) -> &BTreeSet<String> {
        &self.closed_outputs
    }

    /// Outputs that received the not-a-value sentinel at least once.
    #[must_use]
    pub fn not_a_value_outputs(&self) -> BTreeSet<String> {
        self.output_values
            .iter()
            .filter(|(_, values)| values.iter().any(Value::is_not_a_value))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// State variables after the run.
    #[must_use]
    pub fn state_variables(&self) -> &BTreeMap<String, Value> {
        &self.state_variables
    }

    /// Pending generated input files: file name to contents.
    #[must_use]
    pub fn generated_files(&self) -> &BTreeMap<String, String> {
        &self.generated_files
    }
}
