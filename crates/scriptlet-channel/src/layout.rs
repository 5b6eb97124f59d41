//! File layout of the per-run channel directory.
//!
//! The host writes the input side before sending an execute order and
//! reads the output side after a successful reply. File names are a
//! convention shared with the host and are configurable.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Names of the channel files, relative to the channel directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelFiles {
    /// Input values (JSON object).
    pub input_values: String,
    /// Required-if-connected input names (JSON array).
    pub required_if_connected: String,
    /// Declared output names (JSON array).
    pub declared_outputs: String,
    /// Persisted state variables loaded at run start (JSON object).
    pub state_variables: String,
    /// Host-assigned run number (JSON integer).
    pub run_number: String,
    /// Accumulated output values (JSON object of arrays).
    pub output_values: String,
    /// Closed output names (JSON array).
    pub closed_outputs: String,
    /// Updated state variables (JSON object).
    pub state_output: String,
    /// Paths of generated input files (JSON array).
    pub generated_files: String,
    /// Sub-directory receiving generated input files.
    pub generated_dir: String,
}

impl Default for ChannelFiles {
    fn default() -> Self {
        Self {
            input_values: "pythonInput.rced".into(),
            required_if_connected: "pythonInputReqIfConnected.rced".into(),
            declared_outputs: "outputs.rceo".into(),
            state_variables: "pythonStateVariables.rces".into(),
            run_number: "pythonRunNumber.rcen".into(),
            output_values: "pythonOutput.rced".into(),
            closed_outputs: "pythonCloseOutputChannelsList.rced".into(),
            state_output: "pythonStateOutput.rces".into(),
            generated_files: "pythonGeneratedInputFiles.rced".into(),
            generated_dir: "generated".into(),
        }
    }
}

/// A channel directory together with its file names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    dir: PathBuf,
    files: ChannelFiles,
}

impl ChannelLayout {
    /// Creates a layout with the default file names.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_files(dir, ChannelFiles::default())
    }

    /// Creates a layout with custom file names.
    #[must_use]
    pub fn with_files(dir: impl Into<PathBuf>, files: ChannelFiles) -> Self {
        Self {
            dir: dir.into(),
            files,
        }
    }

    /// Channel directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names.
    #[must_use]
    pub fn files(&self) -> &ChannelFiles {
        &self.files
    }

    #[must_use]
    pub fn input_values_path(&self) -> PathBuf {
        self.dir.join(&self.files.input_values)
    }

    #[must_use]
    pub fn required_if_connected_path(&self) -> PathBuf {
        self.dir.join(&self.files.required_if_connected)
    }

    #[must_use]
    pub fn declared_outputs_path(&self) -> PathBuf {
        self.dir.join(&self.files.declared_outputs)
    }

    #[must_use]
    pub fn state_variables_path(&self) -> PathBuf {
        self.dir.join(&self.files.state_variables)
    }

    #[must_use]
    pub fn run_number_path(&self) -> PathBuf {
        self.dir.join(&self.files.run_number)
    }

    #[must_use]
    pub fn output_values_path(&self) -> PathBuf {
        self.dir.join(&self.files.output_values)
    }

    #[must_use]
    pub fn closed_outputs_path(&self) -> PathBuf {
        self.dir.join(&self.files.closed_outputs)
    }

    #[must_use]
    pub fn state_output_path(&self) -> PathBuf {
        self.dir.join(&self.files.state_output)
    }

    #[must_use]
    pub fn generated_files_path(&self) -> PathBuf {
        self.dir.join(&self.files.generated_files)
    }

    /// Directory receiving files created through `create_input_file`.
    #[must_use]
    pub fn generated_dir(&self) -> PathBuf {
        self.dir.join(&self.files.generated_dir)
    }
}
