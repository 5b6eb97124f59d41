//! Error types for the channel contract, snapshot loading and finalize.

use std::path::PathBuf;
use thiserror::Error;

/// A violation of the channel contract raised by a bridge operation.
///
/// These are local to one script run: the sandbox turns them into a
/// failed run and the worker keeps serving.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// Output name is not among the declared outputs.
    #[error("output '{name}' is not defined")]
    UndeclaredOutput { name: String },

    /// Required-if-connected input read without a default.
    #[error("input '{name}' is not connected and no default value was given")]
    InputNotConnected { name: String },

    /// Input has no loaded value.
    #[error("input '{name}' is not defined or has no value")]
    InputNotDefined { name: String },

    /// File name for a generated input file is not a bare name.
    #[error("invalid file name '{name}': expected a plain file name")]
    InvalidFileName { name: String },

    /// The script signalled failure through `fail(reason)`.
    #[error("{reason}")]
    Failed { reason: String },
}

impl ChannelError {
    /// Creates an undeclared output error.
    pub fn undeclared_output(name: impl Into<String>) -> Self {
        Self::UndeclaredOutput { name: name.into() }
    }

    /// Creates an input-not-connected error.
    pub fn input_not_connected(name: impl Into<String>) -> Self {
        Self::InputNotConnected { name: name.into() }
    }

    /// Creates an input-not-defined error.
    pub fn input_not_defined(name: impl Into<String>) -> Self {
        Self::InputNotDefined { name: name.into() }
    }

    /// Creates an invalid file name error.
    pub fn invalid_file_name(name: impl Into<String>) -> Self {
        Self::InvalidFileName { name: name.into() }
    }

    /// Creates a script failure.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// Failure to load the per-run channel snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// A present channel file could not be read.
    #[error("failed to read channel file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A present channel file is not valid JSON of the expected shape.
    #[error("failed to parse channel file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl SnapshotError {
    /// Creates a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a parse error.
    pub fn parse(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Parse {
            path: path.into(),
            source,
        }
    }
}

/// Failure to persist the run's artifacts.
#[derive(Debug, Error)]
pub enum FinalizeError {
    /// Creating a directory or staging file failed.
    #[error("failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding an artifact failed.
    #[error("failed to encode '{path}': {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Moving a staged file into place failed.
    #[error("failed to publish '{path}': {source}")]
    Publish {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FinalizeError {
    /// Creates a write error.
    pub fn write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Write {
            path: path.into(),
            source,
        }
    }

    /// Creates an encode error.
    pub fn encode(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Encode {
            path: path.into(),
            source,
        }
    }

    /// Creates a publish error.
    pub fn publish(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Publish {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_displays_reason_verbatim() {
        assert_eq!(ChannelError::failed("bad data").to_string(), "bad data");
    }

    #[test]
    fn contract_errors_name_the_endpoint() {
        assert!(ChannelError::undeclared_output("z")
            .to_string()
            .contains("'z'"));
        assert!(ChannelError::input_not_connected("x")
            .to_string()
            .contains("not connected"));
        assert!(ChannelError::input_not_defined("x")
            .to_string()
            .contains("not defined"));
    }
}
