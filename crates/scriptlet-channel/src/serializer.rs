//! Persists a finished run.
//!
//! Finalize runs in two phases. Staging writes every artifact into a
//! temporary file next to its destination; publishing renames the staged
//! files into place. A failure while staging leaves nothing new visible.

use crate::accumulator::OutputAccumulator;
use crate::error::FinalizeError;
use crate::layout::ChannelLayout;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Writes the output side of a [`ChannelLayout`].
#[derive(Debug, Clone)]
pub struct OutputSerializer<'a> {
    layout: &'a ChannelLayout,
}

/// A staged file awaiting publication.
struct Staged {
    file: NamedTempFile,
    target: PathBuf,
}

impl<'a> OutputSerializer<'a> {
    #[must_use]
    pub fn new(layout: &'a ChannelLayout) -> Self {
        Self { layout }
    }

    /// Writes output values, closed outputs, state variables, generated
    /// files and their list.
    ///
    /// # Errors
    ///
    /// Returns [`FinalizeError`] if any artifact cannot be staged or
    /// published.
    pub fn finalize(&self, accumulator: &OutputAccumulator) -> Result<(), FinalizeError> {
        let generated_dir = self.layout.generated_dir();
        let mut staged = Vec::new();

        staged.push(stage_json(
            self.layout.output_values_path(),
            accumulator.output_values(),
        )?);
        staged.push(stage_json(
            self.layout.closed_outputs_path(),
            accumulator.closed_outputs(),
        )?);
        staged.push(stage_json(
            self.layout.state_output_path(),
            accumulator.state_variables(),
        )?);

        let mut generated_paths = Vec::with_capacity(accumulator.generated_files().len());
        if !accumulator.generated_files().is_empty() {
            std::fs::create_dir_all(&generated_dir)
                .map_err(|e| FinalizeError::write(&generated_dir, e))?;
        }
        for (file_name, contents) in accumulator.generated_files() {
            let target = generated_dir.join(file_name);
            staged.push(stage_bytes(target.clone(), contents.as_bytes())?);
            generated_paths.push(target.display().to_string());
        }
        staged.push(stage_json(
            self.layout.generated_files_path(),
            &generated_paths,
        )?);

        let count = staged.len();
        for Staged { file, target } in staged {
            file.persist(&target)
                .map_err(|e| FinalizeError::publish(&target, e.error))?;
            debug!(path = %target.display(), "Published channel artifact");
        }

        info!(
            outputs = accumulator.output_values().len(),
            closed = accumulator.closed_outputs().len(),
            artifacts = count,
            "Finalized run outputs"
        );
        Ok(())
    }
}

fn stage_json<T: Serialize + ?Sized>(target: PathBuf, value: &T) -> Result<Staged, FinalizeError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| FinalizeError::encode(&target, e))?;
    stage_bytes(target, &bytes)
}

fn stage_bytes(target: PathBuf, bytes: &[u8]) -> Result<Staged, FinalizeError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir).map_err(|e| FinalizeError::write(&target, e))?;
    file.write_all(bytes)
        .and_then(|()| file.flush())
        .map_err(|e| FinalizeError::write(&target, e))?;
    Ok(Staged { file, target })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ChannelBridge;
    use crate::snapshot::ChannelSnapshot;
    use crate::value::Value;
    use serde_json::json;

    fn read_json(path: &Path) -> serde_json::Value {
        let text = std::fs::read_to_string(path).expect("read artifact");
        serde_json::from_str(&text).expect("parse artifact")
    }

    #[test]
    fn finalize_writes_all_artifacts() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = ChannelLayout::new(tmp.path());
        let mut bridge = ChannelBridge::new(
            ChannelSnapshot::new()
                .with_declared_outputs(["y", "z"])
                .with_state_variable("k", 1_i64),
        )
        .with_generated_dir(layout.generated_dir());
        bridge.write_output("y", Value::Float(4.0)).expect("write");
        bridge.close_output("z").expect("close");
        bridge.write_state_variable("k", Value::Int(2));
        bridge
            .create_input_file("in.txt", "payload".into())
            .expect("create");

        OutputSerializer::new(&layout)
            .finalize(bridge.accumulator())
            .expect("finalize");

        assert_eq!(read_json(&layout.output_values_path()), json!({"y": [4.0]}));
        assert_eq!(read_json(&layout.closed_outputs_path()), json!(["z"]));
        assert_eq!(read_json(&layout.state_output_path()), json!({"k": 2}));
        let generated = layout.generated_dir().join("in.txt");
        assert_eq!(
            read_json(&layout.generated_files_path()),
            json!([generated.display().to_string()])
        );
        assert_eq!(
            std::fs::read_to_string(&generated).expect("read generated"),
            "payload"
        );
    }

    #[test]
    fn finalize_normalizes_specials() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = ChannelLayout::new(tmp.path());
        let mut bridge = ChannelBridge::new(ChannelSnapshot::new().with_declared_outputs(["v"]));
        bridge
            .write_output(
                "v",
                Value::List(vec![Value::Float(f64::NAN), Value::Float(f64::NEG_INFINITY)]),
            )
            .expect("write");

        OutputSerializer::new(&layout)
            .finalize(bridge.accumulator())
            .expect("finalize");

        assert_eq!(
            read_json(&layout.output_values_path()),
            json!({"v": [["NaN", "-Infinity"]]})
        );
    }

    #[test]
    fn missing_channel_dir_fails_without_publishing() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = ChannelLayout::new(tmp.path().join("gone"));
        let err = OutputSerializer::new(&layout)
            .finalize(&OutputAccumulator::default())
            .expect_err("staging should fail");
        assert!(matches!(err, FinalizeError::Write { .. }));
        assert!(!tmp.path().join("gone").exists());
    }

    #[test]
    fn publish_failure_is_reported() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let layout = ChannelLayout::new(tmp.path());
        // A directory in place of the output file cannot be replaced by rename.
        std::fs::create_dir(layout.output_values_path()).expect("block output path");
        std::fs::write(layout.output_values_path().join("keep"), "x").expect("fill dir");

        let err = OutputSerializer::new(&layout)
            .finalize(&OutputAccumulator::default())
            .expect_err("publish should fail");
        assert!(matches!(err, FinalizeError::Publish { .. }));
    }
}
