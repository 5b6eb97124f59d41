//! Configuration types.
//!
//! All types implement [`Default`]; every field is optional in TOML.

use crate::protocol::ProtocolVocabulary;
use scriptlet_channel::{ChannelFiles, ChannelLayout};
use scriptlet_lua::{ScriptSandbox, DEFAULT_BINDING_NAME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::ConfigError;

/// Worker configuration after merging all layers.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WorkerConfig {
    /// Where the host listens.
    pub connection: ConnectionConfig,

    /// Message literals.
    pub protocol: ProtocolVocabulary,

    /// Channel directory and file names.
    pub channel: ChannelConfig,

    /// Script sandbox settings.
    pub sandbox: SandboxConfig,

    /// Log filter.
    pub logging: LoggingConfig,
}

impl WorkerConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Channel layout, with a relative directory resolved against `base`.
    #[must_use]
    pub fn channel_layout_in(&self, base: &Path) -> ChannelLayout {
        let dir = match &self.channel.dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => base.join(dir),
            None => base.to_path_buf(),
        };
        ChannelLayout::with_files(dir, self.channel.files.clone())
    }

    /// Channel layout resolved against the current directory.
    ///
    /// # Errors
    ///
    /// [`ConfigError::CurrentDir`] if the working directory is unavailable.
    pub fn channel_layout(&self) -> Result<ChannelLayout, ConfigError> {
        let cwd = std::env::current_dir().map_err(ConfigError::CurrentDir)?;
        Ok(self.channel_layout_in(&cwd))
    }

    #[must_use]
    pub fn sandbox(&self) -> ScriptSandbox {
        ScriptSandbox::new()
            .with_binding_name(self.sandbox.binding_name.clone())
            .with_instruction_limit(self.sandbox.instruction_limit)
    }
}

/// Host address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub host: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
        }
    }
}

/// Channel directory settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChannelConfig {
    /// Directory holding the channel files. Defaults to the working directory.
    pub dir: Option<PathBuf>,

    /// File names inside the directory.
    pub files: ChannelFiles,
}

/// Sandbox settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Global name scripts use to reach the bridge.
    pub binding_name: String,

    /// Abort scripts after this many VM instructions. Unlimited when unset or 0.
    pub instruction_limit: Option<u32>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            binding_name: DEFAULT_BINDING_NAME.into(),
            instruction_limit: None,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}
