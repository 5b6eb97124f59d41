//! Configuration loader with layered merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Config file (explicit path, else `SCRIPTLET_CONFIG`)
//! 3. Environment variables (`SCRIPTLET_*`)
//!
//! Each layer overrides the previous. A config file that does not exist is
//! skipped; one that exists but cannot be parsed is an error.

use super::{ConfigError, WorkerConfig};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Env var naming the config file.
pub const ENV_CONFIG: &str = "SCRIPTLET_CONFIG";
/// Env var overriding `connection.host`.
pub const ENV_HOST: &str = "SCRIPTLET_HOST";
/// Env var overriding `channel.dir`.
pub const ENV_CHANNEL_DIR: &str = "SCRIPTLET_CHANNEL_DIR";
/// Env var overriding `logging.level`.
pub const ENV_LOG: &str = "SCRIPTLET_LOG";
/// Env var overriding `sandbox.instruction_limit` (`0` or `off` disables).
pub const ENV_INSTRUCTION_LIMIT: &str = "SCRIPTLET_INSTRUCTION_LIMIT";

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```ignore
/// let config = ConfigLoader::new()
///     .with_config_file("/etc/scriptlet.toml")
///     .skip_env_vars()
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    skip_env: bool,
    /// Replaces the process environment when set.
    env: Option<BTreeMap<String, String>>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads this file instead of the one named by `SCRIPTLET_CONFIG`.
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Reads `SCRIPTLET_*` variables from `vars` instead of the process.
    #[must_use]
    pub fn with_env<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file exists but cannot be read
    /// or parsed, or an environment variable has an invalid value.
    pub fn load(&self) -> Result<WorkerConfig, ConfigError> {
        let path = self.config_file.clone().or_else(|| {
            if self.skip_env {
                None
            } else {
                self.var(ENV_CONFIG).map(PathBuf::from)
            }
        });

        let mut config = match path {
            Some(ref path) => match load_file(path)? {
                Some(config) => {
                    debug!(path = %path.display(), "Loaded config file");
                    config
                }
                None => {
                    debug!(path = %path.display(), "Config file not found, using defaults");
                    WorkerConfig::default()
                }
            },
            None => WorkerConfig::default(),
        };

        if !self.skip_env {
            self.apply_env_vars(&mut config)?;
        }

        Ok(config)
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    /// Applies environment variable overrides.
    fn apply_env_vars(&self, config: &mut WorkerConfig) -> Result<(), ConfigError> {
        if let Some(val) = self.var(ENV_HOST) {
            config.connection.host = val;
        }
        if let Some(val) = self.var(ENV_CHANNEL_DIR) {
            config.channel.dir = Some(PathBuf::from(val));
        }
        if let Some(val) = self.var(ENV_LOG) {
            config.logging.level = val;
        }
        if let Some(val) = self.var(ENV_INSTRUCTION_LIMIT) {
            config.sandbox.instruction_limit = parse_limit(&val)
                .ok_or_else(|| ConfigError::invalid_env_var(ENV_INSTRUCTION_LIMIT, "expected integer or 'off'"))?;
        }
        Ok(())
    }
}

/// Loads a config file, returning None if it doesn't exist.
fn load_file(path: &Path) -> Result<Option<WorkerConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
    let config = WorkerConfig::from_toml(&content).map_err(|e| ConfigError::parse_toml(path, e))?;
    Ok(Some(config))
}

/// `Some(None)` disables the limit; `None` means unparseable.
fn parse_limit(s: &str) -> Option<Option<u32>> {
    match s.trim().to_lowercase().as_str() {
        "" | "0" | "off" | "none" => Some(None),
        other => other.parse::<u32>().ok().map(Some),
    }
}
