//! Worker configuration.
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────┐
//! │  1. Environment Variables (SCRIPTLET_*)  │
//! ├──────────────────────────────────────────┤
//! │  2. Config file (SCRIPTLET_CONFIG)       │
//! ├──────────────────────────────────────────┤
//! │  3. Default Values                       │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `SCRIPTLET_CONFIG` | (config file path) | PathBuf |
//! | `SCRIPTLET_HOST` | `connection.host` | String |
//! | `SCRIPTLET_CHANNEL_DIR` | `channel.dir` | PathBuf |
//! | `SCRIPTLET_LOG` | `logging.level` | String |
//! | `SCRIPTLET_INSTRUCTION_LIMIT` | `sandbox.instruction_limit` | u32 or `off` |
//!
//! # Example Configuration
//!
//! ```toml
//! [connection]
//! host = "127.0.0.1"
//!
//! [channel]
//! dir = "/var/run/scriptlet/job-17"
//!
//! [channel.files]
//! output_values = "pythonOutput.rced"
//!
//! [sandbox]
//! binding_name = "channel"
//! instruction_limit = 50000000
//!
//! [protocol]
//! token_accepted = "Token accepted."
//! order_stop = ["stopInstance", "stopInstanceRun"]
//!
//! [logging]
//! level = "info"
//! ```

mod error;
mod loader;
mod types;

pub use error::ConfigError;
pub use loader::{
    ConfigLoader, ENV_CHANNEL_DIR, ENV_CONFIG, ENV_HOST, ENV_INSTRUCTION_LIMIT, ENV_LOG,
};
pub use types::{ChannelConfig, ConnectionConfig, LoggingConfig, SandboxConfig, WorkerConfig};
