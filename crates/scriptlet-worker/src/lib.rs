//! Remote script-execution worker.
//!
//! The worker connects to a host orchestrator, authenticates with a token
//! and then serves orders until told to stop:
//!
//! ```text
//! host                                  worker
//!  │ ◀──────────── connect ────────────── │
//!  │ ── handshake ──────────────────────▶ │
//!  │ ◀──────────── token ──────────────── │
//!  │ ── Token accepted. ────────────────▶ │
//!  │ ── executeUserscript ──────────────▶ │
//!  │ ◀──────────── ReadyToExecuteScript ─ │
//!  │ ── {"command":"execute",...} ──────▶ │  load ▸ run ▸ finalize
//!  │ ◀──────────── status ─────────────── │
//!  │ ── stopInstance ───────────────────▶ │
//!  │ ◀──────────── Stopping instance. ─── │
//! ```
//!
//! Every message is a NUL-terminated UTF-8 frame ([`frame`]). Script runs
//! exchange data with the host through files in the channel directory
//! (see `scriptlet_channel`).

pub mod config;
pub mod frame;
pub mod protocol;
pub mod run;
pub mod session;

pub use config::{ConfigError, ConfigLoader, WorkerConfig};
pub use frame::{FrameError, FramedChannel};
pub use protocol::{ExecuteRequest, Order, ProtocolVocabulary, RequestShape};
pub use run::{RunExecutor, RunOutcome};
pub use session::{SessionError, SessionState, StopReason, WorkerSession};
